//! Hook contracts the surrounding daemon implements and the monitor calls.
//!
//! The original C core passed these as raw function pointers on the
//! thread context struct. Here each slot is an independent capability the
//! caller supplies at [`crate::monitor::activate`] time: present or
//! absent, with absence meaningful (dual absence of `report_hook` and
//! `pps_hook` is the loop's termination signal, see
//! [`crate::monitor`]).

use crate::context::PpsThreadCtx;
use crate::time::TimeDelta;

/// Log levels the engine reports at, in increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Raw per-edge accept/reject trace.
    Raw,
    /// Per-iteration progress detail (cycle/duration, edge polarity).
    Prog,
    /// Informational (hook results, backend (de)activation).
    Inf,
    Warn,
    Error,
}

/// Re-entrant, non-blocking log sink. Implementations must not block
/// beyond writing to a local buffer — this is called from the
/// time-critical section's error paths.
pub trait LogHook: Send + Sync {
    fn log(&self, ctx: &PpsThreadCtx, level: LogLevel, message: &str);
}

/// Invoked once per accepted pulse. Typical implementations forward the
/// pulse to an NTP shared-memory segment and/or a chrony socket and
/// return a short label describing what they did (e.g. `"chrony+ntpshm"`).
pub trait ReportHook: Send + Sync {
    fn report(&self, ctx: &PpsThreadCtx, pps: &TimeDelta) -> String;
}

/// Invoked once per accepted pulse, after [`ReportHook::report`]. Typical
/// implementations publish to a driver-specific sink.
pub trait PpsHook: Send + Sync {
    fn pulse(&self, ctx: &PpsThreadCtx, pps: &TimeDelta);
}

/// Invoked exactly once, at worker exit, for teardown.
pub trait WrapHook: Send + Sync {
    fn wrap(&self, ctx: &PpsThreadCtx);
}

/// The capability record a caller hands to [`crate::monitor::activate`].
/// Setting both `report_hook` and `pps_hook` to `None` is the documented
/// way to ask the worker to exit at its next loop iteration.
#[derive(Default)]
pub struct PpsHooks {
    pub log_hook: Option<Box<dyn LogHook>>,
    pub report_hook: Option<Box<dyn ReportHook>>,
    pub pps_hook: Option<Box<dyn PpsHook>>,
    pub wrap_hook: Option<Box<dyn WrapHook>>,
}

impl PpsHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once both user hooks are absent — the loop's termination
    /// signal.
    pub fn should_terminate(&self) -> bool {
        self.report_hook.is_none() && self.pps_hook.is_none()
    }

    pub(crate) fn log(&self, ctx: &PpsThreadCtx, level: LogLevel, message: &str) {
        if let Some(hook) = &self.log_hook {
            hook.log(ctx, level, message);
        }
        match level {
            LogLevel::Raw | LogLevel::Prog => tracing::trace!(device = %ctx.device_name, "{message}"),
            LogLevel::Inf => tracing::info!(device = %ctx.device_name, "{message}"),
            LogLevel::Warn => tracing::warn!(device = %ctx.device_name, "{message}"),
            LogLevel::Error => tracing::error!(device = %ctx.device_name, "{message}"),
        }
    }
}
