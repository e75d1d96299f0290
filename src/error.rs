//! Error kinds for the monitor engine.
//!
//! None of these propagate out of [`crate::monitor::activate`]: fatal
//! errors terminate the worker thread and are reported through the log
//! hook / `tracing` instead, since `activate` spawns the worker and
//! returns immediately. The type exists so the worker's internal
//! control flow (fatal vs. non-fatal) is explicit rather than
//! stringly-typed.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("line-change wait failed: {0}")]
    WaitFailed(#[source] std::io::Error),

    #[error("realtime clock read failed: {0}")]
    ClockReadFailed(#[source] std::io::Error),

    #[error("device {0} is not a tty")]
    NotATty(String),

    #[error("administrative privilege required: {0}")]
    PermissionDenied(String),

    #[error("kernel PPS device not found for {0}")]
    KernelDeviceNotFound(String),
}
