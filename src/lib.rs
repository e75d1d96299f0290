//! PPS edge monitor engine for GPS/GNSS-disciplined time daemons.
//!
//! A device-independent core that watches a receiver's pulse-per-second
//! line (via the kernel RFC 2783 API, userspace modem-control-line
//! waits, or both), classifies each edge's shape, correlates accepted
//! edges with the decoder's last fix, and publishes the result through
//! caller-supplied hooks. See [`monitor::activate`] for the entry point.

pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod kernel;
pub mod monitor;
pub mod serial;
pub mod shared;
pub mod time;

pub use config::MonitorConfig;
pub use context::PpsThreadCtx;
pub use error::MonitorError;
pub use hooks::{LogHook, LogLevel, PpsHook, PpsHooks, ReportHook, WrapHook};
pub use monitor::{activate, deactivate};
pub use shared::{FixIn, PulseOut, SharedState};
pub use time::{HiResTime, TimeDelta};
