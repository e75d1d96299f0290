//! Engine tunables.
//!
//! This is deliberately small: the surrounding daemon's own
//! configuration/CLI loading is somebody else's job. What lives here
//! are the handful of constants a PPS monitor core otherwise hardcodes
//! — the stuck-line retry threshold, the stuck-line sleep, and the
//! 1 Hz tolerance window — exposed as config the way `pendulum::config`
//! exposes its own knobs, with the same defaults gpsd ships.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Consecutive unchanged-word iterations before the serial backend
    /// sleeps.
    #[serde(default = "default_stuck_line_threshold")]
    pub stuck_line_threshold: u32,

    /// Sleep duration, in seconds, once the stuck-line threshold is hit.
    #[serde(default = "default_stuck_line_sleep_secs")]
    pub stuck_line_sleep_secs: u64,

    /// Lower bound of the 1 Hz "invisible pulse" cycle tolerance window,
    /// in microseconds.
    #[serde(default = "default_one_hz_window_low_us")]
    pub one_hz_window_low_us: i64,

    /// Upper bound of the 1 Hz "invisible pulse" cycle tolerance window,
    /// in microseconds.
    #[serde(default = "default_one_hz_window_high_us")]
    pub one_hz_window_high_us: i64,
}

fn default_stuck_line_threshold() -> u32 {
    10
}
fn default_stuck_line_sleep_secs() -> u64 {
    10
}
fn default_one_hz_window_low_us() -> i64 {
    999_000
}
fn default_one_hz_window_high_us() -> i64 {
    1_001_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            stuck_line_threshold: default_stuck_line_threshold(),
            stuck_line_sleep_secs: default_stuck_line_sleep_secs(),
            one_hz_window_low_us: default_one_hz_window_low_us(),
            one_hz_window_high_us: default_one_hz_window_high_us(),
        }
    }
}
