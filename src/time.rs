//! High-resolution time arithmetic.
//!
//! UNIX nanosecond timestamps need 62-63 significant bits; an `f64` only
//! carries 53. Every sanity window downstream of this module is expressed
//! in whole microseconds and computed with plain 64-bit integer math. You
//! cannot do PPS math with doubles.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A `(seconds, nanoseconds)` pair with the sign of `nsec` tied to the sign
/// of `sec`.
///
/// Invariant: if `sec > 0` then `0 <= nsec < 1_000_000_000`; if `sec < 0`
/// then `-1_000_000_000 < nsec <= 0`; if `sec == 0`, `nsec` may be either
/// sign. [`HiResTime::normalize`] restores this after a single borrow or
/// carry, which is all [`sub`] ever needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HiResTime {
    pub sec: i64,
    pub nsec: i32,
}

const NSEC_PER_SEC: i32 = 1_000_000_000;

impl HiResTime {
    pub const ZERO: HiResTime = HiResTime { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: i32) -> Self {
        let mut t = HiResTime { sec, nsec };
        t.normalize();
        t
    }

    /// Restore the sign/magnitude invariant after at most one borrow or
    /// carry. Undefined (will not fully normalize) for deltas whose `nsec`
    /// is more than one second out of range, which cannot occur for values
    /// built from a single [`sub`].
    pub fn normalize(&mut self) {
        let positive_result = self.sec >= 1 || (self.sec == 0 && self.nsec >= 0);
        if positive_result {
            if self.nsec >= NSEC_PER_SEC {
                self.nsec -= NSEC_PER_SEC;
                self.sec += 1;
            } else if self.nsec < 0 {
                self.nsec += NSEC_PER_SEC;
                self.sec -= 1;
            }
        } else if self.nsec <= -NSEC_PER_SEC {
            self.nsec += NSEC_PER_SEC;
            self.sec -= 1;
        } else if self.nsec > 0 {
            self.nsec -= NSEC_PER_SEC;
            self.sec += 1;
        }
    }

    /// Best available realtime-clock reading, nanosecond resolution where
    /// the platform provides it.
    #[cfg(target_os = "linux")]
    pub fn now() -> Self {
        use std::mem::MaybeUninit;
        unsafe {
            let mut ts = MaybeUninit::<libc::timespec>::uninit();
            if libc::clock_gettime(libc::CLOCK_REALTIME, ts.as_mut_ptr()) == 0 {
                let ts = ts.assume_init();
                return HiResTime::new(ts.tv_sec as i64, ts.tv_nsec as i32);
            }
        }
        Self::fallback_now()
    }

    #[cfg(not(target_os = "linux"))]
    pub fn now() -> Self {
        Self::fallback_now()
    }

    fn fallback_now() -> Self {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX epoch");
        HiResTime::new(d.as_secs() as i64, d.subsec_nanos() as i32)
    }
}

/// Subtract second-wise and nanosecond-wise, then normalize.
pub fn sub(a: HiResTime, b: HiResTime) -> HiResTime {
    HiResTime::new(a.sec - b.sec, a.nsec - b.nsec)
}

/// `(a - b)` in whole microseconds, integer math only.
pub fn diff_us(a: HiResTime, b: HiResTime) -> i64 {
    let d = sub(a, b);
    d.sec * 1_000_000 + (d.nsec as i64) / 1_000
}

/// Short human string for logs, e.g. `1712345678.123456789`.
pub fn format(t: HiResTime) -> String {
    format!("{}.{:09}", t.sec, t.nsec.unsigned_abs())
}

impl fmt::Display for HiResTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(*self))
    }
}

/// A correlated `(wall_time, host_clock)` reading for one accepted pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeDelta {
    /// The UTC wall time we believe the pulse represents.
    pub real: HiResTime,
    /// The host realtime clock reading sampled just after the edge.
    pub clock: HiResTime,
}
