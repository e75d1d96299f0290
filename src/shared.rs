//! Shared fix/pulse exchange slot between the monitor and the decoder.
//!
//! `fix_in` and `pulse_out` are the only mutable state shared across
//! threads; both live behind a single `Mutex` owned by the
//! [`crate::context::PpsThreadCtx`]. One mutex per context, not a
//! process-wide singleton — each monitored device gets its own
//! independent exchange slot.

use crate::time::{HiResTime, TimeDelta};
use std::sync::{Mutex, MutexGuard};
use tracing::error;

/// Last in-band fix coordinates received from the GNSS decoder. Updated
/// externally by the decoder, consumed by the monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixIn {
    pub fix_real: HiResTime,
    pub fix_clock: HiResTime,
}

/// Last accepted pulse. Written by the monitor, read by external hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseOut {
    pub last: TimeDelta,
    pub count: u64,
}

#[derive(Debug, Default)]
struct Exchange {
    fix_in: FixIn,
    pulse_out: PulseOut,
}

/// The mutex-protected exchange slot. A lock failure is logged at ERROR
/// but never aborts the caller — the read/write proceeds against
/// whatever the (possibly poisoned) guard yields, rather than letting
/// one panicked thread wedge every other device's pipeline.
#[derive(Debug, Default)]
pub struct SharedState {
    exchange: Mutex<Exchange>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Exchange> {
        match self.exchange.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("PPS shared-state mutex poisoned, proceeding anyway");
                poisoned.into_inner()
            }
        }
    }

    /// Decoder writes `fix_in` under the mutex. Idempotent: the last
    /// write wins.
    pub fn stash_fix(&self, real: HiResTime, clock: HiResTime) {
        let mut guard = self.lock();
        guard.fix_in = FixIn { fix_real: real, fix_clock: clock };
    }

    /// Monitor-internal snapshot of `fix_in` under the mutex.
    pub(crate) fn snapshot_fix(&self) -> FixIn {
        self.lock().fix_in
    }

    /// Hook consumers read under the mutex; `count` lets callers detect
    /// missed pulses between reads.
    pub fn last_pulse(&self) -> (TimeDelta, u64) {
        let guard = self.lock();
        (guard.pulse_out.last, guard.pulse_out.count)
    }

    /// Monitor-internal: publish an accepted pulse and bump the counter.
    pub(crate) fn publish_pulse(&self, pps: TimeDelta) {
        let mut guard = self.lock();
        guard.pulse_out.last = pps;
        guard.pulse_out.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stash_then_snapshot_round_trips() {
        let state = SharedState::new();
        let real = HiResTime::new(100, 0);
        let clock = HiResTime::new(200, 500);
        state.stash_fix(real, clock);
        let fix = state.snapshot_fix();
        assert_eq!(fix.fix_real, real);
        assert_eq!(fix.fix_clock, clock);
    }

    #[test]
    fn repeated_stash_is_last_write_wins() {
        let state = SharedState::new();
        state.stash_fix(HiResTime::new(1, 0), HiResTime::new(1, 0));
        state.stash_fix(HiResTime::new(2, 0), HiResTime::new(2, 0));
        let fix = state.snapshot_fix();
        assert_eq!(fix.fix_real, HiResTime::new(2, 0));
    }

    #[test]
    fn count_never_decreases_and_increments_by_one() {
        let state = SharedState::new();
        let (_, c0) = state.last_pulse();
        assert_eq!(c0, 0);
        state.publish_pulse(TimeDelta::default());
        let (_, c1) = state.last_pulse();
        assert_eq!(c1, 1);
        state.publish_pulse(TimeDelta::default());
        let (_, c2) = state.last_pulse();
        assert_eq!(c2, 2);
        assert!(c2 >= c1);
    }
}
