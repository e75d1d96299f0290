//! Edge shape classifier and fix correlation — the algorithmically
//! interesting part of the engine, and the only part that needs no
//! device to test.
//!
//! [`classify_pulse`] turns a `(edge, cycle, duration)` triple into an
//! accept/reject verdict with a label, following the classification
//! ladder a receiver's pulse shape is checked against (5 Hz, 1 Hz, 0.5 Hz,
//! or nonsense). [`FixCorrelator`] then attributes an accepted edge to a
//! UTC second using the most recent in-band fix and de-duplicates by
//! second.
//!
//! Deliberately free of any device or thread dependency — the whole
//! ladder and correlation logic can be exercised with plain values.

use crate::config::MonitorConfig;
use crate::shared::FixIn;
use crate::time::{diff_us, sub, HiResTime, TimeDelta};

/// 0 = clear edge, 1 = assert edge. Also used as an index into
/// [`EdgeHistory::pulse`].
pub type Edge = u8;

/// The outcome of running one edge through [`classify_pulse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    Accept(&'static str),
    Reject(&'static str),
}

impl ClassifyOutcome {
    pub fn is_accept(&self) -> bool {
        matches!(self, ClassifyOutcome::Accept(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClassifyOutcome::Accept(l) | ClassifyOutcome::Reject(l) => l,
        }
    }
}

/// Per-backend edge history: the two most recent same-backend edge
/// timestamps, indexed by polarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeHistory {
    pulse: [HiResTime; 2],
}

impl EdgeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute `(cycle_us, duration_us)` for `current` against the stored
    /// history, then record `current` as the latest edge of this
    /// polarity. `cycle` is time since the previous edge of the same
    /// polarity; `duration` is time since the opposite edge (the length
    /// of the just-completed half-cycle).
    pub fn observe(&mut self, edge: Edge, current: HiResTime) -> (i64, i64) {
        let opposite = 1 - edge;
        let cycle_us = diff_us(current, self.pulse[edge as usize]);
        let duration_us = diff_us(current, self.pulse[opposite as usize]);
        self.pulse[edge as usize] = current;
        (cycle_us, duration_us)
    }
}

/// Classify one edge. `cycle_us`/`duration_us` come from
/// [`EdgeHistory::observe`]. First matching branch wins.
pub fn classify_pulse(edge: Edge, cycle_us: i64, duration_us: i64, config: &MonitorConfig) -> ClassifyOutcome {
    use ClassifyOutcome::{Accept, Reject};

    if cycle_us < 0 {
        return Reject("negative cycle");
    }
    if cycle_us < 199_000 {
        return Reject("too short even for 5 Hz");
    }
    if cycle_us < 201_000 {
        return if duration_us < 100_000 {
            Accept("5 Hz PPS pulse")
        } else {
            Reject("5 Hz, duration out of spec")
        };
    }
    if cycle_us < 900_000 {
        return Reject("between 5 Hz and 1 Hz");
    }
    if cycle_us < 1_100_000 {
        if duration_us == 0 {
            return Accept("invisible pulse");
        }
        if duration_us < 499_000 {
            return Reject("1 Hz trailing edge");
        }
        if duration_us < 501_000 {
            return if edge == 1 {
                Accept("1 Hz square wave")
            } else {
                Reject("1 Hz square, wrong polarity")
            };
        }
        return Accept("1 Hz leading edge");
    }
    if cycle_us < 1_999_000 {
        return Reject("between 1 Hz and 0.5 Hz");
    }
    if cycle_us < 2_001_000 {
        return if duration_us >= config.one_hz_window_low_us && duration_us <= config.one_hz_window_high_us {
            Accept("0.5 Hz square wave")
        } else {
            Reject("0.5 Hz, duration out of spec")
        };
    }
    Reject("too long")
}

/// Attributes accepted edges to a UTC second using the most recent
/// in-band fix, and de-duplicates by second.
#[derive(Debug, Default)]
pub struct FixCorrelator {
    last_second_used: Option<i64>,
}

impl FixCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to correlate an accepted edge at `selected_edge_ts` with
    /// `fix`. `Ok` carries the published [`TimeDelta`]; `Err` carries the
    /// rejection label.
    pub fn correlate(&mut self, selected_edge_ts: HiResTime, fix: FixIn) -> Result<TimeDelta, &'static str> {
        if fix.fix_real.sec == 0 {
            return Err("no current GPS seconds");
        }

        // This "+1" embodies the contract that the receiver prints the
        // fix for second N *after* pulsing for the top of second N.
        let pps = TimeDelta {
            real: HiResTime::new(fix.fix_real.sec + 1, 0),
            clock: selected_edge_ts,
        };

        let delay = sub(pps.clock, fix.fix_clock);
        if delay.sec < 0 || delay.nsec < 0 {
            return Err("system clock went backwards");
        }
        // Delays up to 1.1s are tolerated to permit a slewing host clock.
        if delay.sec > 1 || (delay.sec == 1 && delay.nsec > 100_000_000) {
            return Err("timestamp out of range");
        }

        if let Some(last) = self.last_second_used {
            if last >= fix.fix_real.sec {
                return Err("this second already handled");
            }
        }
        self.last_second_used = Some(fix.fix_real.sec);

        Ok(pps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MonitorConfig {
        MonitorConfig::default()
    }

    #[test]
    fn boundary_five_hz_accept() {
        let out = classify_pulse(1, 200_000, 99_999, &cfg());
        assert_eq!(out, ClassifyOutcome::Accept("5 Hz PPS pulse"));
    }

    #[test]
    fn boundary_five_hz_duration_out_of_spec() {
        let out = classify_pulse(1, 200_000, 100_000, &cfg());
        assert!(!out.is_accept());
    }

    #[test]
    fn boundary_invisible_pulse() {
        let out = classify_pulse(0, 1_000_000, 0, &cfg());
        assert_eq!(out, ClassifyOutcome::Accept("invisible pulse"));
    }

    #[test]
    fn boundary_one_hz_square_assert_edge() {
        let out = classify_pulse(1, 1_000_000, 500_000, &cfg());
        assert_eq!(out, ClassifyOutcome::Accept("1 Hz square wave"));
    }

    #[test]
    fn boundary_one_hz_square_wrong_polarity() {
        let out = classify_pulse(0, 1_000_000, 500_000, &cfg());
        assert!(!out.is_accept());
    }

    #[test]
    fn boundary_one_hz_leading_edge() {
        let out = classify_pulse(0, 1_050_000, 900_000, &cfg());
        assert_eq!(out, ClassifyOutcome::Accept("1 Hz leading edge"));
    }

    #[test]
    fn boundary_half_hz_square() {
        let out = classify_pulse(0, 2_000_000, 1_000_000, &cfg());
        assert_eq!(out, ClassifyOutcome::Accept("0.5 Hz square wave"));
    }

    #[test]
    fn boundary_too_long_rejected() {
        let out = classify_pulse(0, 2_100_000, 0, &cfg());
        assert!(!out.is_accept());
    }

    #[test]
    fn boundary_negative_cycle_rejected() {
        let out = classify_pulse(0, -1, 0, &cfg());
        assert_eq!(out, ClassifyOutcome::Reject("negative cycle"));
    }

    #[test]
    fn history_tracks_cycle_and_duration_per_polarity() {
        let mut h = EdgeHistory::new();
        let t0 = HiResTime::new(100, 0);
        let t1 = HiResTime::new(100, 500_000_000);
        let t2 = HiResTime::new(101, 0);

        let (cycle, duration) = h.observe(1, t0);
        assert_eq!(cycle, 100 * 1_000_000); // vs default zero history
        assert_eq!(duration, 100 * 1_000_000);

        let (cycle, duration) = h.observe(0, t1);
        assert_eq!(duration, diff_us(t1, t0));
        assert_eq!(cycle, diff_us(t1, HiResTime::ZERO));

        let (cycle, duration) = h.observe(1, t2);
        assert_eq!(cycle, diff_us(t2, t0));
        assert_eq!(duration, diff_us(t2, t1));
    }

    // Scenario A: cold start, no prior fix.
    #[test]
    fn scenario_a_cold_start_rejects_every_edge() {
        let mut corr = FixCorrelator::new();
        let fix = FixIn::default();
        for i in 0..10 {
            let ts = HiResTime::new(1000 + i, 0);
            let result = corr.correlate(ts, fix);
            assert_eq!(result, Err("no current GPS seconds"));
        }
    }

    // Scenario B: steady 1 Hz accept.
    #[test]
    fn scenario_b_steady_one_hz_accepts() {
        let mut corr = FixCorrelator::new();
        let t = HiResTime::new(5000, 0);
        let fix = FixIn { fix_real: HiResTime::new(100, 0), fix_clock: t };
        let edge_ts = HiResTime::new(t.sec + 1, 0);
        let pps = corr.correlate(edge_ts, fix).expect("should accept");
        assert_eq!(pps.real, HiResTime::new(101, 0));
    }

    // Scenario C: duplicate second after B.
    #[test]
    fn scenario_c_duplicate_second_rejected() {
        let mut corr = FixCorrelator::new();
        let t = HiResTime::new(5000, 0);
        let fix = FixIn { fix_real: HiResTime::new(100, 0), fix_clock: t };
        let edge_ts = HiResTime::new(t.sec + 1, 0);
        corr.correlate(edge_ts, fix).unwrap();

        let second_edge_ts = HiResTime::new(t.sec + 2, 0);
        let result = corr.correlate(second_edge_ts, fix);
        assert_eq!(result, Err("this second already handled"));
    }

    // Scenario D: clock regression.
    #[test]
    fn scenario_d_clock_regression_rejected() {
        let mut corr = FixCorrelator::new();
        let fix = FixIn { fix_real: HiResTime::new(200, 0), fix_clock: HiResTime::new(5010, 0) };
        let edge_ts = HiResTime::new(5009, 0);
        let result = corr.correlate(edge_ts, fix);
        assert_eq!(result, Err("system clock went backwards"));
    }

    // Scenario E: stale fix.
    #[test]
    fn scenario_e_stale_fix_rejected() {
        let mut corr = FixCorrelator::new();
        let fix = FixIn { fix_real: HiResTime::new(300, 0), fix_clock: HiResTime::new(5000, 0) };
        let edge_ts = HiResTime::new(5003, 0);
        let result = corr.correlate(edge_ts, fix);
        assert_eq!(result, Err("timestamp out of range"));
    }

    #[test]
    fn accepted_pulse_never_has_nonzero_nsec() {
        let mut corr = FixCorrelator::new();
        let fix = FixIn { fix_real: HiResTime::new(1, 0), fix_clock: HiResTime::new(10, 0) };
        let pps = corr.correlate(HiResTime::new(11, 0), fix).unwrap();
        assert_eq!(pps.real.nsec, 0);
    }
}
