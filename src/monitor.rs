//! The worker loop: waits for edges, classifies them, correlates
//! accepted ones with the last fix, and publishes the result.
//!
//! [`activate`] spawns one `std::thread` per device and returns
//! immediately; the thread runs until [`deactivate`] clears both user
//! hooks, which it notices at the top of its next iteration.

use crate::classifier::{classify_pulse, ClassifyOutcome, EdgeHistory, FixCorrelator};
use crate::context::PpsThreadCtx;
use crate::hooks::LogLevel;
use crate::kernel::{KernelPpsDevice, KernelPpsSample};
use crate::serial::{SerialLineDevice, PPS_LINE_BITS};
use crate::time::HiResTime;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Start monitoring one device in a new thread. `serial` supplies
/// modem-control-line edges; `kernel` is the optional higher-precision
/// source, paired with `ctx.kernel_handle`.
pub fn activate(
    ctx: Arc<PpsThreadCtx>,
    serial: Box<dyn SerialLineDevice>,
    kernel: Option<Box<dyn KernelPpsDevice>>,
) -> JoinHandle<()> {
    thread::spawn(move || worker_loop(ctx, serial, kernel))
}

/// Ask the worker to stop. It notices at its next loop iteration —
/// there is no guarantee of immediate termination, since the thread
/// may currently be blocked in `wait_for_change`.
pub fn deactivate(ctx: &PpsThreadCtx) {
    let mut hooks = ctx.hooks();
    hooks.report_hook = None;
    hooks.pps_hook = None;
}

fn worker_loop(ctx: Arc<PpsThreadCtx>, mut serial: Box<dyn SerialLineDevice>, mut kernel: Option<Box<dyn KernelPpsDevice>>) {
    let mut history = EdgeHistory::new();
    let mut correlator = FixCorrelator::new();
    // Mirrors ppsthread.c's `state_last`/`unchanged` locals: the
    // previous masked status word and how many reads in a row it has
    // held steady. Both the edge's polarity and the stuck-line/
    // invisible-pulse decision are derived from the same word, so they
    // live together here rather than behind a separate guard type.
    let mut state_last: i32 = 0;
    let mut unchanged: u32 = 0;

    ctx.hooks().log(&ctx, LogLevel::Inf, "PPS worker starting");

    loop {
        if ctx.hooks().should_terminate() {
            break;
        }

        let event = match serial.wait_for_change() {
            Ok(event) => event,
            Err(err) => {
                ctx.hooks().log(&ctx, LogLevel::Error, &format!("line wait failed: {err}"));
                break;
            }
        };

        let state = event.status_bits & PPS_LINE_BITS;
        let edge: u8 = if state > state_last { 1 } else { 0 };
        // cycle/duration are computed against the history as it stood
        // before this edge, same as the original: the unchanged-word
        // decision below needs `cycle_us` to tell a genuinely stuck line
        // from a pulse so short TIOCMIWAIT caught it but the bits never
        // visibly moved.
        let (cycle_us, mut duration_us) = history.observe(edge, event.observed_at);

        if state == state_last {
            if cycle_us > ctx.config.one_hz_window_low_us && cycle_us < ctx.config.one_hz_window_high_us {
                duration_us = 0;
                unchanged = 0;
                ctx.hooks().log(&ctx, LogLevel::Raw, "pps-detect invisible pulse");
            } else {
                unchanged += 1;
                if unchanged >= ctx.config.stuck_line_threshold {
                    unchanged = 1;
                    ctx.hooks().log(
                        &ctx,
                        LogLevel::Warn,
                        &format!("TIOCMIWAIT returns unchanged state, sleeping {}s", ctx.config.stuck_line_sleep_secs),
                    );
                    thread::sleep(Duration::from_secs(ctx.config.stuck_line_sleep_secs));
                }
            }
        } else {
            ctx.hooks().log(&ctx, LogLevel::Raw, &format!("pps-detect changed to {state}"));
            unchanged = 0;
        }
        state_last = state;

        if unchanged != 0 {
            // Not really unchanged this iteration, just out of the
            // invisible-pulse window — try again rather than classify
            // a cycle we already know is bogus.
            continue;
        }

        let mut selected_ts = event.observed_at;

        if let (Some(kdev), Some(handle)) = (kernel.as_mut(), ctx.kernel_handle) {
            if let Ok(sample) = kdev.fetch(handle, Some(Duration::ZERO)) {
                let kernel_ts = later_kernel_edge(&sample);
                if kernel_ts != HiResTime::ZERO {
                    selected_ts = kernel_ts;
                    ctx.hooks().log(&ctx, LogLevel::Prog, "preferring kernel PPS timestamp over line timestamp");
                }
            }
        }

        let outcome = classify_pulse(edge, cycle_us, duration_us, &ctx.config);
        match outcome {
            ClassifyOutcome::Reject(reason) => {
                ctx.hooks().log(&ctx, LogLevel::Raw, &format!("rejected: {reason}"));
            }
            ClassifyOutcome::Accept(label) => {
                let fix = ctx.shared.snapshot_fix();
                match correlator.correlate(selected_ts, fix) {
                    Ok(pps) => {
                        ctx.shared.publish_pulse(pps);
                        let hooks = ctx.hooks();
                        let description = hooks.report_hook.as_ref().map(|hook| hook.report(&ctx, &pps));
                        if let Some(hook) = &hooks.pps_hook {
                            hook.pulse(&ctx, &pps);
                        }
                        drop(hooks);
                        ctx.hooks().log(
                            &ctx,
                            LogLevel::Inf,
                            &format!("accepted {label}: {} ({})", pps.real, description.unwrap_or_default()),
                        );
                    }
                    Err(reason) => {
                        ctx.hooks().log(&ctx, LogLevel::Raw, &format!("accepted {label} but not reported: {reason}"));
                    }
                }
            }
        }
    }

    if let (Some(mut kdev), Some(handle)) = (kernel, ctx.kernel_handle) {
        kdev.destroy(handle);
    }

    let hooks = ctx.hooks();
    if let Some(wrap) = &hooks.wrap_hook {
        wrap.wrap(&ctx);
    }
    drop(hooks);
    ctx.hooks().log(&ctx, LogLevel::Inf, "PPS worker exiting");
}

/// Whichever of a kernel sample's two timestamps is the more recent
/// edge, compared seconds-first then nanoseconds — independent of
/// whatever polarity the serial backend derived this iteration, since
/// the kernel and serial backends can disagree.
fn later_kernel_edge(sample: &KernelPpsSample) -> HiResTime {
    if sample.assert.sec > sample.clear.sec {
        sample.assert
    } else if sample.assert.sec < sample.clear.sec {
        sample.clear
    } else if sample.assert.nsec > sample.clear.nsec {
        sample.assert
    } else {
        sample.clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::hooks::{PpsHook, PpsHooks, ReportHook};
    use crate::kernel::FakeKernelPpsDevice;
    use crate::serial::FakeSerialLineDevice;
    use crate::time::TimeDelta;
    use std::sync::Mutex as StdMutex;

    struct CountingPps(Arc<StdMutex<u64>>);
    impl PpsHook for CountingPps {
        fn pulse(&self, _ctx: &PpsThreadCtx, _pps: &TimeDelta) {
            *self.0.lock().unwrap() += 1;
        }
    }
    struct NullReport;
    impl ReportHook for NullReport {
        fn report(&self, _ctx: &PpsThreadCtx, _pps: &TimeDelta) -> String {
            "test".to_string()
        }
    }

    #[test]
    fn worker_exits_when_no_events_available() {
        let counter = Arc::new(StdMutex::new(0u64));
        let mut hooks = PpsHooks::new();
        hooks.report_hook = Some(Box::new(NullReport));
        hooks.pps_hook = Some(Box::new(CountingPps(counter.clone())));

        let ctx = Arc::new(PpsThreadCtx::new("test0", -1, MonitorConfig::default(), hooks));
        let serial: Box<dyn SerialLineDevice> = Box::new(FakeSerialLineDevice::new());
        worker_loop(ctx.clone(), serial, None);

        assert_eq!(*counter.lock().unwrap(), 0);
        assert_eq!(ctx.shared.last_pulse().1, 0);
    }

    #[test]
    fn unchanged_word_in_window_accepts_as_invisible_pulse() {
        let counter = Arc::new(StdMutex::new(0u64));
        let mut hooks = PpsHooks::new();
        hooks.report_hook = Some(Box::new(NullReport));
        hooks.pps_hook = Some(Box::new(CountingPps(counter.clone())));

        let ctx = Arc::new(PpsThreadCtx::new("test0", -1, MonitorConfig::default(), hooks));
        ctx.shared.stash_fix(HiResTime::new(999, 0), HiResTime::new(1000, 0));

        // The first edge only primes the history. The second read
        // repeats the same status word a second later: the word never
        // changed, but the cycle sits inside the invisible-pulse
        // window, so it must be accepted rather than counted toward
        // the stuck-line threshold.
        let mut serial = FakeSerialLineDevice::new();
        serial.push(0x40, HiResTime::new(1000, 0));
        serial.push(0x40, HiResTime::new(1001, 0));
        let serial: Box<dyn SerialLineDevice> = Box::new(serial);

        worker_loop(ctx.clone(), serial, None);

        assert_eq!(*counter.lock().unwrap(), 1);
        let (last, count) = ctx.shared.last_pulse();
        assert_eq!(count, 1);
        assert_eq!(last.real, HiResTime::new(1000, 0));
    }

    #[test]
    fn polarity_follows_word_comparison_not_absolute_bits() {
        let counter = Arc::new(StdMutex::new(0u64));
        let mut hooks = PpsHooks::new();
        hooks.report_hook = Some(Box::new(NullReport));
        hooks.pps_hook = Some(Box::new(CountingPps(counter.clone())));

        let ctx = Arc::new(PpsThreadCtx::new("test0", -1, MonitorConfig::default(), hooks));
        ctx.shared.stash_fix(HiResTime::new(999, 0), HiResTime::new(1000, 0));

        // Both masked words are nonzero throughout (the line idles
        // asserted), so a bare `bits != 0` polarity test would call
        // every edge "assert". Only the numeric state/state_last
        // comparison tells 0x140 -> 0x40 -> 0x140 apart as a real
        // falling/rising pair.
        let mut serial = FakeSerialLineDevice::new();
        serial.push(0x140, HiResTime::new(1000, 0));
        serial.push(0x40, HiResTime::new(1000, 500_000_000));
        serial.push(0x140, HiResTime::new(1001, 0));
        let serial: Box<dyn SerialLineDevice> = Box::new(serial);

        worker_loop(ctx.clone(), serial, None);

        assert_eq!(*counter.lock().unwrap(), 1);
        let (last, count) = ctx.shared.last_pulse();
        assert_eq!(count, 1);
        assert_eq!(last.real, HiResTime::new(1000, 0));
    }

    #[test]
    fn genuinely_stuck_line_sleeps_and_skips_classification() {
        let mut hooks = PpsHooks::new();
        hooks.report_hook = Some(Box::new(NullReport));
        hooks.pps_hook = Some(Box::new(CountingPps(Arc::new(StdMutex::new(0)))));
        let config = MonitorConfig { stuck_line_threshold: 2, stuck_line_sleep_secs: 0, ..MonitorConfig::default() };
        let ctx = Arc::new(PpsThreadCtx::new("test0", -1, config, hooks));

        // Same word, same timestamp, every read: a cycle of zero is
        // nowhere near the invisible-pulse window, so this must count
        // toward the stuck-line threshold and never reach the classifier.
        let mut serial = FakeSerialLineDevice::new();
        serial.push(0x40, HiResTime::new(100, 0));
        serial.push(0x40, HiResTime::new(100, 0));
        serial.push(0x40, HiResTime::new(100, 0));
        let serial: Box<dyn SerialLineDevice> = Box::new(serial);

        worker_loop(ctx.clone(), serial, None);

        assert_eq!(ctx.shared.last_pulse().1, 0);
    }

    #[test]
    fn deactivate_stops_loop_before_next_wait() {
        let mut hooks = PpsHooks::new();
        hooks.report_hook = Some(Box::new(NullReport));
        let ctx = Arc::new(PpsThreadCtx::new("test0", -1, MonitorConfig::default(), hooks));
        deactivate(&ctx);
        assert!(ctx.hooks().should_terminate());
    }

    #[test]
    fn kernel_timestamp_preferred_when_available() {
        let mut hooks = PpsHooks::new();
        hooks.report_hook = Some(Box::new(NullReport));
        hooks.pps_hook = Some(Box::new(CountingPps(Arc::new(StdMutex::new(0)))));
        let mut ctx_builder = PpsThreadCtx::new("test0", -1, MonitorConfig::default(), hooks);
        ctx_builder.kernel_handle = Some(crate::kernel::KernelPpsHandle(1));
        let ctx = Arc::new(ctx_builder);
        ctx.shared.stash_fix(HiResTime::new(999, 0), HiResTime::new(1000, 0));

        let mut serial = FakeSerialLineDevice::new();
        serial.push(0x40, HiResTime::new(1000, 0));
        serial.push(0x40, HiResTime::new(1001, 0));

        let mut kernel_dev = FakeKernelPpsDevice::new();
        kernel_dev.push(crate::kernel::KernelPpsSample::default());
        kernel_dev.push(crate::kernel::KernelPpsSample { assert: HiResTime::new(1001, 123), ..Default::default() });

        worker_loop(ctx.clone(), Box::new(serial), Some(Box::new(kernel_dev)));

        let (last, _) = ctx.shared.last_pulse();
        assert_eq!(last.clock, HiResTime::new(1001, 123));
    }
}
