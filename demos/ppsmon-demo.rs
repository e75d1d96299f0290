//! Minimal driver program for the monitor engine: wires a simulated
//! serial PPS source to [`gnss_pps_monitor::monitor`] and prints every
//! accepted pulse until Ctrl+C.
//!
//! Not a GNSS daemon in its own right — the device/CLI/config plumbing
//! a real one needs lives in the surrounding daemon, not here.

use anyhow::{Context, Result};
use gnss_pps_monitor::config::MonitorConfig;
use gnss_pps_monitor::hooks::{LogHook, LogLevel, PpsHooks, ReportHook};
use gnss_pps_monitor::serial::{LineEvent, SerialLineDevice};
use gnss_pps_monitor::{deactivate, HiResTime, PpsThreadCtx, TimeDelta};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// A free-running simulated line: flips polarity once a second, close
/// enough to a real receiver's 1 Hz square wave to exercise the
/// classifier without hardware.
struct SimulatedLine {
    bit: i32,
}

impl SerialLineDevice for SimulatedLine {
    fn wait_for_change(&mut self) -> Result<LineEvent, gnss_pps_monitor::MonitorError> {
        std::thread::sleep(Duration::from_millis(500));
        self.bit = if self.bit == 0 { 0x40 } else { 0 };
        let observed_at = HiResTime::now();
        Ok(LineEvent { status_bits: self.bit, observed_at })
    }
}

struct PrintingReport;
impl ReportHook for PrintingReport {
    fn report(&self, _ctx: &PpsThreadCtx, _pps: &TimeDelta) -> String {
        "demo".to_string()
    }
}

struct TracingLog;
impl LogHook for TracingLog {
    fn log(&self, _ctx: &PpsThreadCtx, _level: LogLevel, _message: &str) {
        // tracing already gets every message via PpsHooks::log; this
        // hook exists only to prove a caller-supplied log_hook runs too.
    }
}

fn main() -> Result<()> {
    init_logging()?;
    info!("gnss-pps-monitor demo starting");

    let mut hooks = PpsHooks::new();
    hooks.log_hook = Some(Box::new(TracingLog));
    hooks.report_hook = Some(Box::new(PrintingReport));

    let ctx = Arc::new(PpsThreadCtx::new("sim0", -1, MonitorConfig::default(), hooks));

    // Feed the decoder side with a fix once a second so correlation has
    // something to attribute edges to.
    let feeder_ctx = ctx.clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(1));
        let now = unix_now();
        feeder_ctx.shared.stash_fix(HiResTime::new(now.sec, 0), now);
    });

    let serial = SimulatedLine { bit: 0 };
    let worker = gnss_pps_monitor::activate(ctx.clone(), Box::new(serial), None);

    install_ctrlc_handler(ctx.clone())?;

    let reporter_ctx = ctx.clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(1));
        let (last, count) = reporter_ctx.shared.last_pulse();
        info!("pulses so far: {count}, last: {}", last.real);
    });

    worker.join().expect("worker thread panicked");
    info!("gnss-pps-monitor demo stopped");
    Ok(())
}

fn unix_now() -> HiResTime {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    HiResTime::new(d.as_secs() as i64, d.subsec_nanos() as i32)
}

fn install_ctrlc_handler(ctx: Arc<PpsThreadCtx>) -> Result<()> {
    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let ctrl_c_count = Arc::new(AtomicU8::new(0));

    ctrlc::set_handler(move || {
        let count = ctrl_c_count.fetch_add(1, Ordering::SeqCst);
        if count == 0 {
            warn!("Ctrl+C received, press again within 5s to stop");
            let count_disarm = ctrl_c_count.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_secs(5));
                if count_disarm.load(Ordering::SeqCst) == 1 {
                    count_disarm.store(0, Ordering::SeqCst);
                    info!("shutdown cancelled");
                }
            });
        } else {
            warn!("stopping");
            shutdown_requested.store(true, Ordering::SeqCst);
            deactivate(&ctx);
        }
    })
    .context("failed to install Ctrl+C handler")
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to create log filter")?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
