//! Per-device context the worker loop carries for its whole lifetime.

use crate::config::MonitorConfig;
use crate::hooks::PpsHooks;
use crate::kernel::KernelPpsHandle;
use crate::shared::SharedState;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

/// Everything the worker needs to monitor one device: its name, its
/// open file descriptor, an optional kernel PPS handle, the tunables,
/// the fix/pulse exchange slot, and the caller's hooks.
///
/// Held by both the caller and the worker thread behind an `Arc`.
/// `hooks` is the one field the caller mutates after `activate` — via
/// [`crate::monitor::deactivate`] — so it gets its own mutex rather
/// than requiring the whole context to be rebuilt to stop the worker.
pub struct PpsThreadCtx {
    pub device_name: String,
    pub device_fd: RawFd,
    pub kernel_handle: Option<KernelPpsHandle>,
    pub config: MonitorConfig,
    pub shared: Arc<SharedState>,
    pub hooks: Mutex<PpsHooks>,
}

impl PpsThreadCtx {
    pub fn new(device_name: impl Into<String>, device_fd: RawFd, config: MonitorConfig, hooks: PpsHooks) -> Self {
        PpsThreadCtx {
            device_name: device_name.into(),
            device_fd,
            kernel_handle: None,
            config,
            shared: Arc::new(SharedState::new()),
            hooks: Mutex::new(hooks),
        }
    }

    pub(crate) fn hooks(&self) -> std::sync::MutexGuard<'_, PpsHooks> {
        match self.hooks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("PPS hooks mutex poisoned, proceeding anyway");
                poisoned.into_inner()
            }
        }
    }
}
