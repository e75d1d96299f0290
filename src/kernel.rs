//! RFC 2783 kernel PPS (`/dev/pps*`) backend.
//!
//! When the serial line's carrier-detect signal is also wired to a
//! kernel PPS source (the common case on Linux SBCs), the kernel
//! timestamps the edge in the IRQ handler — far tighter than anything
//! a userspace `TIOCMIWAIT` wakeup can manage. [`KernelPpsDevice`]
//! abstracts over that source so [`crate::monitor`] can prefer it
//! without caring whether it is real hardware or a test double.

use crate::error::MonitorError;
use crate::time::HiResTime;
#[cfg(target_os = "linux")]
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Handle returned by [`KernelPpsDevice::create`]; opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPpsHandle(pub(crate) i32);

/// One fetch's worth of kernel-timestamped edges. A kernel PPS source
/// captures both polarities per RFC 2783; whichever edge actually moved
/// since the last fetch is the one the caller should trust.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelPpsSample {
    pub assert: HiResTime,
    pub assert_sequence: u32,
    pub clear: HiResTime,
    pub clear_sequence: u32,
}

/// A source of kernel-timestamped PPS edges.
pub trait KernelPpsDevice: Send {
    /// Open the device at `path` and configure it to capture both
    /// edges with `CLOCK_REALTIME`-comparable timestamps.
    fn create(&mut self, path: &str) -> Result<KernelPpsHandle, MonitorError>;

    /// Block up to `timeout` for a new edge (None blocks indefinitely;
    /// `Some(Duration::ZERO)` polls without blocking, used when the
    /// serial backend is already doing the waiting this iteration).
    fn fetch(&mut self, handle: KernelPpsHandle, timeout: Option<Duration>) -> Result<KernelPpsSample, MonitorError>;

    fn destroy(&mut self, handle: KernelPpsHandle);
}

#[cfg(target_os = "linux")]
pub use linux::LinuxKernelPpsDevice;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::ffi::CString;
    use std::mem::{size_of, MaybeUninit};

    const IOC_NRBITS: u32 = 8;
    const IOC_TYPEBITS: u32 = 8;
    const IOC_SIZEBITS: u32 = 14;
    const IOC_NRSHIFT: u32 = 0;
    const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
    const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
    const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
    const IOC_READ: u32 = 2;
    const IOC_WRITE: u32 = 1;

    const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> libc::c_ulong {
        ((dir << IOC_DIRSHIFT) | (ty << IOC_TYPESHIFT) | (nr << IOC_NRSHIFT) | (size << IOC_SIZESHIFT)) as libc::c_ulong
    }

    const PPS_IOC_TYPE: u32 = b'1' as u32;

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct PpsKtime {
        sec: i64,
        nsec: i32,
        flags: u32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct PpsKparams {
        api_version: i32,
        mode: i32,
        assert_off_tu: PpsKtime,
        clear_off_tu: PpsKtime,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct PpsKinfo {
        assert_sequence: u32,
        clear_sequence: u32,
        assert_tu: PpsKtime,
        clear_tu: PpsKtime,
        current_mode: i32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct PpsFdata {
        info: PpsKinfo,
        timeout: PpsKtime,
    }

    const PPS_CAPTUREBOTH: i32 = 0x01 | 0x02;
    const PPS_TSFMT_TSPEC: i32 = 0x1000;
    const PPS_CANWAIT: u32 = 0x100;

    fn ppsgetparams() -> libc::c_ulong {
        ioc(IOC_READ, PPS_IOC_TYPE, 0xa1, size_of::<PpsKparams>() as u32)
    }
    fn ppssetparams() -> libc::c_ulong {
        ioc(IOC_WRITE, PPS_IOC_TYPE, 0xa2, size_of::<PpsKparams>() as u32)
    }
    fn ppsfetch() -> libc::c_ulong {
        ioc(IOC_READ | IOC_WRITE, PPS_IOC_TYPE, 0xa4, size_of::<PpsFdata>() as u32)
    }

    /// Opens `/dev/pps*` character devices and drives them through the
    /// RFC 2783 ioctl set.
    #[derive(Default)]
    pub struct LinuxKernelPpsDevice {
        fd: Option<RawFd>,
    }

    impl LinuxKernelPpsDevice {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl KernelPpsDevice for LinuxKernelPpsDevice {
        fn create(&mut self, path: &str) -> Result<KernelPpsHandle, MonitorError> {
            let c_path = CString::new(path).map_err(|_| MonitorError::KernelDeviceNotFound(path.to_string()))?;
            let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
            if fd < 0 {
                return Err(MonitorError::KernelDeviceNotFound(path.to_string()));
            }

            let mut params = PpsKparams {
                api_version: 1,
                mode: PPS_CAPTUREBOTH | PPS_TSFMT_TSPEC | PPS_CANWAIT as i32,
                ..Default::default()
            };
            let getp = unsafe { libc::ioctl(fd, ppsgetparams(), &mut params as *mut PpsKparams) };
            if getp < 0 {
                unsafe { libc::close(fd) };
                return Err(MonitorError::WaitFailed(std::io::Error::last_os_error()));
            }
            params.mode = PPS_CAPTUREBOTH | PPS_TSFMT_TSPEC;
            let setp = unsafe { libc::ioctl(fd, ppssetparams(), &params as *const PpsKparams) };
            if setp < 0 {
                unsafe { libc::close(fd) };
                return Err(MonitorError::WaitFailed(std::io::Error::last_os_error()));
            }

            self.fd = Some(fd);
            Ok(KernelPpsHandle(fd))
        }

        fn fetch(&mut self, handle: KernelPpsHandle, timeout: Option<Duration>) -> Result<KernelPpsSample, MonitorError> {
            let mut fdata = MaybeUninit::<PpsFdata>::zeroed();
            let timeout_ktime = match timeout {
                Some(d) => PpsKtime { sec: d.as_secs() as i64, nsec: d.subsec_nanos() as i32, flags: 0 },
                None => PpsKtime { sec: 0, nsec: 0, flags: 0 },
            };
            unsafe {
                (*fdata.as_mut_ptr()).timeout = timeout_ktime;
            }
            let rc = unsafe { libc::ioctl(handle.0, ppsfetch(), fdata.as_mut_ptr()) };
            if rc < 0 {
                return Err(MonitorError::WaitFailed(std::io::Error::last_os_error()));
            }
            let fdata = unsafe { fdata.assume_init() };
            Ok(KernelPpsSample {
                assert: HiResTime::new(fdata.info.assert_tu.sec, fdata.info.assert_tu.nsec),
                assert_sequence: fdata.info.assert_sequence,
                clear: HiResTime::new(fdata.info.clear_tu.sec, fdata.info.clear_tu.nsec),
                clear_sequence: fdata.info.clear_sequence,
            })
        }

        fn destroy(&mut self, handle: KernelPpsHandle) {
            unsafe {
                libc::close(handle.0);
            }
            self.fd = None;
        }
    }
}

/// Stand-in for platforms with no kernel PPS API. Every call fails with
/// [`MonitorError::KernelDeviceNotFound`], which is exactly what the
/// backend-arbitration logic in [`crate::monitor`] treats as "fall back
/// to the serial-only path".
#[derive(Default)]
pub struct UnsupportedKernelPpsDevice;

impl KernelPpsDevice for UnsupportedKernelPpsDevice {
    fn create(&mut self, path: &str) -> Result<KernelPpsHandle, MonitorError> {
        Err(MonitorError::KernelDeviceNotFound(path.to_string()))
    }

    fn fetch(&mut self, _handle: KernelPpsHandle, _timeout: Option<Duration>) -> Result<KernelPpsSample, MonitorError> {
        Err(MonitorError::KernelDeviceNotFound("unsupported platform".to_string()))
    }

    fn destroy(&mut self, _handle: KernelPpsHandle) {}
}

#[cfg(test)]
pub use test_support::FakeKernelPpsDevice;
