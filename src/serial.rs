//! Userspace serial-line backend: waits on modem-control-line changes
//! via `TIOCMIWAIT` and timestamps the edge itself with
//! `CLOCK_REALTIME`. Used whenever no kernel PPS source is bound to the
//! device, and as the line-state source for stuck-line mitigation even
//! when a kernel source is also present.

use crate::error::MonitorError;
use crate::time::HiResTime;

/// The modem status bits carrying PPS on a serial line: carrier
/// detect, ring indicator, and (less common) CTS.
pub const PPS_LINE_BITS: i32 = 0x40 | 0x100 | 0x80; // TIOCM_CAR | TIOCM_RI | TIOCM_CTS

/// One observed line transition: which bits changed, their new state,
/// and when the backend saw it.
#[derive(Debug, Clone, Copy)]
pub struct LineEvent {
    pub status_bits: i32,
    pub observed_at: HiResTime,
}

/// A source of serial modem-control-line transitions.
pub trait SerialLineDevice: Send {
    /// Block until the line state changes (or the platform wait call
    /// fails) and return the new status bits with a local timestamp
    /// taken immediately after the wait returns.
    fn wait_for_change(&mut self) -> Result<LineEvent, MonitorError>;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxSerialLineDevice;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::os::unix::io::RawFd;

    const TIOCMIWAIT: libc::c_ulong = 0x545C;
    const TIOCMGET: libc::c_ulong = 0x5415;

    /// Waits on a real tty's modem-control lines via `ioctl(2)`.
    pub struct LinuxSerialLineDevice {
        fd: RawFd,
    }

    impl LinuxSerialLineDevice {
        pub fn new(fd: RawFd) -> Self {
            LinuxSerialLineDevice { fd }
        }
    }

    impl SerialLineDevice for LinuxSerialLineDevice {
        fn wait_for_change(&mut self) -> Result<LineEvent, MonitorError> {
            let rc = unsafe { libc::ioctl(self.fd, TIOCMIWAIT, PPS_LINE_BITS) };
            if rc < 0 {
                return Err(MonitorError::WaitFailed(std::io::Error::last_os_error()));
            }
            let observed_at = HiResTime::now();
            let mut status: i32 = 0;
            let rc = unsafe { libc::ioctl(self.fd, TIOCMGET, &mut status as *mut i32) };
            if rc < 0 {
                return Err(MonitorError::WaitFailed(std::io::Error::last_os_error()));
            }
            Ok(LineEvent { status_bits: status & PPS_LINE_BITS, observed_at })
        }
    }
}

#[cfg(test)]
pub use test_support::FakeSerialLineDevice;

#[cfg(test)]
mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted replacement for a real tty: each [`Self::push`] queues
    /// one [`LineEvent`] for the next `wait_for_change` call.
    #[derive(Default)]
    pub struct FakeSerialLineDevice {
        events: VecDeque<LineEvent>,
    }

    impl FakeSerialLineDevice {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&mut self, status_bits: i32, observed_at: HiResTime) {
            self.events.push_back(LineEvent { status_bits, observed_at });
        }
    }

    impl SerialLineDevice for FakeSerialLineDevice {
        fn wait_for_change(&mut self) -> Result<LineEvent, MonitorError> {
            self.events
                .pop_front()
                .ok_or_else(|| MonitorError::WaitFailed(std::io::Error::from(std::io::ErrorKind::WouldBlock)))
        }
    }

    #[test]
    fn fake_replays_scripted_events_in_order() {
        let mut dev = FakeSerialLineDevice::new();
        dev.push(0x40, HiResTime::new(1, 0));
        dev.push(0, HiResTime::new(1, 500_000_000));

        let e1 = dev.wait_for_change().unwrap();
        let e2 = dev.wait_for_change().unwrap();
        assert_eq!(e1.status_bits, 0x40);
        assert_eq!(e2.observed_at, HiResTime::new(1, 500_000_000));
        assert!(dev.wait_for_change().is_err());
    }
}
