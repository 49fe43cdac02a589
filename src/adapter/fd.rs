//! File-descriptor backed virtual interface.
//!
//! Wraps a TUN descriptor (created locally or handed over by a mobile host)
//! in the tokio reactor so both pumps wait on readiness instead of polling.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use libc::{c_void, fcntl, F_GETFL, F_SETFL, O_NONBLOCK};
use tokio::io::unix::AsyncFd;
use tracing::debug;

use crate::host::VirtualInterface;

/// Packet I/O over a non-blocking descriptor.
pub struct FdInterface {
    name: String,
    fd: AsyncFd<OwnedFd>,
    closed: AtomicBool,
}

impl FdInterface {
    /// Take ownership of `fd` and register it with the reactor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(fd: OwnedFd, name: impl Into<String>) -> io::Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        Ok(Self {
            name: name.into(),
            fd: AsyncFd::new(fd)?,
            closed: AtomicBool::new(false),
        })
    }

    /// Wrap a raw descriptor received from a host.
    ///
    /// # Safety
    /// `fd` must be an open descriptor not owned by anything else.
    pub unsafe fn from_raw_fd(fd: RawFd, name: impl Into<String>) -> io::Result<Self> {
        Self::new(OwnedFd::from_raw_fd(fd), name)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("interface {} is closed", self.name),
            ));
        }
        Ok(())
    }
}

impl AsRawFd for FdInterface {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = fcntl(fd, F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if flags & O_NONBLOCK == 0 && fcntl(fd, F_SETFL, flags | O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn write_fd(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[async_trait]
impl VirtualInterface for FdInterface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.check_open()?;
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| read_fd(inner.as_raw_fd(), buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        loop {
            self.check_open()?;
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| write_fd(inner.as_raw_fd(), packet)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Mark the interface closed. The descriptor is released when the last
    /// handle is dropped at the end of the attempt.
    fn close(&self) -> io::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(device = %self.name, "Interface closed");
        }
        Ok(())
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.fd.as_raw_fd())
    }
}
