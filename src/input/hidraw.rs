use super::DeviceTransport;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// A `/dev/hidrawN` node held exclusively for the lifetime of the value.
///
/// Exclusivity is an advisory `flock` taken at open. hidraw sits beside the
/// kernel's own HID input handling, so no driver has to be detached first.
pub struct HidrawDevice {
    file: File,
    path: PathBuf,
}

impl HidrawDevice {
    /// Open for blocking reads. A node already locked by another process
    /// fails with [`io::ErrorKind::WouldBlock`].
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl DeviceTransport for HidrawDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}
