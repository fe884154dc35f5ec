#[cfg(target_os = "linux")]
pub mod hidraw;

use crate::protocol::{self, DecodedReading, FrameError};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Large enough for any hidraw report; eBeam reports are 8 bytes.
pub const REPORT_BUF_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read from {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} reached end of stream")]
    Closed { path: PathBuf },
    #[error("{path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: FrameError,
    },
}

/// An opened receiver. Dropping the transport releases the device.
pub trait DeviceTransport: Send {
    fn path(&self) -> &Path;

    /// Block until the next report arrives. `Ok(0)` means end of stream.
    fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Read and split exactly one report.
pub fn read_frame(transport: &mut dyn DeviceTransport) -> Result<DecodedReading, TransportError> {
    let mut buf = [0u8; REPORT_BUF_LEN];
    let len = loop {
        match transport.read_report(&mut buf) {
            Ok(0) => {
                return Err(TransportError::Closed {
                    path: transport.path().to_path_buf(),
                })
            }
            Ok(n) => break n.min(buf.len()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransportError::Io {
                    path: transport.path().to_path_buf(),
                    source,
                })
            }
        }
    };
    protocol::decode(&buf[..len]).map_err(|source| TransportError::Malformed {
        path: transport.path().to_path_buf(),
        source,
    })
}
