//! The read/decode/emit loop and its reconnection policy.

use crate::calibration::CalibrationMatrix;
use crate::discovery::{Discover, LocatorError};
use crate::output::{OutputSink, SinkError};
use crate::protocol::{ButtonState, KeySet};
use crate::session::{DriverSession, FrameProcessor, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest sleep between stop-flag checks while backing off.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no receiver available: {0}")]
    NoDevice(#[source] LocatorError),
    #[error("output failed: {0}")]
    Sink(#[source] SinkError),
}

/// Why [`DriverLoop::run`] returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The stop flag was raised.
    Stopped,
    /// The receiver went away and retrying is disabled.
    DeviceLost,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Search again after the receiver is lost or not found.
    pub retry: bool,
    pub backoff: Duration,
    pub calibration: CalibrationMatrix,
    pub smoothing: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            retry: true,
            backoff: Duration::from_millis(500),
            calibration: CalibrationMatrix::IDENTITY,
            smoothing: false,
        }
    }
}

enum LoopState {
    Searching,
    Connected(DriverSession),
    Terminated(LoopExit),
}

pub struct DriverLoop<L, S> {
    locator: L,
    sink: S,
    config: LoopConfig,
    stop: Arc<AtomicBool>,
    waiting_logged: bool,
}

impl<L: Discover, S: OutputSink> DriverLoop<L, S> {
    pub fn new(locator: L, sink: S, config: LoopConfig, stop: Arc<AtomicBool>) -> Self {
        Self {
            locator,
            sink,
            config,
            stop,
            waiting_logged: false,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Drive the receiver until stopped, lost without retry, or the sink fails.
    pub fn run(&mut self) -> Result<LoopExit, DriverError> {
        let mut state = LoopState::Searching;
        loop {
            if self.stopped() {
                if let LoopState::Connected(session) = state {
                    self.close(session)?;
                }
                return Ok(LoopExit::Stopped);
            }
            state = match state {
                LoopState::Searching => self.search()?,
                LoopState::Connected(session) => self.step(session)?,
                LoopState::Terminated(exit) => return Ok(exit),
            };
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn search(&mut self) -> Result<LoopState, DriverError> {
        match self.locator.discover() {
            Ok(transport) => {
                self.waiting_logged = false;
                info!("session opened on {}", transport.path().display());
                let processor =
                    FrameProcessor::new(self.config.calibration, self.config.smoothing);
                Ok(LoopState::Connected(DriverSession::new(transport, processor)))
            }
            Err(e) if !self.config.retry => Err(DriverError::NoDevice(e)),
            Err(e) => {
                if self.waiting_logged {
                    debug!("{e}, retrying in {:?}", self.config.backoff);
                } else {
                    info!("{e}, waiting for a receiver");
                    self.waiting_logged = true;
                }
                self.backoff();
                Ok(LoopState::Searching)
            }
        }
    }

    fn step(&mut self, mut session: DriverSession) -> Result<LoopState, DriverError> {
        match session.next_frame() {
            Ok(_) => {
                let state = *session.state();
                if let Err(e) = self.sink.emit(&state) {
                    info!("session on {} closed", session.path().display());
                    drop(session);
                    return Err(DriverError::Sink(e));
                }
                Ok(LoopState::Connected(session))
            }
            Err(e) => {
                warn!("lost receiver: {e}");
                self.close(session)?;
                if self.config.retry {
                    Ok(LoopState::Searching)
                } else {
                    Ok(LoopState::Terminated(LoopExit::DeviceLost))
                }
            }
        }
    }

    /// Release the device, then let go of anything still held on the host.
    fn close(&mut self, session: DriverSession) -> Result<(), DriverError> {
        info!(
            "session on {} closed after {} frames",
            session.path().display(),
            session.frames()
        );
        let released = SessionState {
            raw_buttons: ButtonState::RELEASED,
            buttons: ButtonState::RELEASED,
            keys: KeySet::EMPTY,
            ..*session.state()
        };
        drop(session);
        self.sink.emit(&released).map_err(DriverError::Sink)
    }

    fn backoff(&self) {
        let deadline = Instant::now() + self.config.backoff;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_POLL));
        }
    }
}
