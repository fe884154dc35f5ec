//! Where processed board state goes.

pub mod log_sink;
#[cfg(target_os = "linux")]
pub mod uinput_sink;

use crate::session::SessionState;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create virtual input device: {0}")]
    Create(#[source] io::Error),
    #[error("failed to inject input events: {0}")]
    Write(#[source] io::Error),
}

/// Receives the session state after every processed frame.
///
/// The same state may arrive many times in a row; implementations only act
/// on what changed.
pub trait OutputSink {
    fn emit(&mut self, state: &SessionState) -> Result<(), SinkError>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn emit(&mut self, state: &SessionState) -> Result<(), SinkError> {
        (**self).emit(state)
    }
}

/// Screen axis range advertised to the host.
pub const AXIS_MAX: i32 = 0xFFFF;

/// Round a calibrated coordinate into the advertised axis range.
pub fn axis_value(v: f64) -> i32 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, f64::from(AXIS_MAX)) as i32
}
