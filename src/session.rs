//! Per-connection state: everything between opening a receiver and losing it.

use crate::calibration::{CalibratedPoint, CalibrationMatrix};
use crate::filter::{ButtonVoter, PointSmoother};
use crate::input::{self, DeviceTransport, TransportError};
use crate::protocol::{ButtonState, DecodedReading, FrameKind, KeySet, PointerTool};
use std::path::Path;
use std::time::Instant;
use tracing::trace;

/// What the driver currently believes about the board.
///
/// Replaced as a whole after every frame; sinks get a copy.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionState {
    /// Last trusted receiver coordinates.
    pub raw: (u16, u16),
    /// Last calibrated position. `None` until the first pointer frame.
    pub point: Option<CalibratedPoint>,
    /// Buttons as reported by the last trusted frame.
    pub raw_buttons: ButtonState,
    /// Buttons after the majority vote.
    pub buttons: ButtonState,
    pub keys: KeySet,
    pub tool: PointerTool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoUpdateReason {
    /// Sensor bits not both set, keepalives included.
    SensorsInvalid,
    /// The calibration maps this position to infinity.
    DegenerateScale,
}

/// Effect of one frame on the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    NoUpdate(NoUpdateReason),
    Pointer,
    Keys,
}

/// Turns decoded readings into successive [`SessionState`]s.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    calibration: CalibrationMatrix,
    voter: ButtonVoter,
    smoother: Option<PointSmoother>,
    state: SessionState,
}

impl FrameProcessor {
    pub fn new(calibration: CalibrationMatrix, smoothing: bool) -> Self {
        Self {
            calibration,
            voter: ButtonVoter::default(),
            smoother: smoothing.then(PointSmoother::default),
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn process(&mut self, reading: &DecodedReading) -> FrameOutcome {
        match reading.classify() {
            FrameKind::Invalid => FrameOutcome::NoUpdate(NoUpdateReason::SensorsInvalid),
            FrameKind::Keyboard(keys) => {
                self.voter.vote(ButtonState::RELEASED);
                self.state = SessionState {
                    raw_buttons: ButtonState::RELEASED,
                    buttons: ButtonState::RELEASED,
                    keys,
                    ..self.state
                };
                FrameOutcome::Keys
            }
            FrameKind::Pointer {
                raw_x,
                raw_y,
                buttons,
                tool,
            } => {
                let Some(point) = self.calibration.apply(raw_x, raw_y) else {
                    return FrameOutcome::NoUpdate(NoUpdateReason::DegenerateScale);
                };
                let point = match self.smoother.as_mut() {
                    Some(smoother) => smoother.smooth(point),
                    None => point,
                };
                self.state = SessionState {
                    raw: (raw_x, raw_y),
                    point: Some(point),
                    raw_buttons: buttons,
                    buttons: self.voter.vote(buttons),
                    tool,
                    ..self.state
                };
                FrameOutcome::Pointer
            }
        }
    }
}

/// An open receiver plus the state built from its frames.
///
/// Dropping the session closes the device.
pub struct DriverSession {
    transport: Box<dyn DeviceTransport>,
    processor: FrameProcessor,
    frames: u64,
    last_frame: Option<Instant>,
}

impl DriverSession {
    pub fn new(transport: Box<dyn DeviceTransport>, processor: FrameProcessor) -> Self {
        Self {
            transport,
            processor,
            frames: 0,
            last_frame: None,
        }
    }

    pub fn path(&self) -> &Path {
        self.transport.path()
    }

    pub fn state(&self) -> &SessionState {
        self.processor.state()
    }

    /// Frames processed since the device was opened.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Block for the next report and fold it into the state.
    pub fn next_frame(&mut self) -> Result<FrameOutcome, TransportError> {
        let reading = input::read_frame(self.transport.as_mut())?;
        let now = Instant::now();
        let gap = self.last_frame.map(|last| now - last);
        self.last_frame = Some(now);
        self.frames += 1;

        let outcome = self.processor.process(&reading);
        trace!(
            "frame {} [{reading}] after {gap:?}: {outcome:?}",
            self.frames
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PanelKey, KEYBOARD_SENTINEL};
    use std::collections::VecDeque;
    use std::io;
    use std::path::PathBuf;

    fn pointer(x: u16, y: u16, buttons: u8) -> DecodedReading {
        DecodedReading {
            sensor_flags: 0x03,
            raw_x: x,
            raw_y: y,
            aux: 0xC0,
            buttons,
            fiability: 0xFF,
        }
    }

    fn keyboard(aux: u8) -> DecodedReading {
        DecodedReading {
            aux,
            ..pointer(0, 0, KEYBOARD_SENTINEL)
        }
    }

    const TIP_DOWN: u8 = 0x10;
    const TIP_UP: u8 = 0x11;

    #[test]
    fn invalid_frame_leaves_state_untouched() {
        let mut p = FrameProcessor::new(CalibrationMatrix::IDENTITY, false);
        p.process(&pointer(100, 200, TIP_DOWN));
        p.process(&keyboard(1 << 3));
        let before = *p.state();

        for flags in [0x00, 0x01, 0x02] {
            let outcome = p.process(&DecodedReading {
                sensor_flags: flags,
                ..pointer(9, 9, TIP_UP)
            });
            assert_eq!(outcome, FrameOutcome::NoUpdate(NoUpdateReason::SensorsInvalid));
        }
        p.process(&crate::protocol::decode(&[0xFF; 8]).unwrap());
        assert_eq!(*p.state(), before);
    }

    #[test]
    fn keyboard_frame_sets_keys_and_releases_buttons() {
        let mut p = FrameProcessor::new(CalibrationMatrix::IDENTITY, false);
        p.process(&pointer(100, 200, TIP_DOWN));
        assert!(p.state().buttons.tip);

        assert_eq!(p.process(&keyboard((1 << 1) | (1 << 5))), FrameOutcome::Keys);
        let state = *p.state();
        assert_eq!(
            state.keys.iter().collect::<Vec<_>>(),
            vec![PanelKey::Fullscreen, PanelKey::Movie]
        );
        assert_eq!(state.buttons, ButtonState::RELEASED);
        assert_eq!(state.raw_buttons, ButtonState::RELEASED);
        assert_eq!(state.point, Some(CalibratedPoint { x: 100.0, y: 200.0 }));
    }

    #[test]
    fn keyboard_frame_replaces_previous_keys() {
        let mut p = FrameProcessor::new(CalibrationMatrix::IDENTITY, false);
        p.process(&keyboard(1 << 3));
        p.process(&keyboard(1 << 7));
        assert_eq!(p.state().keys.iter().collect::<Vec<_>>(), vec![PanelKey::Calibrate]);
        p.process(&keyboard(0));
        assert!(p.state().keys.is_empty());
    }

    #[test]
    fn pointer_frame_keeps_keys() {
        let mut p = FrameProcessor::new(CalibrationMatrix::IDENTITY, false);
        p.process(&keyboard(1 << 3));
        assert_eq!(p.process(&pointer(1, 2, TIP_UP)), FrameOutcome::Pointer);
        assert!(p.state().keys.contains(PanelKey::Print));
    }

    #[test]
    fn pointer_frame_updates_position_and_tool() {
        let mut p = FrameProcessor::new(CalibrationMatrix::IDENTITY, false);
        p.process(&pointer(300, 400, 0x51));
        let state = *p.state();
        assert_eq!(state.raw, (300, 400));
        assert_eq!(state.point, Some(CalibratedPoint { x: 300.0, y: 400.0 }));
        assert_eq!(state.tool, PointerTool::Eraser);
        assert!(!state.raw_buttons.tip);
    }

    #[test]
    fn tip_is_debounced() {
        let mut p = FrameProcessor::new(CalibrationMatrix::IDENTITY, false);
        p.process(&pointer(1, 1, TIP_DOWN));
        assert!(p.state().buttons.tip);
        p.process(&pointer(1, 1, TIP_UP));
        assert!(!p.state().raw_buttons.tip);
        assert!(!p.state().buttons.tip);
        p.process(&pointer(1, 1, TIP_UP));
        assert!(!p.state().buttons.tip);
    }

    #[test]
    fn degenerate_scale_keeps_prior_point() {
        let m = CalibrationMatrix::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, -1.0, 0.0]);
        let mut p = FrameProcessor::new(m, false);
        assert_eq!(p.process(&pointer(20, 10, TIP_UP)), FrameOutcome::Pointer);
        let before = *p.state();

        assert_eq!(
            p.process(&pointer(50, 50, TIP_DOWN)),
            FrameOutcome::NoUpdate(NoUpdateReason::DegenerateScale)
        );
        assert_eq!(*p.state(), before);
    }

    #[test]
    fn smoothing_averages_points() {
        let mut p = FrameProcessor::new(CalibrationMatrix::IDENTITY, true);
        p.process(&pointer(100, 100, TIP_UP));
        p.process(&pointer(200, 300, TIP_UP));
        assert_eq!(p.state().point, Some(CalibratedPoint { x: 150.0, y: 200.0 }));
        assert_eq!(p.state().raw, (200, 300));
    }

    struct Scripted {
        path: PathBuf,
        reads: VecDeque<Vec<u8>>,
    }

    impl DeviceTransport for Scripted {
        fn path(&self) -> &Path {
            &self.path
        }

        fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                None => Err(io::Error::other("unplugged")),
            }
        }
    }

    #[test]
    fn session_counts_frames_until_failure() {
        let transport = Scripted {
            path: PathBuf::from("/dev/hidraw0"),
            reads: VecDeque::from(vec![
                pointer(10, 20, TIP_DOWN).encode().to_vec(),
                vec![0xFF; 8],
            ]),
        };
        let mut session = DriverSession::new(
            Box::new(transport),
            FrameProcessor::new(CalibrationMatrix::IDENTITY, false),
        );

        assert_eq!(session.next_frame().unwrap(), FrameOutcome::Pointer);
        assert_eq!(
            session.next_frame().unwrap(),
            FrameOutcome::NoUpdate(NoUpdateReason::SensorsInvalid)
        );
        assert_eq!(session.frames(), 2);
        assert_eq!(session.state().raw, (10, 20));
        assert!(matches!(session.next_frame(), Err(TransportError::Io { .. })));
        assert_eq!(session.path(), Path::new("/dev/hidraw0"));
    }
}
