//! Temporal filters applied to decoded frames.

use crate::calibration::CalibratedPoint;
use crate::protocol::ButtonState;
use std::collections::VecDeque;

/// Frames kept for the button vote.
pub const VOTE_WINDOW: usize = 3;

/// Majority vote over the last [`VOTE_WINDOW`] raw button samples.
///
/// A channel is reported pressed only when strictly more than half of the
/// samples held agree. Ties and a partially filled window resolve to
/// released.
#[derive(Debug, Clone)]
pub struct ButtonVoter {
    history: VecDeque<ButtonState>,
    window: usize,
}

impl Default for ButtonVoter {
    fn default() -> Self {
        Self::new(VOTE_WINDOW)
    }
}

impl ButtonVoter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            history: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn vote(&mut self, sample: ButtonState) -> ButtonState {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        let len = self.history.len();
        let mut counts = [0usize; 3];
        for state in &self.history {
            for (count, pressed) in counts.iter_mut().zip(state.channels()) {
                if pressed {
                    *count += 1;
                }
            }
        }
        // count > len / 2, kept in integers
        ButtonState::from_channels(counts.map(|count| 2 * count > len))
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Halves the distance to every new point. Seeded by the first point.
#[derive(Debug, Clone, Default)]
pub struct PointSmoother {
    current: Option<CalibratedPoint>,
}

impl PointSmoother {
    pub fn smooth(&mut self, point: CalibratedPoint) -> CalibratedPoint {
        let next = match self.current {
            None => point,
            Some(cur) => CalibratedPoint {
                x: (cur.x + point.x) / 2.0,
                y: (cur.y + point.y) / 2.0,
            },
        };
        self.current = Some(next);
        next
    }
}
