use super::{OutputSink, SinkError};
use crate::session::SessionState;
use tracing::info;

/// Logs state changes instead of injecting them. Used by `--dry-run`.
#[derive(Debug, Default)]
pub struct LogSink {
    last: Option<SessionState>,
    changes: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct states logged so far.
    pub fn changes(&self) -> u64 {
        self.changes
    }
}

impl OutputSink for LogSink {
    fn emit(&mut self, state: &SessionState) -> Result<(), SinkError> {
        if self.last.as_ref() == Some(state) {
            return Ok(());
        }
        self.last = Some(*state);
        self.changes += 1;

        let b = state.buttons;
        match state.point {
            Some(p) => info!(
                "pen {} at ({:.1}, {:.1}) raw ({}, {}) tip={} small={} large={} keys={}",
                state.tool, p.x, p.y, state.raw.0, state.raw.1, b.tip, b.small, b.large, state.keys
            ),
            None => info!(
                "no position yet, tip={} small={} large={} keys={}",
                b.tip, b.small, b.large, state.keys
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibratedPoint;
    use crate::protocol::{KeySet, PanelKey};

    #[test]
    fn repeated_states_are_logged_once() {
        let mut sink = LogSink::new();
        let a = SessionState::default();
        let b = SessionState {
            point: Some(CalibratedPoint { x: 1.0, y: 2.0 }),
            ..a
        };
        let c = SessionState {
            keys: [PanelKey::Email].into_iter().collect::<KeySet>(),
            ..b
        };

        for state in [a, a, b, b, b, c, b] {
            sink.emit(&state).unwrap();
        }
        assert_eq!(sink.changes(), 4);
    }
}
