//! Stream lifecycle state machine.
//!
//! ```text
//! NEW -> PREPARED -> RUNNING <-> PAUSED
//!                    RUNNING/PAUSED -> STOPPED -> RUNNING
//!        any non-terminal state -> RELEASED
//! ```
//!
//! [`StreamState::transition`] is the only place legality is decided; the
//! stream core consults it before performing any side effect.

use std::fmt;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum StreamState {
    /// Created, not yet configured
    #[default]
    New,
    /// Parameters set, worker not started
    Prepared,
    /// Worker moving data
    Running,
    /// Worker parked, queued data retained
    Paused,
    /// Worker joined and backend stopped
    Stopped,
    /// Terminal
    Released,
}

/// Control operations gated by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOperation {
    /// Configure stream parameters
    SetParams,
    /// Start or resume the I/O worker
    Start,
    /// Park the I/O worker
    Pause,
    /// Stop the I/O worker and backend
    Stop,
    /// Discard queued data
    Flush,
    /// Wait for queued data to reach the backend
    Drain,
    /// Tear the stream down
    Release,
}

impl StreamOperation {
    /// Operation name used in errors and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SetParams => "set_params",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Flush => "flush",
            Self::Drain => "drain",
            Self::Release => "release",
        }
    }
}

impl StreamState {
    /// State reached by applying `op`, or `None` if `op` is illegal here.
    ///
    /// Flush and Drain leave the state unchanged when legal.
    pub const fn transition(self, op: StreamOperation) -> Option<StreamState> {
        use StreamOperation as Op;
        use StreamState::*;

        match (self, op) {
            (New, Op::SetParams) => Some(Prepared),
            (Prepared | Paused | Stopped, Op::Start) => Some(Running),
            (Running, Op::Pause) => Some(Paused),
            (Running | Paused, Op::Stop) => Some(Stopped),
            (Running | Paused | Stopped, Op::Flush) => Some(self),
            (Running, Op::Drain) => Some(Running),
            (Released, Op::Release) => None,
            (_, Op::Release) => Some(Released),
            _ => None,
        }
    }

    /// Check if configuration has been captured and not yet released
    pub const fn is_configured(self) -> bool {
        !matches!(self, Self::New | Self::Released)
    }

    /// Check if the stream is moving data
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the stream can be started or resumed
    pub const fn can_start(self) -> bool {
        self.transition(StreamOperation::Start).is_some()
    }

    /// Check if the stream can be paused
    pub const fn can_pause(self) -> bool {
        self.transition(StreamOperation::Pause).is_some()
    }

    /// Check if the stream has been released
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Released)
    }

    /// Timestamps are reported from the first start until release.
    pub const fn reports_time(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Stopped)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::Prepared => "PREPARED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Released => "RELEASED",
        };
        f.write_str(name)
    }
}

/// Receives lifecycle notifications.
///
/// Invoked on the thread that completed the transition, after all stream
/// locks are released. Must not call `stop` or `release` when invoked from
/// the I/O worker.
pub trait StreamStateCallback: Send + Sync {
    /// Called after every successful transition.
    fn on_state_change(&self, state: StreamState);
}

#[cfg(test)]
mod tests {
    use super::*;
    use StreamOperation as Op;

    const ALL_STATES: [StreamState; 6] = [
        StreamState::New,
        StreamState::Prepared,
        StreamState::Running,
        StreamState::Paused,
        StreamState::Stopped,
        StreamState::Released,
    ];

    #[test]
    fn test_start_legality() {
        let legal: Vec<_> = ALL_STATES
            .iter()
            .filter(|s| s.can_start())
            .copied()
            .collect();
        assert_eq!(
            legal,
            vec![StreamState::Prepared, StreamState::Paused, StreamState::Stopped]
        );
    }

    #[test]
    fn test_set_params_only_from_new() {
        for state in ALL_STATES {
            let next = state.transition(Op::SetParams);
            if state == StreamState::New {
                assert_eq!(next, Some(StreamState::Prepared));
            } else {
                assert_eq!(next, None);
            }
        }
    }

    #[test]
    fn test_pause_stop() {
        assert!(StreamState::Running.can_pause());
        assert!(!StreamState::Paused.can_pause());
        assert_eq!(
            StreamState::Paused.transition(Op::Stop),
            Some(StreamState::Stopped)
        );
        assert_eq!(StreamState::Prepared.transition(Op::Stop), None);
        assert_eq!(StreamState::Stopped.transition(Op::Stop), None);
    }

    #[test]
    fn test_flush_and_drain_keep_state() {
        for state in [StreamState::Running, StreamState::Paused, StreamState::Stopped] {
            assert_eq!(state.transition(Op::Flush), Some(state));
        }
        assert_eq!(StreamState::New.transition(Op::Flush), None);
        assert_eq!(StreamState::Prepared.transition(Op::Flush), None);
        assert_eq!(
            StreamState::Running.transition(Op::Drain),
            Some(StreamState::Running)
        );
        assert_eq!(StreamState::Paused.transition(Op::Drain), None);
    }

    #[test]
    fn test_release_terminal() {
        for state in ALL_STATES {
            let next = state.transition(Op::Release);
            if state.is_terminal() {
                assert_eq!(next, None);
            } else {
                assert_eq!(next, Some(StreamState::Released));
            }
        }
        let ops = [
            Op::SetParams,
            Op::Start,
            Op::Pause,
            Op::Stop,
            Op::Flush,
            Op::Drain,
            Op::Release,
        ];
        for op in ops {
            assert_eq!(StreamState::Released.transition(op), None);
        }
    }

    #[test]
    fn test_configured_and_display() {
        assert!(!StreamState::New.is_configured());
        assert!(StreamState::Stopped.is_configured());
        assert!(!StreamState::Released.is_configured());
        assert_eq!(StreamState::Paused.to_string(), "PAUSED");
        assert_eq!(Op::SetParams.name(), "set_params");
    }
}
