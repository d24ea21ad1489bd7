//! Error types for stream operations.
//!
//! Every public stream operation reports failure through [`AudioStreamError`].
//! The variants follow the error taxonomy of the audio framework's client
//! library so callers that map results onto numeric codes can do so with
//! [`AudioStreamError::code`].

use crate::state::StreamState;
use std::fmt;

/// Operation completed successfully.
pub const SUCCESS: i32 = 0;
/// Bad argument: null buffer, zero length, invalid frame threshold.
pub const ERR_INVALID_PARAM: i32 = -2;
/// Operation not permitted in the current lifecycle state.
pub const ERR_ILLEGAL_STATE: i32 = -3;
/// Backend or policy call failed.
pub const ERR_OPERATION_FAILED: i32 = -4;
/// Render/capture mode mismatch.
pub const ERR_INCORRECT_MODE: i32 = -5;
/// Feature unavailable on this backend.
pub const ERR_NOT_SUPPORTED: i32 = -6;

/// Errors returned by stream operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AudioStreamError {
    /// A caller-supplied argument was rejected.
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParam {
        /// Name of the rejected argument
        param: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The operation is not legal in the stream's current state.
    #[error("Operation '{operation}' not permitted in state {state}")]
    IllegalState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the stream was in
        state: StreamState,
    },

    /// A backend, policy or internal operation failed.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The operation does not match the configured render/capture mode.
    #[error("Operation '{operation}' not available in {mode} mode")]
    IncorrectMode {
        /// Operation that was attempted
        operation: &'static str,
        /// Mode the stream is configured for
        mode: String,
    },

    /// The requested feature is not supported.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Transport-level failure reported by a backend.
    #[error("Backend error: {backend} - {details}")]
    Backend {
        /// Backend name
        backend: &'static str,
        /// Failure reported by the backend
        details: String,
    },
}

impl AudioStreamError {
    /// Create an invalid parameter error
    pub fn invalid_param(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            param,
            reason: reason.into(),
        }
    }

    /// Create an illegal state error
    pub fn illegal_state(operation: &'static str, state: StreamState) -> Self {
        Self::IllegalState { operation, state }
    }

    /// Create an operation failed error
    pub fn operation_failed(details: impl Into<String>) -> Self {
        Self::OperationFailed(details.into())
    }

    /// Create an incorrect mode error
    pub fn incorrect_mode(operation: &'static str, mode: impl fmt::Display) -> Self {
        Self::IncorrectMode {
            operation,
            mode: mode.to_string(),
        }
    }

    /// Create a not supported error
    pub fn not_supported(details: impl Into<String>) -> Self {
        Self::NotSupported(details.into())
    }

    /// Create a backend error
    pub fn backend(backend: &'static str, details: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            details: details.into(),
        }
    }

    /// Numeric error code for this error.
    ///
    /// Backend errors are reported as [`ERR_OPERATION_FAILED`].
    pub const fn code(&self) -> i32 {
        match self {
            Self::InvalidParam { .. } => ERR_INVALID_PARAM,
            Self::IllegalState { .. } => ERR_ILLEGAL_STATE,
            Self::OperationFailed(_) | Self::Backend { .. } => ERR_OPERATION_FAILED,
            Self::IncorrectMode { .. } => ERR_INCORRECT_MODE,
            Self::NotSupported(_) => ERR_NOT_SUPPORTED,
        }
    }

    /// Check if this error was caused by the lifecycle state
    pub const fn is_state_error(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }

    /// Check if this error came from the transport or policy layer
    pub const fn is_operation_failure(&self) -> bool {
        matches!(self, Self::OperationFailed(_) | Self::Backend { .. })
    }

    /// Check if retrying after a state change can succeed.
    ///
    /// Argument and capability errors never resolve on their own.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::IllegalState { .. } | Self::IncorrectMode { .. })
    }
}

impl From<std::io::Error> for AudioStreamError {
    fn from(err: std::io::Error) -> Self {
        Self::backend("io", err.to_string())
    }
}

/// Result type for stream operations
pub type AudioStreamResult<T> = Result<T, AudioStreamError>;

/// Counters for errors observed by an I/O worker.
#[derive(Debug, Clone, Default)]
pub struct ErrorMetrics {
    /// Every recorded error
    pub total_errors: u64,
    /// Backend and operation failures
    pub backend_errors: u64,
    /// Render worker found no queued data
    pub underruns: u64,
    /// Capture slots discarded because the application fell behind
    pub overruns: u64,
    /// Events lost to a full event channel
    pub dropped_events: u64,
}

impl ErrorMetrics {
    /// Record a new error
    pub fn record_error(&mut self, error: &AudioStreamError) {
        self.total_errors += 1;
        if error.is_operation_failure() {
            self.backend_errors += 1;
        }
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AudioStreamError::invalid_param("buffer", "empty").code(),
            ERR_INVALID_PARAM
        );
        assert_eq!(
            AudioStreamError::illegal_state("write", StreamState::New).code(),
            ERR_ILLEGAL_STATE
        );
        assert_eq!(
            AudioStreamError::backend("mock", "disconnected").code(),
            ERR_OPERATION_FAILED
        );
        assert_eq!(
            AudioStreamError::incorrect_mode("write", "callback").code(),
            ERR_INCORRECT_MODE
        );
        assert_eq!(
            AudioStreamError::not_supported("aac").code(),
            ERR_NOT_SUPPORTED
        );
    }

    #[test]
    fn test_error_display() {
        let err = AudioStreamError::illegal_state("start", StreamState::Released);
        assert_eq!(
            err.to_string(),
            "Operation 'start' not permitted in state RELEASED"
        );

        let err = AudioStreamError::invalid_param("length", "must be greater than zero");
        assert!(err.to_string().contains("length"));
    }

    #[test]
    fn test_error_classification() {
        assert!(AudioStreamError::illegal_state("pause", StreamState::New).is_state_error());
        assert!(AudioStreamError::operation_failed("policy").is_operation_failure());
        assert!(AudioStreamError::backend("file", "eof").is_operation_failure());
        assert!(!AudioStreamError::invalid_param("volume", "range").is_recoverable());
    }

    #[test]
    fn test_error_metrics() {
        let mut metrics = ErrorMetrics::default();
        metrics.record_error(&AudioStreamError::backend("mock", "gone"));
        metrics.record_error(&AudioStreamError::invalid_param("x", "y"));
        assert_eq!(metrics.total_errors, 2);
        assert_eq!(metrics.backend_errors, 1);

        metrics.reset();
        assert_eq!(metrics.total_errors, 0);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.pcm");
        let err: AudioStreamError = io.into();
        assert!(err.is_operation_failure());
    }
}
