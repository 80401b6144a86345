//! Error types and handling for the call coordination layer
//!
//! Device and transport failures are caught at the coordinator boundary and
//! translated into this taxonomy together with a defined recovery transition;
//! raw platform errors never escape. `InvalidState`, `InvalidTarget` and
//! `SessionBusy` signal a caller contract violation and never alter session
//! state.

use thiserror::Error;

use crate::session::CallState;

/// Result type alias for call-core operations
pub type CallResult<T> = Result<T, CallError>;

/// Classification of a camera/microphone capability failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceErrorKind {
    /// Device is held by another application
    InUse,
    /// The user or platform denied capture permission
    PermissionDenied,
    /// No capture device present
    NotFound,
    /// Anything the probe could not classify
    Other,
}

/// Error types for call session operations
#[derive(Error, Debug, Clone)]
pub enum CallError {
    /// Camera/microphone capability probe failed
    #[error("device check failed ({kind:?}): {reason}")]
    Device {
        kind: DeviceErrorKind,
        reason: String,
    },

    /// Action attempted from a state that does not permit it
    #[error("cannot {action} while call state is {state}")]
    InvalidState {
        action: &'static str,
        state: CallState,
    },

    /// Caller and callee identities are identical
    #[error("cannot start a call with yourself")]
    InvalidTarget,

    /// A call attempt is already engaged for this participant
    #[error("another call is in progress (state {state})")]
    SessionBusy { state: CallState },

    /// An underlying platform join/ring/leave/reject call failed
    #[error("transport failure during {operation}: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
    },

    /// No platform connection (before login or after logout)
    #[error("not connected to the realtime platform")]
    NotConnected,

    /// Coordinator was assembled with missing or inconsistent settings
    #[error("invalid configuration: {field} - {reason}")]
    Configuration {
        field: &'static str,
        reason: String,
    },

    /// Invariant violation inside the coordinator
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CallError {
    /// Wrap a platform failure with the operation it interrupted
    pub fn transport(operation: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation,
            reason: source.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check whether retrying the same action can reasonably succeed
    ///
    /// Transport failures are often transient; `start()` in particular leaves
    /// the session in `Ready` so a retry is cheap. Contract violations are
    /// caller bugs and never recoverable by retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CallError::Transport { .. } => true,
            CallError::Device { kind, .. } => matches!(kind, DeviceErrorKind::InUse),
            CallError::InvalidState { .. }
            | CallError::InvalidTarget
            | CallError::SessionBusy { .. }
            | CallError::NotConnected
            | CallError::Configuration { .. }
            | CallError::Internal { .. } => false,
        }
    }

    /// Check whether this error signals a caller contract violation
    ///
    /// Contract violations leave the session state untouched.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CallError::InvalidState { .. } | CallError::InvalidTarget | CallError::SessionBusy { .. }
        )
    }

    /// Get error category for logging/metrics grouping
    pub fn category(&self) -> &'static str {
        match self {
            CallError::Device { .. } => "device",
            CallError::InvalidState { .. }
            | CallError::InvalidTarget
            | CallError::SessionBusy { .. } => "contract",
            CallError::Transport { .. } => "transport",
            CallError::NotConnected => "connection",
            CallError::Configuration { .. } => "configuration",
            CallError::Internal { .. } => "internal",
        }
    }
}

impl From<crate::media::DeviceError> for CallError {
    fn from(e: crate::media::DeviceError) -> Self {
        Self::Device {
            kind: e.kind,
            reason: e.reason,
        }
    }
}
