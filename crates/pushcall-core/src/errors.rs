//! Error types for the signaling core
//!
//! Only `InvalidPayload` is ever handed back to a caller as an `Err`. The router
//! absorbs the rest: `SessionBusy` by superseding, `DuplicateCallId` as an
//! idempotent success, and the lookup errors as `RouterOutcome::Ignored`.

use thiserror::Error;

use crate::types::{CallId, CallSession, CallState};

/// Result type for signaling operations
pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors raised by the store, the router and the timeout scheduler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// Inbound payload is missing a mandatory field or is malformed
    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// Another call is still ringing
    #[error("Session busy: call {active} is still ringing")]
    SessionBusy { active: CallId },

    /// The call already has a session; carries it so retries can return it
    #[error("Duplicate call id: {call_id}")]
    DuplicateCallId {
        call_id: CallId,
        existing: Box<CallSession>,
    },

    /// The call id does not match the active session
    #[error("Unknown call id: {call_id}")]
    UnknownCallId { call_id: CallId },

    /// There is no active session at all
    #[error("No active call session")]
    NoActiveSession,

    /// Transition would move the call backward or sideways
    #[error("Invalid transition for call {call_id}: {from} -> {to}")]
    InvalidTransition {
        call_id: CallId,
        from: CallState,
        to: CallState,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timer facility unavailable
    #[error("Timer error: {message}")]
    Timer { message: String },
}

impl SignalError {
    /// Create an invalid payload error
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timer error
    pub fn timer(message: impl Into<String>) -> Self {
        Self::Timer {
            message: message.into(),
        }
    }

    /// Stale or duplicate traffic that the router answers with a no-op
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            SignalError::DuplicateCallId { .. }
                | SignalError::UnknownCallId { .. }
                | SignalError::NoActiveSession
                | SignalError::InvalidTransition { .. }
        )
    }
}
