//! Core types for pushcall-core
//!
//! Identifiers, the call state machine states, and the `CallSession` entity that
//! the store holds. Everything here is plain data; transition rules live on
//! `CallState` so the store and the router agree on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one call attempt
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Synthesize an id from a timestamp (milliseconds since the Unix epoch)
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Media kind of the incoming call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Audio,
    Video,
}

impl CallType {
    /// Payload tag used by push messages for video calls
    pub const VIDEO_TAG: &'static str = "video_call";

    /// Classify a payload by its `type` tag. Only `video_call` is video.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(Self::VIDEO_TAG) => CallType::Video,
            _ => CallType::Audio,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Audio => "audio",
            CallType::Video => "video",
        }
    }
}

impl Default for CallType {
    fn default() -> Self {
        CallType::Audio
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a call session
///
/// ```text
/// Idle ──► Ringing ──┬──► Accepted ──┐
///                    ├──► Declined ──┼──► Ended
///                    ├──► TimedOut ──┘
///                    └───────────────────► Ended (superseded / ended early)
/// ```
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Ringing,
    Accepted,
    Declined,
    TimedOut,
    Ended,
}

impl CallState {
    /// Whether `target` is reachable from `self` without moving backward.
    ///
    /// The three resolution states share a rank, so a resolved call can only
    /// move on to `Ended`.
    pub fn can_transition_to(self, target: CallState) -> bool {
        use CallState::*;
        match (self, target) {
            (Idle, Ringing) | (Idle, Ended) => true,
            (Ringing, Accepted) | (Ringing, Declined) | (Ringing, TimedOut) | (Ringing, Ended) => true,
            (Accepted, Ended) | (Declined, Ended) | (TimedOut, Ended) => true,
            _ => false,
        }
    }

    /// Accepted, declined or timed out
    pub fn is_resolved(self) -> bool {
        matches!(self, CallState::Accepted | CallState::Declined | CallState::TimedOut)
    }

    pub fn is_ringing(self) -> bool {
        self == CallState::Ringing
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Accepted => "accepted",
            CallState::Declined => "declined",
            CallState::TimedOut => "timed_out",
            CallState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// How a session came into existence (diagnostics only)
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Delivered by the push channel
    Push,
    /// Locally rebroadcast copy of a push payload, or a call started by the host
    LocalBroadcast,
    /// Created in response to a user action
    UserAction,
}

/// User decision taken on a ringing call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAction {
    Accept,
    #[serde(alias = "reject")]
    Decline,
}

impl UserAction {
    pub fn target_state(self) -> CallState {
        match self {
            UserAction::Accept => CallState::Accepted,
            UserAction::Decline => CallState::Declined,
        }
    }

    /// Action name carried by the `callAction` bridge event
    pub fn event_name(self) -> &'static str {
        match self {
            UserAction::Accept => "accept",
            UserAction::Decline => "reject",
        }
    }
}

/// A validated inbound call signal, ready for `CallSessionStore::begin`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    pub call_id: CallId,
    pub caller_id: String,
    pub caller_name: String,
    pub call_type: CallType,
    pub source: SignalSource,
    pub received_at: DateTime<Utc>,
}

/// The single mutable entity of the signaling core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub call_id: CallId,
    pub caller_id: String,
    pub caller_name: String,
    pub call_type: CallType,
    pub state: CallState,
    pub created_at: DateTime<Utc>,
    pub source: SignalSource,
}

impl CallSession {
    /// Start a ringing session from a validated signal
    pub fn ringing(call: IncomingCall) -> Self {
        Self {
            call_id: call.call_id,
            caller_id: call.caller_id,
            caller_name: call.caller_name,
            call_type: call.call_type,
            state: CallState::Ringing,
            created_at: call.received_at,
            source: call.source,
        }
    }
}
