//! Inbound call payload decoding
//!
//! Push messages and their local rebroadcasts share one flat shape with fixed
//! field names:
//!
//! ```json
//! { "type": "call", "callerId": "u1", "callerName": "Alice", "callId": "c1" }
//! ```
//!
//! `callerId` is mandatory. `callId` is synthesized from the clock when absent,
//! `callerName` falls back to the configured placeholder. The free-form `type`
//! tag is turned into a `CallType` here and nowhere else.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::collaborators::Clock;
use crate::config::SignalConfig;
use crate::errors::{Result, SignalError};
use crate::types::{CallId, CallType, IncomingCall, SignalSource};

/// Raw payload as delivered by push or local broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundCallPayload {
    /// `"call"` or `"video_call"`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Older payloads carry the media kind here (`"audio"`/`"video"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
}

impl InboundCallPayload {
    /// Payload for a call with the given caller and kind
    pub fn new(caller_id: impl Into<String>, call_type: CallType) -> Self {
        let kind = match call_type {
            CallType::Audio => "call",
            CallType::Video => CallType::VIDEO_TAG,
        };
        Self {
            kind: Some(kind.to_string()),
            caller_id: Some(caller_id.into()),
            ..Default::default()
        }
    }

    pub fn with_caller_name(mut self, name: impl Into<String>) -> Self {
        self.caller_name = Some(name.into());
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Decode a JSON document
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source)
            .map_err(|e| SignalError::invalid_payload(format!("Malformed payload: {}", e)))
    }

    /// Decode the flat string map a push data message arrives as
    pub fn from_data_map(data: &HashMap<String, String>) -> Self {
        let field = |key: &str| data.get(key).cloned();
        Self {
            kind: field("type"),
            caller_id: field("callerId"),
            caller_name: field("callerName"),
            call_id: field("callId"),
            call_type: field("callType"),
        }
    }

    /// Media kind, from the `type` tag or the legacy `callType` field
    pub fn resolved_call_type(&self) -> CallType {
        let legacy_video = self
            .call_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case("video"))
            .unwrap_or(false);
        if legacy_video {
            CallType::Video
        } else {
            CallType::from_tag(self.kind.as_deref())
        }
    }

    /// Validate and normalize into a signal the store can begin
    pub fn into_incoming(
        self,
        config: &SignalConfig,
        clock: &dyn Clock,
        source: SignalSource,
    ) -> Result<IncomingCall> {
        let call_type = self.resolved_call_type();

        let caller_id = non_blank(self.caller_id)
            .ok_or_else(|| SignalError::invalid_payload("callerId is required"))?;

        let received_at = clock.now();
        let call_id = non_blank(self.call_id)
            .map(CallId::from)
            .unwrap_or_else(|| CallId::from_timestamp(received_at));
        let caller_name =
            non_blank(self.caller_name).unwrap_or_else(|| config.default_caller_name.clone());

        Ok(IncomingCall {
            call_id,
            caller_id,
            caller_name,
            call_type,
            source,
            received_at,
        })
    }
}

/// Whitespace-only counts as absent; anything else is kept byte for byte
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
