//! Outbound messages for the host bridge
//!
//! The router builds these; the bridge only delivers them. Caller identity and
//! call type are form-URL encoded here (space becomes `+`) in both the route and
//! the `callAction` event, so a bridge can hand either to the web view verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::form_urlencoded;

use crate::config::DEFAULT_CALLER_NAME;
use crate::types::{CallSession, UserAction};

/// Bridge event name for resolved calls
pub const CALL_ACTION_EVENT: &str = "callAction";

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// In-app route loaded when a call is accepted:
/// `/call/{callId}?type={callType}&caller={callerName}&recipient={callerId}`
pub fn accepted_call_route(session: &CallSession) -> String {
    format!(
        "/call/{}?type={}&caller={}&recipient={}",
        encode(session.call_id.as_str()),
        encode(session.call_type.as_str()),
        encode(&session.caller_name),
        encode(&session.caller_id),
    )
}

/// Payload of the `callAction` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallActionEvent {
    pub action: String,
    pub caller_id: String,
    pub caller_name: String,
    pub call_type: String,
    pub call_id: String,
}

impl CallActionEvent {
    /// Event for a resolved session. Defaults are applied before encoding, so
    /// every identity field is navigation-safe.
    pub fn from_session(session: &CallSession, action: UserAction) -> Self {
        let raw = Self {
            action: action.event_name().to_string(),
            caller_id: session.caller_id.clone(),
            caller_name: session.caller_name.clone(),
            call_type: session.call_type.as_str().to_string(),
            call_id: session.call_id.to_string(),
        }
        .with_defaults();

        Self {
            caller_id: encode(&raw.caller_id),
            caller_name: encode(&raw.caller_name),
            call_type: encode(&raw.call_type),
            ..raw
        }
    }

    /// Fill empty fields: name becomes "Unknown", type becomes "audio"
    pub fn with_defaults(mut self) -> Self {
        if self.caller_name.is_empty() {
            self.caller_name = DEFAULT_CALLER_NAME.to_string();
        }
        if self.call_type.is_empty() {
            self.call_type = "audio".to_string();
        }
        self
    }

    /// Flat string map handed to `HostBridge::emit`
    pub fn to_payload(&self) -> BTreeMap<String, String> {
        let mut payload = BTreeMap::new();
        payload.insert("action".to_string(), self.action.clone());
        payload.insert("callerId".to_string(), self.caller_id.clone());
        payload.insert("callerName".to_string(), self.caller_name.clone());
        payload.insert("callType".to_string(), self.call_type.clone());
        payload.insert("callId".to_string(), self.call_id.clone());
        payload
    }
}
