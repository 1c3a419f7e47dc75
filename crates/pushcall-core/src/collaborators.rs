//! Interfaces to the world outside the signaling core
//!
//! The router never performs I/O itself. It hands presentation instructions to a
//! `NotificationPresenter`, structured events and navigation requests to a
//! `HostBridge`, and reads time from a `Clock`. All calls are fire-and-forget:
//! implementations must return promptly and must not call back into the router
//! from inside the call. The channel-backed implementations below satisfy both
//! by queueing onto unbounded tokio channels.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{CallId, CallSession, CallType};

/// Which UI surface the presenter should raise for a ringing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Heads-up notification with accept/decline actions
    Notification,
    /// The notification plus a full-screen call screen (lock-screen capable)
    FullScreen,
}

/// Renders and removes the incoming-call UI
pub trait NotificationPresenter: Send + Sync {
    fn show(&self, session: &CallSession, surface: Surface);

    /// Remove the UI for `call_id`. Must be idempotent.
    fn cancel(&self, call_id: &CallId);
}

/// Channel into the embedded web UI
pub trait HostBridge: Send + Sync {
    fn emit(&self, event_name: &str, payload: &BTreeMap<String, String>);

    /// Load an in-app route
    fn navigate(&self, route: &str);
}

/// Wall-clock source for session timestamps and synthesized call ids
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// `Clock` backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic hosts and tests
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: std::time::Duration) {
        let step = ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
        let mut now = self.now.lock();
        *now = *now + step;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Text for the incoming-call notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

impl NotificationContent {
    pub fn for_session(session: &CallSession) -> Self {
        let title = match session.call_type {
            CallType::Video => "Video Call",
            CallType::Audio => "Audio Call",
        };
        let from = if session.caller_name.is_empty() {
            session.caller_id.as_str()
        } else {
            session.caller_name.as_str()
        };
        Self {
            title: title.to_string(),
            body: format!("from {}", from),
        }
    }
}

/// Instruction queued by `ChannelPresenter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCommand {
    Show { session: CallSession, surface: Surface },
    Cancel { call_id: CallId },
}

/// Presenter that forwards instructions to a UI task over a channel
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<PresenterCommand>,
}

impl ChannelPresenter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PresenterCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, command: PresenterCommand) {
        if self.tx.send(command).is_err() {
            debug!("Presenter receiver dropped; discarding instruction");
        }
    }
}

impl NotificationPresenter for ChannelPresenter {
    fn show(&self, session: &CallSession, surface: Surface) {
        self.send(PresenterCommand::Show {
            session: session.clone(),
            surface,
        });
    }

    fn cancel(&self, call_id: &CallId) {
        self.send(PresenterCommand::Cancel {
            call_id: call_id.clone(),
        });
    }
}

/// Message queued by `ChannelBridge`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    Event {
        name: String,
        payload: BTreeMap<String, String>,
    },
    Navigate {
        route: String,
    },
}

/// Bridge that forwards events to the host UI task over a channel
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<BridgeMessage>,
}

impl ChannelBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, message: BridgeMessage) {
        if self.tx.send(message).is_err() {
            debug!("Bridge receiver dropped; discarding message");
        }
    }
}

impl HostBridge for ChannelBridge {
    fn emit(&self, event_name: &str, payload: &BTreeMap<String, String>) {
        self.send(BridgeMessage::Event {
            name: event_name.to_string(),
            payload: payload.clone(),
        });
    }

    fn navigate(&self, route: &str) {
        self.send(BridgeMessage::Navigate {
            route: route.to_string(),
        });
    }
}
