//! # pushcall-core
//!
//! Call-session signaling for push-delivered incoming calls.
//!
//! An incoming call can reach the device several ways: a push message, a local
//! rebroadcast of that push, or a call the host app starts itself. The user can
//! accept or decline it, the ring window can run out, or the host can hang up.
//! This crate reconciles all of those signals into one consistent session
//! stream:
//!
//! - [`CallSessionStore`] holds at most one active [`CallSession`] and enforces
//!   the Idle → Ringing → Accepted | Declined | TimedOut → Ended state machine.
//! - [`SignalRouter`] is the single entry point; it supersedes stale calls,
//!   absorbs duplicate deliveries and drives the collaborators.
//! - [`TimeoutScheduler`] keeps one cancellable ring timeout per call.
//! - [`NotificationPresenter`], [`HostBridge`] and [`Clock`] are the seams to
//!   the platform UI, the embedded web view and wall-clock time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pushcall_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SignalError> {
//!     let (presenter, _ui) = ChannelPresenter::new();
//!     let (bridge, _web) = ChannelBridge::new();
//!     let router = SignalRouter::builder(Arc::new(presenter), Arc::new(bridge))
//!         .with_config(SignalConfig::default())
//!         .build()?;
//!
//!     let payload = InboundCallPayload::from_json(
//!         r#"{"type":"call","callerId":"u1","callerName":"Alice","callId":"c1"}"#,
//!     )?;
//!     router.handle_inbound_call(payload, SignalSource::Push)?;
//!     router.handle_user_action(&CallId::from("c1"), UserAction::Accept);
//!     Ok(())
//! }
//! ```

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod outbound;
pub mod payload;
mod recent;
pub mod router;
pub mod store;
pub mod timeout;
pub mod types;

pub use collaborators::{
    BridgeMessage, ChannelBridge, ChannelPresenter, Clock, FixedClock, HostBridge,
    NotificationContent, NotificationPresenter, PresenterCommand, Surface, SystemClock,
};
pub use config::{FullScreenPolicy, SignalConfig, DEFAULT_CALLER_NAME, DEFAULT_RING_TIMEOUT_SECS};
pub use errors::{Result, SignalError};
pub use outbound::{accepted_call_route, CallActionEvent, CALL_ACTION_EVENT};
pub use payload::InboundCallPayload;
pub use router::{RouterOutcome, SignalRouter, SignalRouterBuilder};
pub use store::CallSessionStore;
pub use timeout::{ManualTimerDriver, TimeoutScheduler, TimerDriver, TimerHandle, TokioTimerDriver};
pub use types::{CallId, CallSession, CallState, CallType, IncomingCall, SignalSource, UserAction};

/// Commonly used types
pub mod prelude {
    pub use crate::collaborators::{
        ChannelBridge, ChannelPresenter, Clock, HostBridge, NotificationPresenter, Surface,
    };
    pub use crate::config::{FullScreenPolicy, SignalConfig};
    pub use crate::errors::SignalError;
    pub use crate::payload::InboundCallPayload;
    pub use crate::router::{RouterOutcome, SignalRouter};
    pub use crate::types::{CallId, CallSession, CallState, CallType, SignalSource, UserAction};
}
