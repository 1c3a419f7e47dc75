//! Call session store
//!
//! Holds zero or one active `CallSession` and enforces the state machine.
//! Mutations run under a single mutex; every mutation republishes a snapshot
//! through `arc-swap`, so `current()` never takes the lock.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{Result, SignalError};
use crate::types::{CallId, CallSession, CallState, IncomingCall};

/// Authoritative holder of the active call session
#[derive(Debug, Default)]
pub struct CallSessionStore {
    active: Mutex<Option<CallSession>>,
    snapshot: ArcSwapOption<CallSession>,
}

impl CallSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ringing session for a new call.
    ///
    /// Fails with `DuplicateCallId` (carrying the existing session) when the
    /// same call id is already held, and with `SessionBusy` when a different
    /// call is still ringing. A resolved session for another call is evicted.
    pub fn begin(&self, call: IncomingCall) -> Result<CallSession> {
        let mut active = self.active.lock();

        if let Some(existing) = active.as_ref() {
            if existing.call_id == call.call_id && existing.state != CallState::Idle {
                return Err(SignalError::DuplicateCallId {
                    call_id: call.call_id,
                    existing: Box::new(existing.clone()),
                });
            }
            if existing.state.is_ringing() {
                return Err(SignalError::SessionBusy {
                    active: existing.call_id.clone(),
                });
            }
            debug!(
                "Evicting {} session {} for new call {}",
                existing.state, existing.call_id, call.call_id
            );
        }

        let session = CallSession::ringing(call);
        *active = Some(session.clone());
        self.publish(&active);
        Ok(session)
    }

    /// Move the active session to `target` if the state machine allows it
    pub fn transition(&self, call_id: &CallId, target: CallState) -> Result<CallSession> {
        let mut active = self.active.lock();

        let session = match active.as_mut() {
            Some(session) if &session.call_id == call_id => session,
            _ => {
                return Err(SignalError::UnknownCallId {
                    call_id: call_id.clone(),
                })
            }
        };

        if !session.state.can_transition_to(target) {
            return Err(SignalError::InvalidTransition {
                call_id: call_id.clone(),
                from: session.state,
                to: target,
            });
        }

        debug!("Call {}: {} -> {}", call_id, session.state, target);
        session.state = target;
        let updated = session.clone();
        self.publish(&active);
        Ok(updated)
    }

    /// Snapshot of the active session
    pub fn current(&self) -> Option<CallSession> {
        self.snapshot.load_full().map(|s| (*s).clone())
    }

    /// Drop the active session, returning it
    pub fn clear(&self) -> Option<CallSession> {
        let mut active = self.active.lock();
        let previous = active.take();
        self.publish(&active);
        previous
    }

    fn publish(&self, active: &Option<CallSession>) {
        self.snapshot.store(active.clone().map(Arc::new));
    }
}
