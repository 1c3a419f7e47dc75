//! Signal router
//!
//! The single entry point for everything that can happen to an incoming call:
//! push deliveries and their local rebroadcasts, calls started by the host, the
//! user's accept/decline, ring timeouts, explicit hang-up and app foreground
//! changes. Each entry point takes the router-wide signal lock, so the store
//! always sees one composite operation at a time (check, supersede, begin, arm).
//!
//! ```text
//!  push / broadcast ─┐
//!  user action ──────┤            ┌─► NotificationPresenter (show / cancel)
//!  ring timeout ─────┼─► Router ──┼─► HostBridge (callAction / navigate)
//!  end call ─────────┤     │      └─► TimeoutScheduler (arm / disarm)
//!  foreground ───────┘     ▼
//!                   CallSessionStore
//! ```
//!
//! Races resolve by lock order: whichever of "user accepts" and "timer fires"
//! gets the lock first wins, and the loser's call-id/state guard turns it into
//! a no-op.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use crate::collaborators::{Clock, HostBridge, NotificationPresenter, Surface, SystemClock};
use crate::config::SignalConfig;
use crate::errors::{Result, SignalError};
use crate::outbound::{accepted_call_route, CallActionEvent, CALL_ACTION_EVENT};
use crate::payload::InboundCallPayload;
use crate::recent::RecentCalls;
use crate::store::CallSessionStore;
use crate::timeout::{TimeoutScheduler, TimerDriver, TokioTimerDriver};
use crate::types::{CallId, CallSession, CallState, CallType, IncomingCall, SignalSource, UserAction};

/// What a router entry point did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterOutcome {
    /// A new session is ringing; `superseded` is the stale call it replaced
    Ringing {
        session: CallSession,
        surface: Surface,
        superseded: Option<CallSession>,
    },
    /// Repeated delivery of a call that is already known
    Duplicate {
        call_id: CallId,
        session: Option<CallSession>,
    },
    /// The call was accepted, declined or timed out
    Resolved {
        session: CallSession,
        route: Option<String>,
    },
    /// The call was ended and cleared
    Ended { session: CallSession },
    /// Stale or out-of-order signal; nothing changed
    Ignored { reason: SignalError },
}

impl RouterOutcome {
    pub fn session(&self) -> Option<&CallSession> {
        match self {
            RouterOutcome::Ringing { session, .. }
            | RouterOutcome::Resolved { session, .. }
            | RouterOutcome::Ended { session } => Some(session),
            RouterOutcome::Duplicate { session, .. } => session.as_ref(),
            RouterOutcome::Ignored { .. } => None,
        }
    }

    /// True when the signal left all state untouched
    pub fn is_noop(&self) -> bool {
        matches!(self, RouterOutcome::Duplicate { .. } | RouterOutcome::Ignored { .. })
    }
}

impl fmt::Display for RouterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterOutcome::Ringing { session, surface, superseded } => {
                write!(f, "ringing {} ({}, {:?})", session.call_id, session.call_type, surface)?;
                if let Some(old) = superseded {
                    write!(f, ", superseded {}", old.call_id)?;
                }
                Ok(())
            }
            RouterOutcome::Duplicate { call_id, .. } => write!(f, "duplicate {}", call_id),
            RouterOutcome::Resolved { session, route } => {
                write!(f, "{} {}", session.state, session.call_id)?;
                if let Some(route) = route {
                    write!(f, " -> {}", route)?;
                }
                Ok(())
            }
            RouterOutcome::Ended { session } => write!(f, "ended {}", session.call_id),
            RouterOutcome::Ignored { reason } => write!(f, "ignored: {}", reason),
        }
    }
}

struct RouterState {
    recent: RecentCalls,
}

/// Builder for `SignalRouter`
pub struct SignalRouterBuilder {
    config: SignalConfig,
    presenter: Arc<dyn NotificationPresenter>,
    bridge: Arc<dyn HostBridge>,
    store: Option<Arc<CallSessionStore>>,
    clock: Option<Arc<dyn Clock>>,
    timer_driver: Option<Arc<dyn TimerDriver>>,
}

impl SignalRouterBuilder {
    pub fn new(presenter: Arc<dyn NotificationPresenter>, bridge: Arc<dyn HostBridge>) -> Self {
        Self {
            config: SignalConfig::default(),
            presenter,
            bridge,
            store: None,
            clock: None,
            timer_driver: None,
        }
    }

    pub fn with_config(mut self, config: SignalConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing store instead of creating a fresh one
    pub fn with_store(mut self, store: Arc<CallSessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Timer facility for ring timeouts; defaults to the current tokio runtime
    pub fn with_timer_driver(mut self, driver: Arc<dyn TimerDriver>) -> Self {
        self.timer_driver = Some(driver);
        self
    }

    pub fn build(self) -> Result<Arc<SignalRouter>> {
        self.config.validate()?;

        let driver: Arc<dyn TimerDriver> = match self.timer_driver {
            Some(driver) => driver,
            None => Arc::new(TokioTimerDriver::current()?),
        };
        let store = self.store.unwrap_or_else(|| Arc::new(CallSessionStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let recent = RecentCalls::new(self.config.dedup_capacity);

        Ok(Arc::new_cyclic(|self_ref| SignalRouter {
            config: self.config,
            store,
            timeouts: TimeoutScheduler::new(driver),
            presenter: self.presenter,
            bridge: self.bridge,
            clock,
            signals: Mutex::new(RouterState { recent }),
            foreground: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }
}

/// Reconciles all inbound call signals into one session stream
pub struct SignalRouter {
    config: SignalConfig,
    store: Arc<CallSessionStore>,
    timeouts: TimeoutScheduler,
    presenter: Arc<dyn NotificationPresenter>,
    bridge: Arc<dyn HostBridge>,
    clock: Arc<dyn Clock>,
    signals: Mutex<RouterState>,
    foreground: AtomicBool,
    self_ref: Weak<SignalRouter>,
}

impl SignalRouter {
    pub fn builder(
        presenter: Arc<dyn NotificationPresenter>,
        bridge: Arc<dyn HostBridge>,
    ) -> SignalRouterBuilder {
        SignalRouterBuilder::new(presenter, bridge)
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Lock-free snapshot of the active session
    pub fn current(&self) -> Option<CallSession> {
        self.store.current()
    }

    pub fn has_pending_timeout(&self, call_id: &CallId) -> bool {
        self.timeouts.is_armed(call_id)
    }

    /// Number of ring timeouts currently pending
    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.armed_count()
    }

    /// Record whether the host app is in the foreground
    pub fn set_foreground(&self, foreground: bool) {
        let _signals = self.signals.lock();
        let previous = self.foreground.swap(foreground, Ordering::SeqCst);
        if previous != foreground {
            debug!("Host app foreground: {}", foreground);
        }
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    /// Handle an incoming call delivered by push or local broadcast.
    ///
    /// Only a payload without a caller id is an error. A repeat of a known call
    /// is absorbed as `Duplicate`; a different call ringing is superseded.
    pub fn handle_inbound_call(
        &self,
        payload: InboundCallPayload,
        source: SignalSource,
    ) -> Result<RouterOutcome> {
        let call = payload.into_incoming(&self.config, self.clock.as_ref(), source)?;
        let mut state = self.signals.lock();

        if state.recent.contains(&call.call_id) {
            debug!("Absorbing late delivery for finished call {}", call.call_id);
            let session = self.store.current().filter(|s| s.call_id == call.call_id);
            return Ok(RouterOutcome::Duplicate {
                call_id: call.call_id,
                session,
            });
        }

        let mut superseded = None;
        let session = match self.store.begin(call.clone()) {
            Ok(session) => session,
            Err(SignalError::DuplicateCallId { call_id, existing }) => {
                debug!("Absorbing duplicate delivery for call {}", call_id);
                return Ok(RouterOutcome::Duplicate {
                    call_id,
                    session: Some(*existing),
                });
            }
            Err(SignalError::SessionBusy { active }) => {
                warn!("Call {} supersedes still-ringing call {}", call.call_id, active);
                match self.supersede(&mut state, &active, call) {
                    Ok((session, old)) => {
                        superseded = Some(old);
                        session
                    }
                    Err(reason) => {
                        warn!("Could not supersede call {}: {}", active, reason);
                        return Ok(RouterOutcome::Ignored { reason });
                    }
                }
            }
            Err(reason) => return Ok(RouterOutcome::Ignored { reason }),
        };

        let surface = self.surface();
        info!(
            "Call {} from {} ringing ({}, {:?}, via {:?})",
            session.call_id, session.caller_id, session.call_type, surface, session.source
        );
        self.presenter.show(&session, surface);
        self.arm_timeout(&session.call_id);

        Ok(RouterOutcome::Ringing {
            session,
            surface,
            superseded,
        })
    }

    /// Start ringing for a call initiated by the host app itself
    pub fn start_local_call(
        &self,
        caller_id: impl Into<String>,
        caller_name: Option<String>,
        call_type: CallType,
    ) -> Result<RouterOutcome> {
        let mut payload = InboundCallPayload::new(caller_id, call_type);
        payload.caller_name = caller_name;
        self.handle_inbound_call(payload, SignalSource::LocalBroadcast)
    }

    /// Apply the user's accept/decline to the active call.
    ///
    /// Actions for any call other than the active one are stale and ignored.
    pub fn handle_user_action(&self, call_id: &CallId, action: UserAction) -> RouterOutcome {
        let mut state = self.signals.lock();

        if let Err(reason) = self.require_active(call_id) {
            debug!("Ignoring {:?} for call {}: {}", action, call_id, reason);
            return RouterOutcome::Ignored { reason };
        }

        let session = match self.retire(&mut state, call_id, action.target_state()) {
            Ok(session) => session,
            Err(reason) => {
                debug!("Ignoring {:?} for call {}: {}", action, call_id, reason);
                return RouterOutcome::Ignored { reason };
            }
        };

        let route = match action {
            UserAction::Accept => {
                let route = accepted_call_route(&session);
                self.bridge.navigate(&route);
                Some(route)
            }
            UserAction::Decline => None,
        };
        let event = CallActionEvent::from_session(&session, action);
        self.bridge.emit(CALL_ACTION_EVENT, &event.to_payload());

        info!("Call {} {} by user", session.call_id, session.state);
        RouterOutcome::Resolved { session, route }
    }

    /// Ring window elapsed for `call_id`. A no-op unless that call is still
    /// the active ringing session.
    pub fn timeout_expire(&self, call_id: &CallId) -> RouterOutcome {
        let mut state = self.signals.lock();

        let active = match self.require_active(call_id) {
            Ok(active) => active,
            Err(reason) => {
                debug!("Ignoring timeout for call {}: {}", call_id, reason);
                return RouterOutcome::Ignored { reason };
            }
        };
        if !active.state.is_ringing() {
            debug!("Ignoring timeout for call {} in state {}", call_id, active.state);
            return RouterOutcome::Ignored {
                reason: SignalError::InvalidTransition {
                    call_id: call_id.clone(),
                    from: active.state,
                    to: CallState::TimedOut,
                },
            };
        }

        match self.retire(&mut state, call_id, CallState::TimedOut) {
            Ok(session) => {
                self.store.clear();
                info!("Call {} from {} timed out", session.call_id, session.caller_id);
                RouterOutcome::Resolved {
                    session,
                    route: None,
                }
            }
            Err(reason) => RouterOutcome::Ignored { reason },
        }
    }

    /// Hang up: end whatever call is active and clear the store
    pub fn end_call(&self) -> RouterOutcome {
        let mut state = self.signals.lock();

        let Some(active) = self.store.current() else {
            debug!("End requested with no active call");
            return RouterOutcome::Ignored {
                reason: SignalError::NoActiveSession,
            };
        };

        match self.retire(&mut state, &active.call_id, CallState::Ended) {
            Ok(session) => {
                self.store.clear();
                info!("Call {} ended", session.call_id);
                RouterOutcome::Ended { session }
            }
            Err(reason) => RouterOutcome::Ignored { reason },
        }
    }

    fn require_active(&self, call_id: &CallId) -> Result<CallSession> {
        match self.store.current() {
            Some(active) if &active.call_id == call_id => Ok(active),
            _ => Err(SignalError::UnknownCallId {
                call_id: call_id.clone(),
            }),
        }
    }

    /// Transition `call_id` to a state that takes it off the screen, and tear
    /// down its timer and UI. Caller holds the signal lock.
    fn retire(
        &self,
        state: &mut RouterState,
        call_id: &CallId,
        target: CallState,
    ) -> Result<CallSession> {
        let session = self.store.transition(call_id, target)?;
        self.timeouts.disarm(call_id);
        self.presenter.cancel(call_id);
        state.recent.remember(call_id.clone());
        Ok(session)
    }

    /// End the stale ringing call and begin `call` in its place. The ended
    /// session is evicted by `begin`.
    fn supersede(
        &self,
        state: &mut RouterState,
        stale: &CallId,
        call: IncomingCall,
    ) -> Result<(CallSession, CallSession)> {
        let old = self.retire(state, stale, CallState::Ended)?;
        let session = self.store.begin(call)?;
        Ok((session, old))
    }

    fn surface(&self) -> Surface {
        if self.config.full_screen.wants_full_screen(self.is_foreground()) {
            Surface::FullScreen
        } else {
            Surface::Notification
        }
    }

    fn arm_timeout(&self, call_id: &CallId) {
        let router = self.self_ref.clone();
        let armed = self.timeouts.arm(call_id, self.config.ring_timeout(), move |expired| {
            if let Some(router) = router.upgrade() {
                router.timeout_expire(&expired);
            }
        });
        if let Err(e) = armed {
            error!("Failed to arm ring timeout for call {}: {}", call_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{BridgeMessage, ChannelBridge, ChannelPresenter, FixedClock, PresenterCommand};
    use crate::config::FullScreenPolicy;
    use crate::timeout::ManualTimerDriver;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        router: Arc<SignalRouter>,
        timers: ManualTimerDriver,
        presenter_rx: UnboundedReceiver<PresenterCommand>,
        bridge_rx: UnboundedReceiver<BridgeMessage>,
    }

    fn harness(config: SignalConfig) -> Harness {
        let (presenter, presenter_rx) = ChannelPresenter::new();
        let (bridge, bridge_rx) = ChannelBridge::new();
        let timers = ManualTimerDriver::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        let router = SignalRouter::builder(Arc::new(presenter), Arc::new(bridge))
            .with_config(config)
            .with_clock(Arc::new(clock))
            .with_timer_driver(Arc::new(timers.clone()))
            .build()
            .unwrap();
        Harness { router, timers, presenter_rx, bridge_rx }
    }

    fn payload(call_id: &str) -> InboundCallPayload {
        InboundCallPayload::new("u1", CallType::Audio)
            .with_caller_name("Alice")
            .with_call_id(call_id)
    }

    fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_inbound_call_rings_and_arms() {
        let mut h = harness(SignalConfig::default());
        let outcome = h.router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap();

        let session = outcome.session().unwrap().clone();
        assert_eq!(session.state, CallState::Ringing);
        assert_eq!(session.source, SignalSource::Push);
        assert!(h.router.has_pending_timeout(&CallId::from("c1")));
        assert_eq!(h.timers.pending(), 1);

        let shown = drain(&mut h.presenter_rx);
        assert_eq!(shown, vec![PresenterCommand::Show { session, surface: Surface::FullScreen }]);
    }

    #[test]
    fn test_surface_follows_foreground_policy() {
        let h = harness(SignalConfig::default());
        h.router.set_foreground(true);
        match h.router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap() {
            RouterOutcome::Ringing { surface, .. } => assert_eq!(surface, Surface::Notification),
            other => panic!("unexpected outcome {:?}", other),
        }

        let h = harness(SignalConfig::default().with_full_screen(FullScreenPolicy::Always));
        h.router.set_foreground(true);
        match h.router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap() {
            RouterOutcome::Ringing { surface, .. } => assert_eq!(surface, Surface::FullScreen),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_invalid_payload_changes_nothing() {
        let mut h = harness(SignalConfig::default());
        let err = h
            .router
            .handle_inbound_call(InboundCallPayload::default(), SignalSource::Push)
            .unwrap_err();
        assert!(matches!(err, SignalError::InvalidPayload { .. }));
        assert!(h.router.current().is_none());
        assert_eq!(h.router.pending_timeouts(), 0);
        assert!(drain(&mut h.presenter_rx).is_empty());
    }

    #[test]
    fn test_decline_emits_reject_without_navigation() {
        let mut h = harness(SignalConfig::default());
        h.router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap();

        let outcome = h.router.handle_user_action(&CallId::from("c1"), UserAction::Decline);
        assert!(matches!(outcome, RouterOutcome::Resolved { route: None, .. }));
        assert_eq!(h.router.current().unwrap().state, CallState::Declined);
        assert_eq!(h.router.pending_timeouts(), 0);

        let messages = drain(&mut h.bridge_rx);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            BridgeMessage::Event { name, payload } => {
                assert_eq!(name, "callAction");
                assert_eq!(payload["action"], "reject");
            }
            other => panic!("unexpected bridge message {:?}", other),
        }
    }

    #[test]
    fn test_second_action_is_ignored() {
        let h = harness(SignalConfig::default());
        h.router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap();
        h.router.handle_user_action(&CallId::from("c1"), UserAction::Accept);

        let outcome = h.router.handle_user_action(&CallId::from("c1"), UserAction::Decline);
        assert!(matches!(
            outcome,
            RouterOutcome::Ignored { reason: SignalError::InvalidTransition { .. } }
        ));
        assert_eq!(h.router.current().unwrap().state, CallState::Accepted);
    }

    #[test]
    fn test_end_call() {
        let mut h = harness(SignalConfig::default());
        assert!(matches!(
            h.router.end_call(),
            RouterOutcome::Ignored { reason: SignalError::NoActiveSession }
        ));

        h.router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap();
        drain(&mut h.presenter_rx);

        let outcome = h.router.end_call();
        match outcome {
            RouterOutcome::Ended { session } => assert_eq!(session.state, CallState::Ended),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(h.router.current().is_none());
        assert_eq!(h.timers.pending(), 0);
        assert_eq!(
            drain(&mut h.presenter_rx),
            vec![PresenterCommand::Cancel { call_id: CallId::from("c1") }]
        );
    }

    #[test]
    fn test_local_call_synthesizes_id() {
        let h = harness(SignalConfig::default());
        let outcome = h.router.start_local_call("u7", None, CallType::Video).unwrap();
        let session = outcome.session().unwrap();

        assert_eq!(session.call_id, CallId::from("1709287200000"));
        assert_eq!(session.caller_name, "Unknown");
        assert_eq!(session.call_type, CallType::Video);
        assert_eq!(session.source, SignalSource::LocalBroadcast);
    }

    #[test]
    fn test_late_duplicate_after_timeout_is_absorbed() {
        let mut h = harness(SignalConfig::default());
        h.router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap();
        h.timers.advance(Duration::from_secs(60));
        assert!(h.router.current().is_none());
        drain(&mut h.presenter_rx);

        let outcome = h.router.handle_inbound_call(payload("c1"), SignalSource::LocalBroadcast).unwrap();
        assert_eq!(
            outcome,
            RouterOutcome::Duplicate { call_id: CallId::from("c1"), session: None }
        );
        assert!(h.router.current().is_none());
        assert_eq!(h.timers.pending(), 0);
        assert!(drain(&mut h.presenter_rx).is_empty());
    }

    #[test]
    fn test_build_without_runtime_needs_driver() {
        let (presenter, _rx) = ChannelPresenter::new();
        let (bridge, _brx) = ChannelBridge::new();
        let result = SignalRouter::builder(Arc::new(presenter), Arc::new(bridge)).build();
        assert!(matches!(result, Err(SignalError::Timer { .. })));
    }

    /// Presenter that starts another call in a shared store whenever a call is
    /// cancelled, as an out-of-router writer would
    struct ForeignWriter {
        store: Arc<CallSessionStore>,
    }

    impl NotificationPresenter for ForeignWriter {
        fn show(&self, _session: &CallSession, _surface: Surface) {}

        fn cancel(&self, _call_id: &CallId) {
            let _ = self.store.begin(IncomingCall {
                call_id: CallId::from("c9"),
                caller_id: "u9".to_string(),
                caller_name: "Mallory".to_string(),
                call_type: CallType::Audio,
                source: SignalSource::Push,
                received_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            });
        }
    }

    #[test]
    fn test_supersede_against_foreign_store_write_is_ignored() {
        let store = Arc::new(CallSessionStore::new());
        let (bridge, _brx) = ChannelBridge::new();
        let timers = ManualTimerDriver::new();
        let router = SignalRouter::builder(
            Arc::new(ForeignWriter { store: Arc::clone(&store) }),
            Arc::new(bridge),
        )
        .with_store(Arc::clone(&store))
        .with_timer_driver(Arc::new(timers.clone()))
        .build()
        .unwrap();

        router.handle_inbound_call(payload("c1"), SignalSource::Push).unwrap();
        let outcome = router.handle_inbound_call(payload("c2"), SignalSource::Push).unwrap();

        assert_eq!(
            outcome,
            RouterOutcome::Ignored {
                reason: SignalError::SessionBusy { active: CallId::from("c9") }
            }
        );
        assert_eq!(store.current().unwrap().call_id, CallId::from("c9"));
        assert!(!router.has_pending_timeout(&CallId::from("c2")));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let (presenter, _rx) = ChannelPresenter::new();
        let (bridge, _brx) = ChannelBridge::new();
        let result = SignalRouter::builder(Arc::new(presenter), Arc::new(bridge))
            .with_config(SignalConfig::default().with_ring_timeout(Duration::ZERO))
            .with_timer_driver(Arc::new(ManualTimerDriver::new()))
            .build();
        assert!(matches!(result, Err(SignalError::Config { .. })));
    }
}
