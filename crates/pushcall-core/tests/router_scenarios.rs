//! End-to-end signal scenarios driven through the public router API

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use pushcall_core::{
    BridgeMessage, CallId, CallSessionStore, CallState, CallType, ChannelBridge, ChannelPresenter,
    FixedClock, FullScreenPolicy, InboundCallPayload, ManualTimerDriver, PresenterCommand,
    RouterOutcome, SignalConfig, SignalError, SignalRouter, SignalSource, Surface, UserAction,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

struct TestRig {
    router: Arc<SignalRouter>,
    store: Arc<CallSessionStore>,
    clock: Arc<FixedClock>,
    timers: ManualTimerDriver,
    ui: UnboundedReceiver<PresenterCommand>,
    web: UnboundedReceiver<BridgeMessage>,
}

impl TestRig {
    fn new() -> Self {
        Self::with_config(SignalConfig::default())
    }

    fn with_config(config: SignalConfig) -> Self {
        init_tracing();
        let (presenter, ui) = ChannelPresenter::new();
        let (bridge, web) = ChannelBridge::new();
        let store = Arc::new(CallSessionStore::new());
        let timers = ManualTimerDriver::new();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()));
        let router = SignalRouter::builder(Arc::new(presenter), Arc::new(bridge))
            .with_config(config)
            .with_store(Arc::clone(&store))
            .with_clock(clock.clone())
            .with_timer_driver(Arc::new(timers.clone()))
            .build()
            .expect("router should build");
        Self { router, store, clock, timers, ui, web }
    }

    fn push(&self, call_id: &str) -> RouterOutcome {
        self.router
            .handle_inbound_call(alice(call_id), SignalSource::Push)
            .expect("valid payload")
    }

    fn ui_commands(&mut self) -> Vec<PresenterCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.ui.try_recv() {
            out.push(cmd);
        }
        out
    }

    fn web_messages(&mut self) -> Vec<BridgeMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.web.try_recv() {
            out.push(msg);
        }
        out
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pushcall_core=debug")
        .with_test_writer()
        .try_init();
}

fn alice(call_id: &str) -> InboundCallPayload {
    InboundCallPayload::new("u1", CallType::Audio)
        .with_caller_name("Alice")
        .with_call_id(call_id)
}

#[test]
fn test_fresh_call_rings_with_one_timer() {
    let mut rig = TestRig::new();
    let outcome = rig.push("c1");

    assert!(matches!(outcome, RouterOutcome::Ringing { superseded: None, .. }));
    let session = rig.store.current().unwrap();
    assert_eq!(session.call_id, CallId::from("c1"));
    assert_eq!(session.state, CallState::Ringing);
    assert_eq!(rig.router.pending_timeouts(), 1);
    assert_eq!(rig.timers.pending(), 1);
    assert_eq!(rig.ui_commands().len(), 1);
}

#[test]
fn test_identical_payload_twice_is_idempotent() {
    let mut rig = TestRig::new();
    rig.push("c1");
    let outcome = rig
        .router
        .handle_inbound_call(alice("c1"), SignalSource::LocalBroadcast)
        .unwrap();

    match outcome {
        RouterOutcome::Duplicate { call_id, session } => {
            assert_eq!(call_id, CallId::from("c1"));
            let session = session.unwrap();
            assert_eq!(session.state, CallState::Ringing);
            // The first delivery wins
            assert_eq!(session.source, SignalSource::Push);
        }
        other => panic!("expected duplicate, got {:?}", other),
    }
    assert_eq!(rig.timers.pending(), 1);
    assert_eq!(rig.ui_commands().len(), 1);
}

#[test]
fn test_new_call_supersedes_ringing_call() {
    let mut rig = TestRig::new();
    rig.push("c1");
    let outcome = rig.push("c2");

    match &outcome {
        RouterOutcome::Ringing { session, superseded, .. } => {
            assert_eq!(session.call_id, CallId::from("c2"));
            let old = superseded.as_ref().unwrap();
            assert_eq!(old.call_id, CallId::from("c1"));
            assert_eq!(old.state, CallState::Ended);
        }
        other => panic!("expected ringing, got {:?}", other),
    }

    let active = rig.store.current().unwrap();
    assert_eq!(active.call_id, CallId::from("c2"));
    assert_eq!(active.state, CallState::Ringing);
    assert!(!rig.router.has_pending_timeout(&CallId::from("c1")));
    assert!(rig.router.has_pending_timeout(&CallId::from("c2")));
    assert_eq!(rig.timers.pending(), 1);

    let commands = rig.ui_commands();
    assert_eq!(commands.len(), 3);
    assert!(matches!(&commands[0], PresenterCommand::Show { session, .. } if session.call_id == CallId::from("c1")));
    assert_eq!(commands[1], PresenterCommand::Cancel { call_id: CallId::from("c1") });
    assert!(matches!(&commands[2], PresenterCommand::Show { session, .. } if session.call_id == CallId::from("c2")));

    // The superseded id does not come back
    let late = rig.push("c1");
    assert!(late.is_noop());
    assert_eq!(rig.store.current().unwrap().call_id, CallId::from("c2"));
}

#[test]
fn test_resolved_state_is_final() {
    let rig = TestRig::new();
    rig.push("c1");
    rig.router.handle_user_action(&CallId::from("c1"), UserAction::Accept);

    let err = rig
        .store
        .transition(&CallId::from("c1"), CallState::Ringing)
        .unwrap_err();
    assert!(matches!(err, SignalError::InvalidTransition { .. }));
    assert_eq!(rig.store.current().unwrap().state, CallState::Accepted);
}

#[test]
fn test_stale_action_is_noop() {
    let mut rig = TestRig::new();
    rig.push("c1");
    rig.push("c2");
    rig.ui_commands();

    let outcome = rig.router.handle_user_action(&CallId::from("c1"), UserAction::Accept);
    assert_eq!(
        outcome,
        RouterOutcome::Ignored {
            reason: SignalError::UnknownCallId { call_id: CallId::from("c1") }
        }
    );
    assert_eq!(rig.store.current().unwrap().state, CallState::Ringing);
    assert!(rig.ui_commands().is_empty());
    assert!(rig.web_messages().is_empty());
}

#[test]
fn test_accept_emits_route_and_event() {
    let mut rig = TestRig::new();
    rig.push("c1");

    let outcome = rig.router.handle_user_action(&CallId::from("c1"), UserAction::Accept);
    let route = "/call/c1?type=audio&caller=Alice&recipient=u1".to_string();
    assert!(matches!(&outcome, RouterOutcome::Resolved { route: Some(r), .. } if *r == route));

    let expected_event: BTreeMap<String, String> = [
        ("action", "accept"),
        ("callerId", "u1"),
        ("callerName", "Alice"),
        ("callType", "audio"),
        ("callId", "c1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    assert_eq!(
        rig.web_messages(),
        vec![
            BridgeMessage::Navigate { route },
            BridgeMessage::Event { name: "callAction".to_string(), payload: expected_event },
        ]
    );

    let commands = rig.ui_commands();
    assert_eq!(commands.last(), Some(&PresenterCommand::Cancel { call_id: CallId::from("c1") }));
    assert_eq!(rig.timers.pending(), 0);
}

#[test]
fn test_video_call_from_data_map() {
    let mut rig = TestRig::with_config(SignalConfig::default().with_full_screen(FullScreenPolicy::Never));
    let data: HashMap<String, String> = [
        ("type", "video_call"),
        ("callerId", "u9"),
        ("callId", "v1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let outcome = rig
        .router
        .handle_inbound_call(InboundCallPayload::from_data_map(&data), SignalSource::Push)
        .unwrap();
    match outcome {
        RouterOutcome::Ringing { session, surface, .. } => {
            assert_eq!(session.call_type, CallType::Video);
            assert_eq!(session.caller_name, "Unknown");
            assert_eq!(surface, Surface::Notification);
        }
        other => panic!("expected ringing, got {:?}", other),
    }

    rig.router.handle_user_action(&CallId::from("v1"), UserAction::Accept);
    let navigated = rig
        .web_messages()
        .into_iter()
        .find_map(|m| match m {
            BridgeMessage::Navigate { route } => Some(route),
            _ => None,
        })
        .unwrap();
    assert_eq!(navigated, "/call/v1?type=video&caller=Unknown&recipient=u9");
}

#[test]
fn test_new_call_after_accept_replaces_session() {
    let mut rig = TestRig::new();
    rig.push("c1");
    rig.router.handle_user_action(&CallId::from("c1"), UserAction::Accept);
    rig.ui_commands();

    let outcome = rig.push("c2");
    // An accepted call is not superseded, only replaced
    assert!(matches!(outcome, RouterOutcome::Ringing { superseded: None, .. }));
    assert_eq!(rig.store.current().unwrap().call_id, CallId::from("c2"));
    assert_eq!(rig.ui_commands().len(), 1);
}

#[test]
fn test_end_call_after_accept() {
    let mut rig = TestRig::new();
    rig.push("c1");
    rig.router.handle_user_action(&CallId::from("c1"), UserAction::Accept);
    rig.web_messages();

    let outcome = rig.router.end_call();
    assert!(matches!(outcome, RouterOutcome::Ended { .. }));
    assert!(rig.store.current().is_none());
    // Ending emits nothing to the web view
    assert!(rig.web_messages().is_empty());
    assert!(rig.router.end_call().is_noop());
}

#[test]
fn test_accept_event_encodes_reserved_characters() {
    let mut rig = TestRig::new();
    let payload = InboundCallPayload::new("u&1'", CallType::Audio)
        .with_caller_name("Al'ice \"Ops\"")
        .with_call_id("c1");
    rig.router.handle_inbound_call(payload, SignalSource::Push).unwrap();
    rig.router.handle_user_action(&CallId::from("c1"), UserAction::Accept);

    let messages = rig.web_messages();
    assert_eq!(
        messages[0],
        BridgeMessage::Navigate {
            route: "/call/c1?type=audio&caller=Al%27ice+%22Ops%22&recipient=u%261%27".to_string()
        }
    );
    match &messages[1] {
        BridgeMessage::Event { payload, .. } => {
            assert_eq!(payload["callerId"], "u%261%27");
            assert_eq!(payload["callerName"], "Al%27ice+%22Ops%22");
            assert_eq!(payload["callType"], "audio");
        }
        other => panic!("expected callAction event, got {:?}", other),
    }
}

#[test]
fn test_local_calls_take_ids_from_the_clock() {
    let rig = TestRig::new();
    let first = rig.router.start_local_call("u1", None, CallType::Audio).unwrap();
    assert_eq!(first.session().unwrap().call_id, CallId::from("1709287200000"));
    rig.router.end_call();

    let later = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();
    rig.clock.set(later);
    let second = rig.router.start_local_call("u1", Some("Alice".to_string()), CallType::Video).unwrap();
    let session = second.session().unwrap();
    assert_eq!(session.call_id, CallId::from("1709287500000"));
    assert_eq!(session.created_at, later);
    assert_eq!(session.source, SignalSource::LocalBroadcast);
}
