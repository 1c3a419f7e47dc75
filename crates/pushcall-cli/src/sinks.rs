//! Collaborators that render router traffic as log lines

use pushcall_core::{
    CallId, CallSession, HostBridge, NotificationContent, NotificationPresenter, Surface,
};
use std::collections::BTreeMap;
use tracing::info;

/// Presenter that logs what a device would show
#[derive(Debug, Default)]
pub struct LogPresenter;

impl NotificationPresenter for LogPresenter {
    fn show(&self, session: &CallSession, surface: Surface) {
        let content = NotificationContent::for_session(session);
        info!(
            "[ui] show {:?} for {}: {} / {}",
            surface, session.call_id, content.title, content.body
        );
    }

    fn cancel(&self, call_id: &CallId) {
        info!("[ui] cancel {}", call_id);
    }
}

/// Bridge that logs events and navigation as the web view would receive them
#[derive(Debug, Default)]
pub struct LogBridge;

impl HostBridge for LogBridge {
    fn emit(&self, event_name: &str, payload: &BTreeMap<String, String>) {
        let body = serde_json::to_string(payload).unwrap_or_default();
        info!("[web] event {} {}", event_name, body);
    }

    fn navigate(&self, route: &str) {
        info!("[web] navigate {}", route);
    }
}
