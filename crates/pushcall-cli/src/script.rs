//! Replay scripts
//!
//! A script is JSON lines, one signal per line. Blank lines and lines starting
//! with `#` are skipped.
//!
//! ```text
//! {"push": {"type": "call", "callerId": "u1", "callerName": "Alice", "callId": "c1"}}
//! {"broadcast": {"callerId": "u1", "callId": "c1"}}
//! {"start": {"callerId": "u2", "callType": "video"}}
//! {"action": {"callId": "c1", "action": "accept"}}
//! {"foreground": true}
//! {"wait_ms": 61000}
//! "end"
//! ```

use anyhow::{anyhow, Context, Result};
use pushcall_core::{
    CallId, CallType, InboundCallPayload, ManualTimerDriver, RouterOutcome, SignalRouter,
    SignalSource, UserAction,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    pub call_id: String,
    pub action: UserAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStep {
    pub caller_id: String,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub call_type: CallType,
}

/// One scripted signal
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Push(InboundCallPayload),
    Broadcast(InboundCallPayload),
    Start(StartStep),
    Action(ActionStep),
    Foreground(bool),
    WaitMs(u64),
    End,
}

/// Parse a JSON-lines script; errors name the offending line
pub fn parse_script(source: &str) -> Result<Vec<(usize, Step)>> {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            serde_json::from_str(line)
                .map(|step| (line_no, step))
                .with_context(|| format!("line {}: unrecognized step", line_no))
        })
        .collect()
}

pub fn load_script(path: &Path) -> Result<Vec<(usize, Step)>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&source)
}

/// How `wait_ms` steps pass time
pub enum Clockwork {
    /// Advance a manual timer driver instantly
    Manual(ManualTimerDriver),
    /// Sleep on the tokio runtime
    Realtime,
}

/// Result of one replayed step; `None` for steps with no router outcome
pub type StepReport = (usize, Option<RouterOutcome>);

pub struct Replay {
    router: Arc<SignalRouter>,
    clockwork: Clockwork,
}

impl Replay {
    pub fn new(router: Arc<SignalRouter>, clockwork: Clockwork) -> Self {
        Self { router, clockwork }
    }

    pub fn router(&self) -> &Arc<SignalRouter> {
        &self.router
    }

    /// Run every step in order. Invalid payloads abort the replay.
    pub async fn run(&self, steps: Vec<(usize, Step)>) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(steps.len());
        for (line_no, step) in steps {
            debug!("Replaying line {}: {:?}", line_no, step);
            let outcome = self
                .apply(step)
                .instrument(info_span!("step", line = line_no))
                .await
                .map_err(|e| anyhow!("line {}: {}", line_no, e))?;
            reports.push((line_no, outcome));
        }
        Ok(reports)
    }

    async fn apply(&self, step: Step) -> pushcall_core::Result<Option<RouterOutcome>> {
        let outcome = match step {
            Step::Push(payload) => Some(self.router.handle_inbound_call(payload, SignalSource::Push)?),
            Step::Broadcast(payload) => {
                Some(self.router.handle_inbound_call(payload, SignalSource::LocalBroadcast)?)
            }
            Step::Start(start) => Some(self.router.start_local_call(
                start.caller_id,
                start.caller_name,
                start.call_type,
            )?),
            Step::Action(action) => Some(
                self.router
                    .handle_user_action(&CallId::from(action.call_id), action.action),
            ),
            Step::Foreground(foreground) => {
                self.router.set_foreground(foreground);
                None
            }
            Step::End => Some(self.router.end_call()),
            Step::WaitMs(ms) => {
                let delay = Duration::from_millis(ms);
                match &self.clockwork {
                    Clockwork::Manual(timers) => {
                        timers.advance(delay);
                    }
                    Clockwork::Realtime => tokio::time::sleep(delay).await,
                }
                None
            }
        };
        Ok(outcome)
    }
}
