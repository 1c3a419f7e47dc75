//! pushcall - replay and inspect incoming-call signal flows
//!
//! ```text
//! pushcall replay calls.jsonl --config signal.toml
//! pushcall check-config signal.toml
//! pushcall decode payload.json --data-map
//! ```

mod logging;
mod script;
mod sinks;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pushcall_core::{
    CallSession, Clock, InboundCallPayload, ManualTimerDriver, NotificationContent, RouterOutcome,
    SignalConfig, SignalRouter, SignalSource, SystemClock,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::logging::{parse_log_level, setup_logging, LoggingConfig};
use crate::script::{load_script, Clockwork, Replay};
use crate::sinks::{LogBridge, LogPresenter};

#[derive(Parser, Debug)]
#[command(name = "pushcall", version, about = "Replay and inspect incoming-call signal flows")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PUSHCALL_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Include file and line information in logs
    #[arg(long, global = true)]
    file_info: bool,

    /// Log span activity (one span per replayed script line)
    #[arg(long, global = true)]
    log_spans: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a router from a JSON-lines script of signals
    Replay {
        script: PathBuf,

        /// Signal configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sleep through wait_ms steps instead of advancing a virtual clock
        #[arg(long)]
        realtime: bool,
    },
    /// Validate a configuration file and print the effective settings
    CheckConfig { path: PathBuf },
    /// Validate an inbound call payload
    Decode {
        path: PathBuf,

        /// Treat the file as a flat push data map instead of a payload object
        #[arg(long)]
        data_map: bool,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::new(parse_log_level(&cli.log_level)?);
    if cli.json {
        log_config = log_config.with_json();
    }
    if cli.file_info {
        log_config = log_config.with_file_info();
    }
    if cli.log_spans {
        log_config = log_config.with_spans();
    }
    setup_logging(log_config)?;

    match cli.command {
        Command::Replay { script, config, realtime } => replay(&script, config.as_deref(), realtime).await,
        Command::CheckConfig { path } => check_config(&path),
        Command::Decode { path, data_map, config } => decode(&path, data_map, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<SignalConfig> {
    match path {
        Some(path) => SignalConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(SignalConfig::default()),
    }
}

async fn replay(script: &Path, config: Option<&Path>, realtime: bool) -> Result<()> {
    let config = load_config(config)?;
    let steps = load_script(script)?;
    info!("Replaying {} steps from {}", steps.len(), script.display());

    let builder = SignalRouter::builder(Arc::new(LogPresenter), Arc::new(LogBridge)).with_config(config);
    let (router, clockwork) = if realtime {
        (builder.build()?, Clockwork::Realtime)
    } else {
        let timers = ManualTimerDriver::new();
        let router = builder.with_timer_driver(Arc::new(timers.clone())).build()?;
        (router, Clockwork::Manual(timers))
    };

    let replay = Replay::new(router, clockwork);
    for (line_no, outcome) in replay.run(steps).await? {
        let Some(outcome) = outcome else { continue };
        if let RouterOutcome::Ignored { reason } = &outcome {
            if !reason.is_benign() {
                warn!("Line {} was rejected: {}", line_no, reason);
            }
        }
        println!("{:>4}  {}", line_no, outcome);
    }

    match replay.router().current() {
        Some(session) => println!("final: {} {}", session.state, session.call_id),
        None => println!("final: idle"),
    }
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("{}", rendered);
    Ok(())
}

fn decode(path: &Path, data_map: bool, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload {}", path.display()))?;

    let payload = if data_map {
        let data: HashMap<String, String> =
            serde_json::from_str(&source).context("Data map must be a flat object of strings")?;
        InboundCallPayload::from_data_map(&data)
    } else {
        InboundCallPayload::from_json(&source)?
    };

    let clock = SystemClock;
    let incoming = payload.into_incoming(&config, &clock, SignalSource::Push)?;
    info!("Decoded call {} at {}", incoming.call_id, clock.now());

    let session = CallSession::ringing(incoming);
    let content = NotificationContent::for_session(&session);
    println!("{}", serde_json::to_string_pretty(&session)?);
    println!("{}: {}", content.title, content.body);
    Ok(())
}
