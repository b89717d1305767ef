use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use client_core::{load_settings, NativeUpdatesEngine, UpdatesClient, UpdatesState};
use futures::StreamExt;
use serde_json::Value;
use shared::protocol::{CheckResult, DownloadResult, LogEntry};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Feeds recorded native state change payloads through the update state
/// pipeline and prints every resulting state as one JSON line.
#[derive(Parser, Debug)]
struct Args {
    /// File with one native payload per line; blank lines and `#` comments are skipped.
    #[arg(long)]
    script: PathBuf,
    /// How long to wait for a state change after each payload.
    #[arg(long, default_value_t = 250)]
    settle_ms: u64,
    /// Read the engine's log entries after the script finishes.
    #[arg(long)]
    read_logs: bool,
}

struct ScriptedEngine {
    state_changes: broadcast::Sender<Value>,
}

impl ScriptedEngine {
    fn new(capacity: usize) -> Self {
        let (state_changes, _) = broadcast::channel(capacity.max(1));
        Self { state_changes }
    }

    fn emit(&self, payload: Value) -> Result<()> {
        self.state_changes
            .send(payload)
            .map(|_| ())
            .map_err(|_| anyhow!("no listener registered for native state changes"))
    }
}

#[async_trait]
impl NativeUpdatesEngine for ScriptedEngine {
    fn subscribe_state_changes(&self) -> broadcast::Receiver<Value> {
        self.state_changes.subscribe()
    }

    async fn check_for_update(&self) -> Result<CheckResult> {
        Err(anyhow!("replay engine only plays back recorded state changes"))
    }

    async fn fetch_update(&self) -> Result<DownloadResult> {
        Err(anyhow!("replay engine only plays back recorded state changes"))
    }

    async fn read_log_entries(&self, _max_age: Duration) -> Result<Vec<LogEntry>> {
        Ok(Vec::new())
    }

    async fn reload(&self) -> Result<()> {
        Err(anyhow!("replay engine cannot relaunch"))
    }
}

fn load_script(path: &PathBuf) -> Result<Vec<(usize, Value)>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read script '{}'", path.display()))?;
    raw.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            serde_json::from_str(line)
                .map(|payload| (line_no, payload))
                .with_context(|| format!("line {line_no} is not valid JSON"))
        })
        .collect()
}

fn print_state(state: &UpdatesState) -> Result<()> {
    println!("{}", serde_json::to_string(state)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let settings = load_settings();
    let script = load_script(&args.script)?;
    let settle = Duration::from_millis(args.settle_ms);

    let engine = Arc::new(ScriptedEngine::new(script.len()));
    let client = UpdatesClient::new(engine.clone(), settings);
    let monitor = client.monitor();
    let mut states = monitor.state_stream();

    if let Some(initial) = states.next().await {
        print_state(&initial)?;
    }

    info!(payloads = script.len(), "replay: starting");
    for (line_no, payload) in script {
        engine.emit(payload)?;
        match tokio::time::timeout(settle, states.next()).await {
            Ok(Some(state)) => print_state(&state)?,
            Ok(None) => break,
            Err(_) => warn!(line = line_no, "replay: payload produced no state change"),
        }
    }

    if args.read_logs {
        let entries = client.commands().read_log_entries().await?;
        info!(count = entries.len(), "replay: log entries read");
        if let Ok(Some(state)) = tokio::time::timeout(settle, states.next()).await {
            print_state(&state)?;
        }
    }

    monitor.unmount();
    client.shutdown();
    Ok(())
}
