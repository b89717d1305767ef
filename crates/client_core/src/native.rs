use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::protocol::{CheckResult, CurrentlyRunningInfo, DownloadResult, LogEntry, RawContext};
use tokio::sync::broadcast;
use tracing::warn;

/// The native OTA runtime. It owns fetching, verification, staging and
/// persistence; this crate only consumes its broadcast and its call results.
#[async_trait]
pub trait NativeUpdatesEngine: Send + Sync {
    /// Raw state change payloads, either JSON objects or JSON-encoded strings.
    fn subscribe_state_changes(&self) -> broadcast::Receiver<Value>;
    async fn check_for_update(&self) -> Result<CheckResult>;
    async fn fetch_update(&self) -> Result<DownloadResult>;
    async fn read_log_entries(&self, max_age: Duration) -> Result<Vec<LogEntry>>;
    async fn reload(&self) -> Result<()>;

    fn supports_native_state_context(&self) -> bool {
        false
    }

    fn native_state_context(&self) -> Result<RawContext> {
        Err(anyhow!("native state context is unavailable"))
    }

    fn currently_running(&self) -> CurrentlyRunningInfo {
        CurrentlyRunningInfo::default()
    }
}

pub fn can_read_native_context(engine: &dyn NativeUpdatesEngine) -> bool {
    engine.supports_native_state_context()
}

/// The engine's current context laid over the idle context. Falls back to the
/// idle context when the engine cannot answer.
pub fn read_native_context(engine: &dyn NativeUpdatesEngine) -> RawContext {
    if !engine.supports_native_state_context() {
        return RawContext::idle();
    }
    match engine.native_state_context() {
        Ok(context) => context.merged_over(RawContext::idle()),
        Err(err) => {
            warn!(error = %err, "updates: native state context read failed; using idle context");
            RawContext::idle()
        }
    }
}

pub struct MissingNativeEngine {
    state_changes: broadcast::Sender<Value>,
}

impl Default for MissingNativeEngine {
    fn default() -> Self {
        let (state_changes, _) = broadcast::channel(1);
        Self { state_changes }
    }
}

#[async_trait]
impl NativeUpdatesEngine for MissingNativeEngine {
    fn subscribe_state_changes(&self) -> broadcast::Receiver<Value> {
        self.state_changes.subscribe()
    }

    async fn check_for_update(&self) -> Result<CheckResult> {
        Err(anyhow!("native updates engine is unavailable"))
    }

    async fn fetch_update(&self) -> Result<DownloadResult> {
        Err(anyhow!("native updates engine is unavailable"))
    }

    async fn read_log_entries(&self, _max_age: Duration) -> Result<Vec<LogEntry>> {
        Err(anyhow!("native updates engine is unavailable"))
    }

    async fn reload(&self) -> Result<()> {
        Err(anyhow!("native updates engine is unavailable"))
    }
}
