use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use shared::protocol::{CheckResult, CurrentlyRunningInfo, DownloadResult, LogEntry, RawContext};
use tokio::sync::{broadcast, watch};

use crate::{native::NativeUpdatesEngine, types::UpdatesState};

pub(crate) struct TestNativeEngine {
    state_changes: broadcast::Sender<Value>,
    fail_with: Option<String>,
    check_result: CheckResult,
    log_entries: Vec<LogEntry>,
    native_context: Option<RawContext>,
    currently_running: CurrentlyRunningInfo,
    pub(crate) check_calls: AtomicUsize,
    pub(crate) fetch_calls: AtomicUsize,
    pub(crate) reload_calls: AtomicUsize,
    pub(crate) requested_log_ages: Mutex<Vec<Duration>>,
}

impl TestNativeEngine {
    pub(crate) fn ok() -> Self {
        let (state_changes, _) = broadcast::channel(64);
        Self {
            state_changes,
            fail_with: None,
            check_result: CheckResult::default(),
            log_entries: Vec::new(),
            native_context: None,
            currently_running: CurrentlyRunningInfo::default(),
            check_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            reload_calls: AtomicUsize::new(0),
            requested_log_ages: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(err: impl Into<String>) -> Self {
        let mut engine = Self::ok();
        engine.fail_with = Some(err.into());
        engine
    }

    pub(crate) fn with_check_result(mut self, check_result: CheckResult) -> Self {
        self.check_result = check_result;
        self
    }

    pub(crate) fn with_log_entries(mut self, log_entries: Vec<LogEntry>) -> Self {
        self.log_entries = log_entries;
        self
    }

    pub(crate) fn with_native_context(mut self, context: RawContext) -> Self {
        self.native_context = Some(context);
        self
    }

    pub(crate) fn with_currently_running(mut self, info: CurrentlyRunningInfo) -> Self {
        self.currently_running = info;
        self
    }

    /// Broadcasts a raw payload the way the native bridge would.
    pub(crate) fn emit(&self, payload: Value) {
        self.state_changes
            .send(payload)
            .expect("event channel should be listening");
    }

    pub(crate) fn emit_context(&self, context: Value) {
        self.emit(json!({ "context": context }));
    }

    pub(crate) fn native_listener_count(&self) -> usize {
        self.state_changes.receiver_count()
    }

    fn fail_if_configured(&self) -> Result<()> {
        match &self.fail_with {
            Some(err) => Err(anyhow!(err.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NativeUpdatesEngine for TestNativeEngine {
    fn subscribe_state_changes(&self) -> broadcast::Receiver<Value> {
        self.state_changes.subscribe()
    }

    async fn check_for_update(&self) -> Result<CheckResult> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_if_configured()?;
        Ok(self.check_result.clone())
    }

    async fn fetch_update(&self) -> Result<DownloadResult> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_if_configured()?;
        Ok(DownloadResult {
            is_new: true,
            ..DownloadResult::default()
        })
    }

    async fn read_log_entries(&self, max_age: Duration) -> Result<Vec<LogEntry>> {
        self.requested_log_ages
            .lock()
            .expect("log ages lock")
            .push(max_age);
        self.fail_if_configured()?;
        Ok(self.log_entries.clone())
    }

    async fn reload(&self) -> Result<()> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_if_configured()
    }

    fn supports_native_state_context(&self) -> bool {
        self.native_context.is_some()
    }

    fn native_state_context(&self) -> Result<RawContext> {
        self.native_context
            .clone()
            .ok_or_else(|| anyhow!("no native context configured"))
    }

    fn currently_running(&self) -> CurrentlyRunningInfo {
        self.currently_running.clone()
    }
}

/// Waits until the published state satisfies `predicate`.
pub(crate) async fn wait_for_state(
    states: &mut watch::Receiver<Arc<UpdatesState>>,
    predicate: impl FnMut(&Arc<UpdatesState>) -> bool,
) -> Arc<UpdatesState> {
    let state = tokio::time::timeout(Duration::from_secs(2), states.wait_for(predicate))
        .await
        .expect("state should change before timeout")
        .expect("monitor should still be publishing");
    state.clone()
}
