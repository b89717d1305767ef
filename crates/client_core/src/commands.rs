//! Imperative calls into the native engine. Failures are returned to the
//! caller and mirrored into the event channel so passive observers see them.

use std::{sync::Arc, time::Duration};

use shared::protocol::{CheckResult, DownloadResult, LogEntry};
use tracing::{info, warn};

use crate::{
    channel::EventChannel,
    config::ClientSettings,
    error::{NativeOperation, UpdatesClientError},
    native::NativeUpdatesEngine,
    types::UpdatesEvent,
};

pub struct UpdatesCommands {
    engine: Arc<dyn NativeUpdatesEngine>,
    channel: Arc<EventChannel>,
    log_entries_max_age: Duration,
}

impl UpdatesCommands {
    pub fn new(
        engine: Arc<dyn NativeUpdatesEngine>,
        channel: Arc<EventChannel>,
        settings: &ClientSettings,
    ) -> Self {
        Self {
            engine,
            channel,
            log_entries_max_age: settings.log_entries_max_age,
        }
    }

    /// The engine emits its own checking/settled contexts while this runs;
    /// this call does not touch state on success.
    pub async fn check_for_update(&self) -> Result<CheckResult, UpdatesClientError> {
        info!("updates: checking for update");
        match self.engine.check_for_update().await {
            Ok(result) => {
                info!(
                    is_available = result.is_available,
                    is_rollback = result.is_rollback,
                    "updates: check completed"
                );
                Ok(result)
            }
            Err(err) => Err(self.mirror_failure(NativeOperation::CheckForUpdate, err)),
        }
    }

    pub async fn download_update(&self) -> Result<DownloadResult, UpdatesClientError> {
        info!("updates: downloading update");
        match self.engine.fetch_update().await {
            Ok(result) => {
                info!(is_new = result.is_new, "updates: download completed");
                Ok(result)
            }
            Err(err) => Err(self.mirror_failure(NativeOperation::DownloadUpdate, err)),
        }
    }

    pub async fn read_log_entries(&self) -> Result<Vec<LogEntry>, UpdatesClientError> {
        self.read_log_entries_within(self.log_entries_max_age).await
    }

    /// On success the entries are also published, which is how they reach
    /// `UpdatesState::log_entries`.
    pub async fn read_log_entries_within(
        &self,
        max_age: Duration,
    ) -> Result<Vec<LogEntry>, UpdatesClientError> {
        match self.engine.read_log_entries(max_age).await {
            Ok(entries) => {
                info!(count = entries.len(), "updates: log entries read");
                self.channel
                    .publish(UpdatesEvent::ReadLogEntriesComplete(entries.clone()))?;
                Ok(entries)
            }
            Err(err) => Err(self.mirror_failure(NativeOperation::ReadLogEntries, err)),
        }
    }

    /// Asks the engine to relaunch. Whether and when to call this is the
    /// caller's decision.
    pub async fn reload(&self) -> Result<(), UpdatesClientError> {
        info!("updates: requesting reload");
        self.engine
            .reload()
            .await
            .map_err(|err| self.mirror_failure(NativeOperation::Reload, err))
    }

    fn mirror_failure(&self, operation: NativeOperation, err: anyhow::Error) -> UpdatesClientError {
        let error = UpdatesClientError::native(operation, &err);
        warn!(%operation, error = %error, "updates: native call failed");
        if let Err(publish_err) = self.channel.publish(UpdatesEvent::Error(error.to_payload())) {
            warn!(%operation, error = %publish_err, "updates: failure not mirrored to observers");
        }
        error
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
