use std::sync::Arc;

use chrono::Utc;
use shared::protocol::CurrentlyRunningInfo;
use tracing::info;

pub mod channel;
pub mod commands;
pub mod config;
pub mod error;
pub mod native;
pub mod normalizer;
pub mod reducer;
pub mod subscription;
pub mod types;

pub use channel::{EventChannel, SubscriptionHandle};
pub use commands::UpdatesCommands;
pub use config::{load_settings, ClientSettings};
pub use error::{NativeOperation, UpdatesClientError};
pub use native::{can_read_native_context, read_native_context, MissingNativeEngine, NativeUpdatesEngine};
pub use subscription::{Subscription, UpdatesMonitor};
pub use types::{UpdateInfo, UpdatesEvent, UpdatesState};

/// Wires one native engine to one event channel and the commands that feed it.
pub struct UpdatesClient {
    engine: Arc<dyn NativeUpdatesEngine>,
    channel: Arc<EventChannel>,
    commands: UpdatesCommands,
}

impl UpdatesClient {
    pub fn new(engine: Arc<dyn NativeUpdatesEngine>, settings: ClientSettings) -> Self {
        let channel = Arc::new(EventChannel::new(
            Arc::clone(&engine),
            settings.backlog_warning,
        ));
        let commands = UpdatesCommands::new(Arc::clone(&engine), Arc::clone(&channel), &settings);
        Self {
            engine,
            channel,
            commands,
        }
    }

    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    pub fn commands(&self) -> &UpdatesCommands {
        &self.commands
    }

    /// Mounts a state holder seeded from the engine's current context, so the
    /// first read reflects the engine before any event arrives.
    pub fn monitor(&self) -> UpdatesMonitor {
        self.channel.initialize();
        let context = read_native_context(self.engine.as_ref());
        let initial = reducer::reduce_context(&UpdatesState::default(), &context, Utc::now());
        info!(
            is_update_available = initial.is_update_available,
            is_update_pending = initial.is_update_pending,
            "updates: monitor mounted"
        );
        UpdatesMonitor::mount_with(&self.channel, initial)
    }

    pub fn subscribe<F>(&self, on_event: F) -> Subscription
    where
        F: Fn(&UpdatesEvent) + Send + Sync + 'static,
    {
        Subscription::attach(&self.channel, on_event)
    }

    pub fn currently_running(&self) -> CurrentlyRunningInfo {
        self.engine.currently_running()
    }

    pub fn can_read_native_context(&self) -> bool {
        can_read_native_context(self.engine.as_ref())
    }

    pub fn shutdown(&self) {
        self.channel.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
