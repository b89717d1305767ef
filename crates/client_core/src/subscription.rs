//! Consumer-side binding to the event channel, and the per-consumer state
//! holder built on it.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::{
    channel::{EventChannel, EventHandler, SubscriptionHandle},
    reducer::reduce_event,
    types::{UpdatesEvent, UpdatesState},
};

/// One channel subscription whose target handler can be swapped at any time.
pub struct Subscription {
    current: Arc<RwLock<EventHandler>>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn attach<F>(channel: &EventChannel, on_event: F) -> Self
    where
        F: Fn(&UpdatesEvent) + Send + Sync + 'static,
    {
        let current: Arc<RwLock<EventHandler>> = Arc::new(RwLock::new(Arc::new(on_event)));
        let target = Arc::clone(&current);
        let handle = channel.subscribe(move |event| {
            let on_event = Arc::clone(&*target.read().unwrap_or_else(PoisonError::into_inner));
            on_event(event);
        });
        Self { current, handle }
    }

    /// Future events go to `on_event`; the channel subscription is unchanged.
    pub fn replace_handler<F>(&self, on_event: F)
    where
        F: Fn(&UpdatesEvent) + Send + Sync + 'static,
    {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(on_event);
        debug!(subscription = %self.handle.id(), "subscription: handler replaced");
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_active()
    }

    pub fn detach(&self) {
        self.handle.cancel();
    }
}

/// Owns one consumer's `UpdatesState`. Each event replaces the snapshot with
/// a freshly reduced one.
pub struct UpdatesMonitor {
    state: Arc<watch::Sender<Arc<UpdatesState>>>,
    subscription: Subscription,
}

impl UpdatesMonitor {
    pub fn mount(channel: &EventChannel) -> Self {
        Self::mount_with(channel, UpdatesState::default())
    }

    pub fn mount_with(channel: &EventChannel, initial: UpdatesState) -> Self {
        let (state, _) = watch::channel(Arc::new(initial));
        let state = Arc::new(state);
        let target = Arc::clone(&state);
        let subscription = Subscription::attach(channel, move |event| {
            target.send_modify(|current| {
                let next = reduce_event(current, event, Utc::now());
                *current = Arc::new(next);
            });
        });
        Self {
            state,
            subscription,
        }
    }

    pub fn current_state(&self) -> Arc<UpdatesState> {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<Arc<UpdatesState>> {
        self.state.subscribe()
    }

    pub fn state_stream(&self) -> WatchStream<Arc<UpdatesState>> {
        WatchStream::new(self.state.subscribe())
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_attached()
    }

    /// Stops state delivery. In-flight commands are not affected.
    pub fn unmount(&self) {
        self.subscription.detach();
    }
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
