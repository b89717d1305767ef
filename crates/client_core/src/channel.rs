//! Fan-out bus between the native engine's single broadcast and any number
//! of in-process subscribers.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use serde_json::Value;
use shared::protocol::{NativeStateChangeEvent, RawContext};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::UpdatesClientError,
    native::{can_read_native_context, read_native_context, NativeUpdatesEngine},
    normalizer::reconcile_manifest_strings,
    types::UpdatesEvent,
};

pub type EventHandler = Arc<dyn Fn(&UpdatesEvent) + Send + Sync>;

pub struct EventChannel {
    engine: Arc<dyn NativeUpdatesEngine>,
    backlog_warning: usize,
    inner: Mutex<Option<ActiveChannel>>,
}

struct ActiveChannel {
    fanout: Arc<Fanout>,
    forwarder: JoinHandle<()>,
}

/// Every subscriber owns an unbounded queue, so a slow subscriber never loses
/// events; it only falls behind.
struct Fanout {
    subscribers: Mutex<Vec<Subscriber>>,
    backlog_warning: usize,
}

struct Subscriber {
    id: Uuid,
    events: mpsc::UnboundedSender<UpdatesEvent>,
    /// Events queued but not yet handled. `None` for raw receivers.
    pending: Option<Arc<AtomicUsize>>,
}

impl Fanout {
    fn new(backlog_warning: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            backlog_warning,
        }
    }

    fn add(&self, subscriber: Subscriber) {
        self.lock().push(subscriber);
    }

    /// Queues under the lock so all subscribers see one publication order.
    /// Nothing here runs a handler.
    fn send(&self, event: &UpdatesEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|subscriber| !subscriber.events.is_closed());
        for subscriber in subscribers.iter() {
            let Some(pending) = &subscriber.pending else {
                let _ = subscriber.events.send(event.clone());
                continue;
            };
            let queued = pending.fetch_add(1, Ordering::SeqCst) + 1;
            if subscriber.events.send(event.clone()).is_err() {
                pending.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            if queued == self.backlog_warning {
                warn!(
                    subscription = %subscriber.id,
                    queued,
                    "channel: subscriber is falling behind"
                );
            }
        }
    }

    fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventChannel {
    /// `backlog_warning` is the number of queued, unhandled events at which a
    /// subscriber is reported as falling behind. Nothing is ever dropped.
    pub fn new(engine: Arc<dyn NativeUpdatesEngine>, backlog_warning: usize) -> Self {
        Self {
            engine,
            backlog_warning: backlog_warning.max(1),
            inner: Mutex::new(None),
        }
    }

    /// Registers the single native listener. Later calls are no-ops until
    /// `shutdown`. Must run inside a tokio runtime.
    pub fn initialize(&self) {
        let mut guard = self.lock_inner();
        self.fanout(&mut guard);
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_inner().is_some()
    }

    /// Delivers `event` to every current subscriber.
    pub fn publish(&self, event: UpdatesEvent) -> Result<(), UpdatesClientError> {
        let fanout = self
            .lock_inner()
            .as_ref()
            .map(|active| Arc::clone(&active.fanout))
            .ok_or(UpdatesClientError::NotInitialized)?;
        debug!(kind = event.kind(), "channel: publishing event");
        fanout.send(&event);
        Ok(())
    }

    /// Runs `handler` for every event published after this call, in
    /// publication order, until the returned handle is cancelled or dropped.
    /// A panicking handler is logged and keeps receiving.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&UpdatesEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let pending = Arc::new(AtomicUsize::new(0));
        let receiver = self.register(id, Some(Arc::clone(&pending)));
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(deliver_events(
            id,
            receiver,
            Arc::new(handler),
            pending,
            Arc::clone(&cancelled),
        ));
        debug!(subscription = %id, "channel: subscriber added");
        SubscriptionHandle {
            id,
            cancelled,
            task: Mutex::new(Some(task)),
        }
    }

    /// A raw receiver for every event published after this call.
    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<UpdatesEvent> {
        self.register(Uuid::new_v4(), None)
    }

    /// Detaches from the native engine and closes the bus. Subscribers drain
    /// what was already published and then stop.
    pub fn shutdown(&self) {
        let active = self.lock_inner().take();
        if let Some(active) = active {
            active.forwarder.abort();
            active.fanout.close();
            info!("channel: shut down");
        }
    }

    /// Adds the subscriber while holding the channel lock so it cannot land
    /// on a bus that `shutdown` is closing.
    fn register(
        &self,
        id: Uuid,
        pending: Option<Arc<AtomicUsize>>,
    ) -> mpsc::UnboundedReceiver<UpdatesEvent> {
        let (events, receiver) = mpsc::unbounded_channel();
        let mut guard = self.lock_inner();
        self.fanout(&mut guard).add(Subscriber {
            id,
            events,
            pending,
        });
        receiver
    }

    fn fanout(&self, guard: &mut MutexGuard<'_, Option<ActiveChannel>>) -> Arc<Fanout> {
        if let Some(active) = guard.as_ref() {
            return Arc::clone(&active.fanout);
        }

        let fanout = Arc::new(Fanout::new(self.backlog_warning));
        let native = self.engine.subscribe_state_changes();
        let forwarder = tokio::spawn(forward_native_events(
            native,
            Arc::clone(&self.engine),
            Arc::clone(&fanout),
        ));
        info!(
            backlog_warning = self.backlog_warning,
            "channel: listening for native state changes"
        );
        **guard = Some(ActiveChannel {
            fanout: Arc::clone(&fanout),
            forwarder,
        });
        fanout
    }

    fn lock_inner(&self) -> MutexGuard<'_, Option<ActiveChannel>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Some(active) = self.lock_inner().take() {
            active.forwarder.abort();
            active.fanout.close();
        }
    }
}

pub struct SubscriptionHandle {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// False once cancelled, or once the channel has shut down and every
    /// queued event was delivered.
    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    /// Stops delivery. Safe to call more than once.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        debug!(subscription = %self.id, "channel: subscriber removed");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn deliver_events(
    id: Uuid,
    mut receiver: mpsc::UnboundedReceiver<UpdatesEvent>,
    handler: EventHandler,
    pending: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
) {
    while let Some(event) = receiver.recv().await {
        pending.fetch_sub(1, Ordering::SeqCst);
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
            error!(
                subscription = %id,
                kind = event.kind(),
                "channel: subscriber handler panicked; delivery continues"
            );
        }
    }
    cancelled.store(true, Ordering::SeqCst);
    debug!(subscription = %id, "channel: bus closed; delivery finished");
}

/// The engine's broadcast is bounded. When this listener lags behind it, the
/// missed transitions are replaced by one snapshot of the engine's current
/// context, if the engine can supply one.
async fn forward_native_events(
    mut native: broadcast::Receiver<Value>,
    engine: Arc<dyn NativeUpdatesEngine>,
    fanout: Arc<Fanout>,
) {
    loop {
        match native.recv().await {
            Ok(payload) => match decode_native_payload(payload) {
                Ok(context) => fanout.send(&UpdatesEvent::StateChange(context)),
                Err(err) => {
                    warn!(error = %err, "channel: dropping malformed native state change");
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                if can_read_native_context(engine.as_ref()) {
                    warn!(skipped, "channel: native state changes lagged; resyncing from native context");
                    let context = reconcile_manifest_strings(read_native_context(engine.as_ref()));
                    fanout.send(&UpdatesEvent::StateChange(context));
                } else {
                    error!(
                        skipped,
                        "channel: native state changes lagged and the engine has no readable context"
                    );
                }
            }
            Err(RecvError::Closed) => {
                debug!("channel: native state change stream closed");
                break;
            }
        }
    }
}

pub fn decode_native_payload(payload: Value) -> Result<RawContext, UpdatesClientError> {
    let event = NativeStateChangeEvent::from_payload(payload)
        .map_err(|source| UpdatesClientError::MalformedContext {
            field: "payload",
            source,
        })?;
    Ok(reconcile_manifest_strings(event.context))
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
