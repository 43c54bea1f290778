//! In-memory progress publish/subscribe keyed by chapter id
//!
//! Two ways to listen:
//! - [`ProgressBus::subscribe`] registers a synchronous callback, invoked on
//!   every [`ProgressBus::publish`] for that id in registration order.
//! - [`ProgressBus::watch`] returns a broadcast receiver for one id, and
//!   [`ProgressBus::events`] one for every id. Both can be turned into async
//!   streams with [`ProgressBus::watch_stream`].
//!
//! Nothing here is persisted; listeners disappear with the process.

use crate::types::{ChapterId, ProgressUpdate, Status};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Capacity of each per-id broadcast channel
const WATCH_CAPACITY: usize = 64;

/// Capacity of the all-ids broadcast channel
const EVENTS_CAPACITY: usize = 1000;

type Callback = Arc<dyn Fn(f32, Status) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_token: u64,
    callbacks: HashMap<ChapterId, Vec<(u64, Callback)>>,
    channels: HashMap<ChapterId, broadcast::Sender<ProgressUpdate>>,
}

/// Publish/subscribe hub for [`ProgressUpdate`]s
///
/// Cheap to clone; clones share listeners.
#[derive(Clone)]
pub struct ProgressBus {
    registry: Arc<Mutex<Registry>>,
    events_tx: broadcast::Sender<ProgressUpdate>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        let (events_tx, _rx) = broadcast::channel(EVENTS_CAPACITY);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            events_tx,
        }
    }

    /// Register `callback` for updates of `id`
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, id: ChapterId, callback: F) -> Subscription
    where
        F: Fn(f32, Status) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let token = registry.next_token;
        registry.next_token += 1;
        registry
            .callbacks
            .entry(id.clone())
            .or_default()
            .push((token, Arc::new(callback)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
            token,
        }
    }

    /// Receiver for updates of one id
    ///
    /// Channels left without receivers are pruned first.
    pub fn watch(&self, id: &ChapterId) -> broadcast::Receiver<ProgressUpdate> {
        let mut registry = lock(&self.registry);
        registry.channels.retain(|_, tx| tx.receiver_count() > 0);
        registry
            .channels
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(WATCH_CAPACITY).0)
            .subscribe()
    }

    /// Updates of one id as an async stream
    ///
    /// Updates missed because the consumer lagged behind are skipped.
    pub fn watch_stream(&self, id: &ChapterId) -> impl Stream<Item = ProgressUpdate> + use<> {
        let id = id.clone();
        BroadcastStream::new(self.watch(&id)).filter_map(move |result| match result {
            Ok(update) => Some(update),
            Err(e) => {
                tracing::debug!(chapter = %id, error = %e, "Progress watcher lagged");
                None
            }
        })
    }

    /// Receiver for updates of every id
    pub fn events(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.events_tx.subscribe()
    }

    /// Deliver an update to every listener of `id`
    ///
    /// Callbacks run synchronously on the caller's task, in registration
    /// order, outside the registry lock, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn publish(&self, id: &ChapterId, progress: f32, status: Status) {
        let progress = progress.clamp(0.0, 1.0);
        let update = ProgressUpdate {
            id: id.clone(),
            progress,
            status,
        };

        let callbacks: Vec<Callback> = {
            let mut registry = lock(&self.registry);

            let orphaned = registry
                .channels
                .get(id)
                .is_some_and(|tx| tx.send(update.clone()).is_err());
            if orphaned {
                // Every watcher is gone
                registry.channels.remove(id);
            }

            registry
                .callbacks
                .get(id)
                .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(progress, status);
        }

        // No receivers is fine
        let _ = self.events_tx.send(update);
    }

    /// Number of callbacks registered for `id`
    pub fn listener_count(&self, id: &ChapterId) -> usize {
        lock(&self.registry)
            .callbacks
            .get(id)
            .map_or(0, Vec::len)
    }
}

/// Handle of one registered callback
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: ChapterId,
    token: u64,
}

impl Subscription {
    /// Remove the callback from the bus
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn remove(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        if let Some(list) = registry.callbacks.get_mut(&self.id) {
            list.retain(|(token, _)| *token != self.token);
            if list.is_empty() {
                registry.callbacks.remove(&self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
