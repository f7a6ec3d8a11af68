use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::types::{OperationKind, OperationPatch, TrackedOperation};

pub type SharedNotificationStore = Arc<NotificationStore>;

/// Point-in-time copy of the store handed to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub revision: u64,
    pub operations: Vec<TrackedOperation>,
}

impl StoreSnapshot {
    pub fn of_kind(&self, kind: OperationKind) -> impl Iterator<Item = &TrackedOperation> {
        self.operations.iter().filter(move |op| op.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Default)]
struct StoreInner {
    order: Vec<String>,
    entries: HashMap<String, TrackedOperation>,
    revision: u64,
}

impl StoreInner {
    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            revision: self.revision,
            operations: self
                .order
                .iter()
                .filter_map(|id| self.entries.get(id).cloned())
                .collect(),
        }
    }
}

/// Single mutable home for every tracked operation. Each mutation publishes a fresh snapshot.
pub struct NotificationStore {
    inner: Mutex<StoreInner>,
    publisher: watch::Sender<StoreSnapshot>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(StoreSnapshot::default());
        Self {
            inner: Mutex::new(StoreInner::default()),
            publisher,
        }
    }

    pub fn shared() -> SharedNotificationStore {
        Arc::new(Self::new())
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot()
    }

    pub fn get(&self, id: &str) -> Option<TrackedOperation> {
        self.lock().entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Insert operations; an existing id is replaced in place rather than duplicated.
    pub fn add_operations(&self, ops: impl IntoIterator<Item = TrackedOperation>) {
        let mut inner = self.lock();
        for mut op in ops {
            op.normalize();
            debug!(id = %op.id, kind = %op.kind, status = %op.status, "tracking operation");
            if !inner.entries.contains_key(&op.id) {
                inner.order.push(op.id.clone());
            }
            inner.entries.insert(op.id.clone(), op);
        }
        self.publish(&mut inner);
    }

    /// Returns `false` when the id is unknown; the store is left untouched in that case.
    pub fn update_operation(&self, id: &str, patch: OperationPatch) -> bool {
        let mut inner = self.lock();
        let Some(op) = inner.entries.get_mut(id) else {
            warn!(%id, "update for unknown operation ignored");
            return false;
        };

        op.apply(patch);
        debug!(%id, status = %op.status, progress = op.progress_percent, "operation updated");
        self.publish(&mut inner);
        true
    }

    /// Idempotent; returns whether anything was removed.
    pub fn remove_operation(&self, id: &str) -> bool {
        let mut inner = self.lock();
        if inner.entries.remove(id).is_none() {
            return false;
        }

        inner.order.retain(|existing| existing != id);
        self.publish(&mut inner);
        true
    }

    pub fn reset_all(&self) {
        let mut inner = self.lock();
        let cleared = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        debug!(cleared, "notification store reset");
        self.publish(&mut inner);
    }

    fn publish(&self, inner: &mut StoreInner) {
        inner.revision += 1;
        self.publisher.send_replace(inner.snapshot());
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
