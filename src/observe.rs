//! Change notification for collections.
//!
//! Each collection owns an [`Observer`]. Mutations report a [`Change`]; outside a
//! batch every change is delivered at once as a one-element [`ChangeSet`], inside
//! a batch changes queue up and go out as one set when the outermost batch ends.
//!
//! Delivery goes through `event_emitter_rs` (feature `emitter`, on by default).
//! The emitter runs listeners on their own threads; `publish` joins them, so
//! listeners have all run by the time the mutating call returns. Without the
//! feature, changes are tracked but never delivered.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::id::Id;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;

const CHANGE_EVENT: &str = "change";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
    /// The whole collection was cleared.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub type_name: Option<String>,
    pub id: Option<String>,
    pub field: Option<String>,
}

impl Change {
    pub fn new(kind: ChangeKind, type_name: &str, id: Option<&Id>, field: Option<&str>) -> Self {
        Self {
            kind,
            type_name: Some(type_name.to_string()),
            id: id.map(Id::to_string),
            field: field.map(str::to_string),
        }
    }

    pub fn reset() -> Self {
        Self {
            kind: ChangeKind::Reset,
            type_name: None,
            id: None,
            field: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }
}

/// Returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<Change>,
}

pub(crate) struct Observer {
    batch: Mutex<BatchState>,
    #[cfg(feature = "emitter")]
    emitter: Mutex<EventEmitter>,
    #[cfg(not(feature = "emitter"))]
    next_id: std::sync::atomic::AtomicU64,
}

impl Observer {
    pub fn new() -> Self {
        Self {
            batch: Mutex::new(BatchState::default()),
            #[cfg(feature = "emitter")]
            emitter: Mutex::new(EventEmitter::new()),
            #[cfg(not(feature = "emitter"))]
            next_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    #[cfg(feature = "emitter")]
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(ChangeSet) + Send + Sync + 'static,
    {
        SubscriptionId(self.emitter.lock().on(CHANGE_EVENT, listener))
    }

    #[cfg(not(feature = "emitter"))]
    pub fn subscribe<F>(&self, _listener: F) -> SubscriptionId
    where
        F: Fn(ChangeSet) + Send + Sync + 'static,
    {
        use std::sync::atomic::Ordering;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        SubscriptionId(format!("{}-{}", CHANGE_EVENT, id))
    }

    #[cfg(feature = "emitter")]
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.emitter.lock().remove_listener(&id.0).is_some()
    }

    #[cfg(not(feature = "emitter"))]
    pub fn unsubscribe(&self, _id: &SubscriptionId) -> bool {
        false
    }

    pub fn notify(&self, change: Change) {
        {
            let mut batch = self.batch.lock();
            if batch.depth > 0 {
                batch.pending.push(change);
                return;
            }
        }
        self.publish(ChangeSet {
            changes: vec![change],
        });
    }

    pub fn begin(&self) {
        self.batch.lock().depth += 1;
    }

    /// Close one batch level; the outermost one flushes everything queued.
    pub fn end(&self) {
        let pending = {
            let mut batch = self.batch.lock();
            batch.depth = batch.depth.saturating_sub(1);
            if batch.depth > 0 || batch.pending.is_empty() {
                return;
            }
            std::mem::take(&mut batch.pending)
        };
        self.publish(ChangeSet { changes: pending });
    }

    #[cfg(feature = "emitter")]
    fn publish(&self, set: ChangeSet) {
        let handles = self.emitter.lock().emit(CHANGE_EVENT, set);
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("change listener panicked");
            }
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn publish(&self, set: ChangeSet) {
        tracing::trace!(changes = set.len(), "change delivery disabled");
    }
}
