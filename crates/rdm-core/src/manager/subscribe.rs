//! Subscriber registry: snapshot fan-out of the task list.

use std::sync::{Arc, Weak};

use super::ManagerInner;
use crate::task::TaskMetadata;

pub(crate) type ListListener = Arc<dyn Fn(&[TaskMetadata]) + Send + Sync>;

pub(crate) struct SubscriberSet {
    next_id: u64,
    listeners: Vec<(u64, ListListener)>,
}

impl SubscriberSet {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, listener: ListListener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Clones the listener handles out so callers can invoke them without
    /// holding the registry lock (listeners may re-enter the manager).
    pub(crate) fn listeners(&self) -> Vec<ListListener> {
        self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Handle returned by `DownloadManager::subscribe`.
///
/// Dropping it does NOT unsubscribe; call `unsubscribe` explicitly when the
/// listener should stop receiving snapshots.
pub struct Subscription {
    id: u64,
    inner: Weak<ManagerInner>,
}

impl Subscription {
    pub(crate) fn new(id: u64, inner: Weak<ManagerInner>) -> Self {
        Self { id, inner }
    }

    /// Removes the listener; subsequent changes no longer reach it.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().unwrap().remove(self.id);
        }
    }
}
