//! Typed publish/subscribe channel for task lifecycle events.
//!
//! A closed set of event kinds; emission is synchronous fan-out to all
//! currently registered listeners.

use std::sync::{Arc, Mutex};

use crate::error::DownloadError;
use crate::task::{TaskMetadata, TaskProgress};

/// Everything a task can tell the outside world.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Loaded/progress/speed changed after a chunk was materialized.
    Progress(TaskProgress),
    /// Every chunk entry is filled; carries the final metadata snapshot.
    Completed(TaskMetadata),
    /// The task entered PAUSED, by an explicit pause or a detected abort.
    Paused,
    /// The transfer loop failed with a non-cancellation error.
    Failed(DownloadError),
}

type Listener = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Default)]
struct ChannelState {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Per-component event channel.
#[derive(Default)]
pub struct EventChannel {
    state: Mutex<ChannelState>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for all events on this channel.
    pub fn subscribe(&self, listener: impl Fn(&TaskEvent) + Send + Sync + 'static) -> ListenerId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        ListenerId(id)
    }

    /// Removes a listener; later emissions no longer reach it.
    pub fn unsubscribe(&self, id: ListenerId) {
        let mut state = self.state.lock().unwrap();
        state.listeners.retain(|(lid, _)| *lid != id.0);
    }

    /// Synchronously delivers `event` to every current listener.
    ///
    /// Listeners are cloned out before the calls so a listener may subscribe
    /// or unsubscribe from within its own callback.
    pub fn emit(&self, event: &TaskEvent) {
        let listeners: Vec<Listener> = {
            let state = self.state.lock().unwrap();
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_all_listeners() {
        let channel = EventChannel::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            channel.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        channel.emit(&TaskEvent::Paused);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let channel = EventChannel::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = {
            let hits = Arc::clone(&hits);
            channel.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        channel.emit(&TaskEvent::Paused);
        channel.unsubscribe(id);
        channel.emit(&TaskEvent::Paused);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
