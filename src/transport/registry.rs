//! Listener table shared by transport implementations.
//!
//! Listeners are invoked outside the table lock, so a listener may register,
//! remove, emit, or close without deadlocking.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{Listener, ListenerId};

struct Entry {
    id: ListenerId,
    event: String,
    listener: Listener,
    once: bool,
}

/// Event name → listeners, in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
    /// Set by `clear`; only read or written with `entries` locked.
    cleared: AtomicBool,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        self.insert(event, listener, false)
    }

    pub fn once(&self, event: &str, listener: Listener) -> ListenerId {
        self.insert(event, listener, true)
    }

    fn insert(&self, event: &str, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.lock();
        if self.cleared.load(Ordering::SeqCst) {
            // Dropping the listener closes whatever it captured
            drop(entries);
            drop(listener);
            return id;
        }
        entries.push(Entry {
            id,
            event: event.to_string(),
            listener,
            once,
        });
        id
    }

    /// Remove every listener for `event`. Returns how many were removed.
    pub fn off(&self, event: &str) -> usize {
        let removed: Vec<Entry> = {
            let mut entries = self.entries.lock();
            let (removed, kept): (Vec<Entry>, Vec<Entry>) =
                entries.drain(..).partition(|e| e.event == event);
            *entries = kept;
            removed
        };
        removed.len()
    }

    /// Remove one listener. Returns false if it already fired or was removed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            entries
                .iter()
                .position(|e| e.id == id)
                .map(|index| entries.remove(index))
        };
        removed.is_some()
    }

    /// Invoke every listener for `event`. Single-use listeners are removed
    /// before any listener runs. Returns how many listeners were invoked.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let listeners: Vec<Listener> = {
            let mut entries = self.entries.lock();
            let matching = entries
                .iter()
                .filter(|e| e.event == event)
                .map(|e| e.listener.clone())
                .collect();
            entries.retain(|e| !(e.once && e.event == event));
            matching
        };

        for listener in &listeners {
            listener(payload.clone());
        }
        listeners.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.event == event).count()
    }

    /// Drop every listener and refuse later registrations. Pending waiters
    /// observe their senders closing, including ones registered after this.
    pub fn clear(&self) {
        let drained: Vec<Entry> = {
            let mut entries = self.entries.lock();
            self.cleared.store(true, Ordering::SeqCst);
            std::mem::take(&mut *entries)
        };
        drop(drained);
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }
}
