// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed event listener registry for the push transport.
//!
//! Replaces a stringly `on`/`off` emitter with listeners registered per
//! event kind and removed by identity: registering returns a
//! [`ListenerId`], and [`EventListeners::off`] removes exactly that
//! listener, not every listener for the kind.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{TransportEvent, TransportEventKind};

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

/// Type alias for transport event listeners.
type Listener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Registry of transport event listeners.
///
/// Thread-safe: the transport's driver task emits from its own execution
/// context while the connection manager registers and unregisters from the
/// cooperative scheduler. Listeners must not block; anything expensive is
/// expected to be forwarded through the
/// [`EventBridge`](crate::bridge::EventBridge).
pub struct EventListeners {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<ListenerId, (TransportEventKind, Listener)>>,
}

impl EventListeners {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a listener for one event kind.
    pub fn on<F>(&self, kind: TransportEventKind, listener: F) -> ListenerId
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .insert(id, (kind, Arc::new(listener)));
        id
    }

    /// Unregisters a specific listener.
    ///
    /// Returns `true` if the listener was found and removed.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Removes all listeners.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Dispatches an event to every listener registered for its kind.
    ///
    /// Listener invocations happen outside the registry lock, so a
    /// listener may register or unregister without deadlocking.
    pub fn emit(&self, event: &TransportEvent) {
        let kind = event.kind();
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .values()
            .filter(|(listener_kind, _)| *listener_kind == kind)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in matching {
            listener(event);
        }
    }
}

impl Default for EventListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListeners")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    fn lost_event() -> TransportEvent {
        TransportEvent::ConnectionLost {
            reason: "socket closed".to_string(),
        }
    }

    #[test]
    fn emit_reaches_matching_kind_only() {
        let listeners = EventListeners::new();
        let lost = Arc::new(AtomicU32::new(0));
        let restored = Arc::new(AtomicU32::new(0));

        let lost_clone = Arc::clone(&lost);
        listeners.on(TransportEventKind::ConnectionLost, move |_| {
            lost_clone.fetch_add(1, Ordering::SeqCst);
        });
        let restored_clone = Arc::clone(&restored);
        listeners.on(TransportEventKind::ConnectionRestored, move |_| {
            restored_clone.fetch_add(1, Ordering::SeqCst);
        });

        listeners.emit(&lost_event());

        assert_eq!(lost.load(Ordering::SeqCst), 1);
        assert_eq!(restored.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn off_removes_only_that_listener() {
        let listeners = EventListeners::new();
        let count = Arc::new(AtomicU32::new(0));

        let c1 = Arc::clone(&count);
        let id1 = listeners.on(TransportEventKind::ConnectionLost, move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        let _id2 = listeners.on(TransportEventKind::ConnectionLost, move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(listeners.off(id1));
        listeners.emit(&lost_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.listener_count(), 1);
    }

    #[test]
    fn off_unknown_id_returns_false() {
        let listeners = EventListeners::new();
        let id = listeners.on(TransportEventKind::Resumed, |_| {});
        assert!(listeners.off(id));
        assert!(!listeners.off(id));
    }

    #[test]
    fn clear_removes_everything() {
        let listeners = EventListeners::new();
        listeners.on(TransportEventKind::ConnectionLost, |_| {});
        listeners.on(TransportEventKind::StatusUpdate, |_| {});

        listeners.clear();
        assert_eq!(listeners.listener_count(), 0);
    }

    #[test]
    fn listener_may_unregister_during_emit() {
        let listeners = Arc::new(EventListeners::new());
        let id_cell = Arc::new(RwLock::new(None::<ListenerId>));

        let listeners_clone = Arc::clone(&listeners);
        let id_cell_clone = Arc::clone(&id_cell);
        let id = listeners.on(TransportEventKind::ConnectionLost, move |_| {
            if let Some(id) = *id_cell_clone.read() {
                listeners_clone.off(id);
            }
        });
        *id_cell.write() = Some(id);

        listeners.emit(&lost_event());
        assert_eq!(listeners.listener_count(), 0);
    }
}
