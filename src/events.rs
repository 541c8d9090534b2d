use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// Lifecycle notifications emitted by a [`FileEntity`](crate::FileEntity).
///
/// Events carry no payload: subscribers re-read the entity's state after
/// delivery, so the event stream and the state can never diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEvent {
    /// A metadata reload has started.
    Loading,
    /// A metadata reload has completed and the state was replaced.
    Loaded,
    /// The underlying file was deleted.
    Deleted,
    /// Content was written to the underlying file.
    Written,
    /// The underlying file was copied to another location.
    Copied,
}

/// Handle returned by [`EventEmitter::subscribe`], used to unsubscribe.
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(FileEvent) + Send + Sync>;

/// Minimal synchronous publish/subscribe channel.
///
/// Delivery happens on the emitting thread, in subscription order. The
/// listener list is snapshotted before delivery, so a callback may
/// subscribe, unsubscribe, or trigger operations that emit further
/// events; a listener added during delivery only receives subsequent
/// events.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return its id.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(FileEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false if the id is unknown.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub(crate) fn emit(&self, event: FileEvent) {
        log::trace!("Emitting event: {:?}", event);
        // Deliver from a snapshot taken outside the lock, so a callback
        // can re-enter the emitter without deadlocking
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.listeners.lock().unwrap().len();
        f.debug_struct("EventEmitter")
            .field("listeners", &count)
            .finish()
    }
}
