//! In-process typed broadcast bus.
//!
//! A [`CommandBus`] is a cloneable handle to a shared list of listeners.
//! `publish` calls every listener synchronously, in subscription order, on
//! the publishing thread. There is no queueing inside the bus; ordering
//! comes from when callers publish.
//!
//! Listeners are identified by their `Arc`, which makes `subscribe` and
//! `unsubscribe` idempotent.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use tickwire::bus::{CommandBus, Listener};
//!
//! let bus: CommandBus<u32> = CommandBus::new();
//! let total = Arc::new(AtomicU32::new(0));
//!
//! let sink = total.clone();
//! let listener: Listener<u32> = Arc::new(move |v: &u32| {
//!     sink.fetch_add(*v, Ordering::Relaxed);
//! });
//!
//! bus.subscribe(&listener);
//! bus.subscribe(&listener); // no-op
//! bus.publish(&5);
//! assert_eq!(total.load(Ordering::Relaxed), 5);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

/// Shared listener callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Cloneable handle to a broadcast channel.
pub struct CommandBus<T> {
    listeners: Arc<Mutex<Vec<Listener<T>>>>,
}

impl<T> CommandBus<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener<T>>> {
        // A listener panicking elsewhere must not disable the bus.
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a listener. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, listener: &Listener<T>) -> bool {
        let mut listeners = self.lock();
        if listeners.iter().any(|l| Arc::ptr_eq(l, listener)) {
            return false;
        }
        listeners.push(listener.clone());
        true
    }

    /// Wrap a closure and subscribe it, returning the handle for unsubscribing.
    pub fn subscribe_fn<F>(&self, f: F) -> Listener<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(f);
        self.subscribe(&listener);
        listener
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, listener: &Listener<T>) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Call every listener with `value`.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe,
    /// unsubscribe or publish again without deadlocking. Changes take
    /// effect from the next publish.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.lock().clone();
        for listener in &snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<T> Clone for CommandBus<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<T> Default for CommandBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CommandBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
