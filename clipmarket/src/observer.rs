//! Synchronous observer registry shared by the auth store and the realtime
//! channel.
//!
//! Listeners are invoked in registration order. Emission works on a snapshot
//! of the registered listeners, so a listener may unsubscribe itself (or any
//! other listener) while an emission is in progress, and a listener added
//! during an emission only sees the next one.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

/// A registered callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type Entries<T> = Mutex<Vec<(u64, Listener<T>)>>;

/// Ordered set of listeners for values of type `T`.
pub struct ListenerSet<T> {
    entries: Arc<Entries<T>>,
    next_id: AtomicU64,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T: 'static> ListenerSet<T> {
    /// Create an empty listener set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return the handle that removes it.
    pub fn add(&self, listener: Listener<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, listener));

        let entries: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        Subscription::new(move || {
            if let Some(entries) = entries.upgrade() {
                lock(&entries).retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Deliver `value` to every listener registered at the time of the call.
    ///
    /// A panicking listener is logged and skipped; delivery continues with
    /// the next one. Returns the number of listeners that completed normally.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Listener<T>> = lock(&self.entries)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    log::error!("Listener panicked during emission: {}", panic_message(&panic));
                }
            }
        }
        delivered
    }

    /// Remove every listener
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by every `subscribe`/`on` call.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
/// Unsubscribing is idempotent and safe to call from inside a listener.
pub struct Subscription {
    remove: Box<dyn Fn() + Send + Sync>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(remove: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            remove: Box::new(remove),
            active: AtomicBool::new(true),
        }
    }

    /// Remove the listener. Subsequent calls do nothing.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            (self.remove)();
        }
    }

    /// Whether `unsubscribe` has not been called yet.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
