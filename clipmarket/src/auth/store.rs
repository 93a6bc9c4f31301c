//! Single source of truth for the authentication snapshot.

use super::models::AuthState;
use crate::observer::{ListenerSet, Subscription, lock};
use std::sync::{
    Arc, Mutex, TryLockError,
    atomic::{AtomicU64, Ordering},
};

struct Versioned {
    state: AuthState,
    version: u64,
}

/// Holds the current [`AuthState`] and multicasts every replacement.
///
/// The snapshot is only ever swapped wholesale under the lock, and every
/// swap bumps a version. Emission is done by one caller at a time, which
/// always delivers the newest stored version; listeners therefore see
/// snapshots in store order and their last delivery matches
/// [`AuthStore::snapshot`], even when tasks on different threads update
/// concurrently.
pub struct AuthStore {
    current: Mutex<Versioned>,
    listeners: ListenerSet<AuthState>,
    emitting: Mutex<()>,
    emitted: AtomicU64,
}

impl AuthStore {
    pub fn new(initial: AuthState) -> Self {
        Self {
            current: Mutex::new(Versioned {
                state: initial,
                version: 0,
            }),
            listeners: ListenerSet::new(),
            emitting: Mutex::new(()),
            emitted: AtomicU64::new(0),
        }
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> AuthState {
        lock(&self.current).state.clone()
    }

    /// Derive the next snapshot from the current one, store it and notify
    /// listeners. Returns the stored snapshot.
    ///
    /// Two invariants are enforced on every write:
    /// - `is_initialized` never reverts to false once set;
    /// - `error` is cleared whenever a user is present.
    pub fn update(&self, apply: impl FnOnce(&mut AuthState)) -> AuthState {
        let next = {
            let mut guard = lock(&self.current);
            let mut next = guard.state.clone();
            apply(&mut next);

            next.is_initialized |= guard.state.is_initialized;
            if next.user.is_some() {
                next.error = None;
            }

            if next == guard.state {
                return next;
            }
            guard.state = next.clone();
            guard.version += 1;
            next
        };

        self.publish();
        next
    }

    /// Deliver stored versions newer than the last one delivered.
    ///
    /// If another caller is already emitting (including a listener updating
    /// the store from inside an emission), that caller picks up the newer
    /// version once its current delivery finishes.
    fn publish(&self) {
        loop {
            let emitting = match self.emitting.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };

            loop {
                let (state, version) = {
                    let current = lock(&self.current);
                    (current.state.clone(), current.version)
                };
                if version <= self.emitted.load(Ordering::Acquire) {
                    break;
                }
                self.emitted.store(version, Ordering::Release);
                self.listeners.emit(&state);
            }
            drop(emitting);

            // A version stored after the check above may have found the
            // emitter busy; take over if nobody else has.
            if lock(&self.current).version <= self.emitted.load(Ordering::Acquire) {
                return;
            }
        }
    }

    /// Register a listener; it is called immediately with the current
    /// snapshot and then on every change.
    pub fn subscribe(&self, listener: impl Fn(&AuthState) + Send + Sync + 'static) -> Subscription {
        let listener: Arc<dyn Fn(&AuthState) + Send + Sync> = Arc::new(listener);
        let subscription = self.listeners.add(Arc::clone(&listener));

        let current = self.snapshot();
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&current))).is_err() {
            log::error!("Auth listener panicked during initial emission");
        }
        subscription
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
