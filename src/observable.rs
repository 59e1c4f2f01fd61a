//! Observable orchestrator fields
//!
//! Each unit of orchestrator state lives in an [`Observable`]: the current
//! snapshot is held under a mutex, `update` merges a partial change in
//! place, and the resulting snapshot is published synchronously to every
//! subscriber in subscription order. Subscribers get an explicit
//! [`SubscriptionId`] and unsubscribe explicitly, so nothing leaks
//! process-wide listener state.

use crate::error::WalletError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Snapshot of an asynchronously derived quantity
#[derive(Debug, Clone)]
pub struct LoadableValue<T> {
    pub value: Option<T>,
    pub loading: bool,
    pub error: Option<WalletError>,
}

impl<T> Default for LoadableValue<T> {
    fn default() -> Self {
        Self {
            value: None,
            loading: false,
            error: None,
        }
    }
}

impl<T> LoadableValue<T> {
    /// Reset to the initial empty state
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot of user input that additionally tracks validation.
///
/// `valid` stays `None` until the value has actually been validated at
/// least once; it is never inferred from the absence of an error.
#[derive(Debug, Clone)]
pub struct ValidatableValue<T> {
    pub value: Option<T>,
    pub valid: Option<bool>,
    pub loading: bool,
    pub error: Option<WalletError>,
}

impl<T> Default for ValidatableValue<T> {
    fn default() -> Self {
        Self {
            value: None,
            valid: None,
            loading: false,
            error: None,
        }
    }
}

impl<T> ValidatableValue<T> {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Handle returned by `subscribe`, used for explicit unsubscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// An ordered list of observers, notified synchronously
pub struct ObserverList<T> {
    listeners: Mutex<Vec<(SubscriptionId, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .expect("observer list lock poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns whether it was present
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().expect("observer list lock poisoned");
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Notify all listeners in subscription order. The lock is not held
    /// during callbacks, so listeners may subscribe or publish themselves.
    pub fn emit(&self, payload: &T) {
        let listeners: Vec<Listener<T>> = self
            .listeners
            .lock()
            .expect("observer list lock poisoned")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(payload);
        }
    }
}

/// A single observable unit of orchestrator state
pub struct Observable<S: Clone> {
    state: Mutex<S>,
    observers: ObserverList<S>,
}

impl<S: Clone + Default> Default for Observable<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: Clone> Observable<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: Mutex::new(initial),
            observers: ObserverList::new(),
        }
    }

    /// Current immutable snapshot
    pub fn get(&self) -> S {
        self.state.lock().expect("observable lock poisoned").clone()
    }

    /// Merge a partial change into the snapshot and publish the result.
    ///
    /// The closure mutates exactly the parts of the snapshot it cares
    /// about; everything else carries over. Returns the published snapshot.
    pub fn update(&self, merge: impl FnOnce(&mut S)) -> S {
        let snapshot = {
            let mut state = self.state.lock().expect("observable lock poisoned");
            merge(&mut state);
            state.clone()
        };
        self.observers.emit(&snapshot);
        snapshot
    }

    /// Replace the whole snapshot and publish it
    pub fn replace(&self, next: S) -> S {
        self.update(|state| *state = next)
    }

    pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> SubscriptionId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, WalletError};

    #[test]
    fn test_update_merges_partially() {
        let field: Observable<LoadableValue<String>> = Observable::default();

        field.update(|s| s.value = Some("10".to_string()));
        field.update(|s| s.loading = true);

        let snapshot = field.get();
        assert_eq!(snapshot.value.as_deref(), Some("10"));
        assert!(snapshot.loading);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_publishes_in_subscription_order() {
        let field: Observable<LoadableValue<u32>> = Observable::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        field.subscribe(move |_| first.lock().unwrap().push(1));
        let second = Arc::clone(&order);
        field.subscribe(move |_| second.lock().unwrap().push(2));

        field.update(|s| s.value = Some(7));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let field: Observable<LoadableValue<u32>> = Observable::default();
        let hits = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&hits);
        let id = field.subscribe(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        field.update(|s| s.value = Some(1));
        assert!(field.unsubscribe(id));
        assert!(!field.unsubscribe(id));
        field.update(|s| s.value = Some(2));

        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_validatable_defaults_to_unvalidated() {
        let field: Observable<ValidatableValue<String>> = Observable::default();
        let snapshot = field.get();
        assert!(snapshot.valid.is_none());

        field.update(|s| {
            s.value = Some("addr".to_string());
            s.error = Some(WalletError::new(ErrorCode::Unexpected, "boom"));
        });
        // an error alone never implies a validation verdict
        assert!(field.get().valid.is_none());
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let field: Observable<ValidatableValue<String>> = Observable::default();
        field.update(|s| {
            s.value = Some("x".to_string());
            s.valid = Some(true);
            s.loading = true;
        });
        field.update(|s| s.reset());

        let snapshot = field.get();
        assert!(snapshot.value.is_none());
        assert!(snapshot.valid.is_none());
        assert!(!snapshot.loading);
    }
}
