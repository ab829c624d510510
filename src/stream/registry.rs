//! Subscriber registry and fan-out dispatch.
//!
//! Each channel owns one registry. Handlers are registered with
//! [`SubscriberRegistry::subscribe`] and deregistered through the returned
//! [`SubscriberHandle`]; dispatch runs over a snapshot of the registered set
//! so a handler can subscribe or revoke from inside its own invocation
//! without affecting the pass in flight.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::error;

use crate::stream::proto::Envelope;

type Handler = Arc<dyn Fn(&Envelope) + Send + Sync + 'static>;
type HandlerMap = Mutex<HashMap<u64, Handler>>;

/// Fan-out of decoded envelopes to zero or more handler callbacks.
#[derive(Default)]
pub struct SubscriberRegistry {
    handlers: Arc<HandlerMap>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler and returns its revocation capability.
    ///
    /// Logically distinct handlers are all invoked independently; there is
    /// no deduplication.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberHandle
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::new(handler));
        SubscriberHandle {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Invokes every currently registered handler with the envelope.
    ///
    /// The handler set is snapshotted at pass start and the lock is not held
    /// across invocations. A panicking handler is reported and the remaining
    /// handlers in the pass still run.
    pub fn dispatch(&self, envelope: &Envelope) {
        let snapshot: Vec<Handler> = self.lock().values().cloned().collect();
        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
                error!(event = "subscriber_panicked", "subscriber panicked during dispatch");
            }
        }
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Revocation capability returned by [`SubscriberRegistry::subscribe`].
///
/// Ownership of the handler is shared: dropping the handle does not
/// deregister it, and the registry keeps invoking the handler until
/// [`SubscriberHandle::revoke`] is called.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: u64,
    handlers: Weak<HandlerMap>,
}

impl SubscriberHandle {
    /// Deregisters the handler.
    ///
    /// Idempotent. Takes effect no later than the next dispatch pass; a
    /// snapshot already in flight still completes with the handler included.
    pub fn revoke(&self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::{SubscriberHandle, SubscriberRegistry};
    use crate::stream::proto::{AlertSeverity, Envelope};

    fn sample_envelope() -> Envelope {
        Envelope::Alert {
            severity: AlertSeverity::Info,
            title: "rebalance".to_string(),
            message: "range re-centered".to_string(),
            timestamp: "t1".to_string(),
        }
    }

    #[test]
    fn every_handler_receives_each_envelope_once() {
        let registry = SubscriberRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let _a = registry.subscribe({
            let first = Arc::clone(&first);
            move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            }
        });
        let _b = registry.subscribe({
            let second = Arc::clone(&second);
            move |_| {
                second.fetch_add(1, Ordering::SeqCst);
            }
        });

        registry.dispatch(&sample_envelope());
        registry.dispatch(&sample_envelope());

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn revoke_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = registry.subscribe({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        handle.revoke();
        handle.revoke();

        registry.dispatch(&sample_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_the_handle_does_not_revoke() {
        let registry = SubscriberRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = registry.subscribe({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        drop(handle);

        registry.dispatch(&sample_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_revoking_handler_finishes_its_own_pass() {
        let registry = SubscriberRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriberHandle>>> = Arc::new(Mutex::new(None));

        let handle = registry.subscribe({
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = slot.lock().expect("slot lock").as_ref() {
                    handle.revoke();
                }
            }
        });
        *slot.lock().expect("slot lock") = Some(handle);

        registry.dispatch(&sample_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "current pass completes");

        registry.dispatch(&sample_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "excluded from the next pass");
    }

    #[test]
    fn handler_subscribed_mid_pass_starts_next_pass() {
        let registry = Arc::new(SubscriberRegistry::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let _outer = registry.subscribe({
            let registry = Arc::clone(&registry);
            let late_calls = Arc::clone(&late_calls);
            let armed = AtomicUsize::new(0);
            move |_| {
                if armed.fetch_add(1, Ordering::SeqCst) == 0 {
                    let late_calls = Arc::clone(&late_calls);
                    let _ = registry.subscribe(move |_| {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                    });
                }
            }
        });

        registry.dispatch(&sample_envelope());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0, "not invoked in the same pass");

        registry.dispatch(&sample_envelope());
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_pass() {
        let registry = SubscriberRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _bad = registry.subscribe(|_| panic!("subscriber bug"));
        let _good = registry.subscribe({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        registry.dispatch(&sample_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Registry state survives the panic.
        registry.dispatch(&sample_envelope());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }
}
