//! Process-wide typed publish/subscribe
//!
//! Delivery is synchronous and in registration order. A listener is called at
//! most once per emitted event, and `once` listeners are removed under the same
//! lock that selects them, so two concurrent emits can never both deliver to
//! one. [`EventWaiter`] is the one-shot form: it resolves on the first matching
//! event and unregisters itself when it resolves or is dropped.

use alloy::primitives::{Address, B256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::WalletError;
use crate::models::ReceiptSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TransactionBuilt,
    TransactionConfirmed,
    TransactionCompleted,
    TransactionTimedOut,
    SubmissionCancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
    /// A multisig envelope was proposed with this hash
    TransactionBuilt { hash: B256 },
    /// An owner's confirmation was recorded
    TransactionConfirmed { hash: B256, signer: Address },
    /// A submitted transaction was mined
    TransactionCompleted { receipt: ReceiptSummary },
    /// The receipt watcher gave up on a submitted transaction
    TransactionTimedOut { hash: B256 },
    /// Rejection from a device or teardown of the requesting context.
    /// `id: None` cancels every in-flight submission.
    SubmissionCancelled { id: Option<Uuid>, reason: String },
}

impl WalletEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WalletEvent::TransactionBuilt { .. } => EventKind::TransactionBuilt,
            WalletEvent::TransactionConfirmed { .. } => EventKind::TransactionConfirmed,
            WalletEvent::TransactionCompleted { .. } => EventKind::TransactionCompleted,
            WalletEvent::TransactionTimedOut { .. } => EventKind::TransactionTimedOut,
            WalletEvent::SubmissionCancelled { .. } => EventKind::SubmissionCancelled,
        }
    }
}

pub type Handler = Arc<dyn Fn(&WalletEvent) + Send + Sync>;
type Filter = Arc<dyn Fn(&WalletEvent) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    handler: Handler,
    filter: Option<Filter>,
    once: bool,
}

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Listener>>> {
        // A panicking handler never runs under this lock, so poison carries no torn state
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(
        &self,
        kind: EventKind,
        handler: Handler,
        filter: Option<Filter>,
        once: bool,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners().entry(kind).or_default().push(Listener {
            id,
            handler,
            filter,
            once,
        });
        id
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), None, false)
    }

    /// Register a handler that is removed after its first delivery.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), None, true)
    }

    /// Returns whether a listener was removed.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Deliver `event` to every matching listener. Returns the delivery count.
    pub fn emit(&self, event: WalletEvent) -> usize {
        let kind = event.kind();
        let selected: Vec<Handler> = {
            let mut listeners = self.listeners();
            let Some(list) = listeners.get_mut(&kind) else {
                tracing::trace!("No listeners for {:?}", kind);
                return 0;
            };
            let mut selected = Vec::new();
            list.retain(|listener| {
                let matched = listener.filter.as_ref().is_none_or(|f| f(&event));
                if matched {
                    selected.push(listener.handler.clone());
                }
                !(matched && listener.once)
            });
            if list.is_empty() {
                listeners.remove(&kind);
            }
            selected
        };

        for handler in &selected {
            handler(&event);
        }
        tracing::debug!("Delivered {:?} to {} listener(s)", kind, selected.len());
        selected.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners().get(&kind).map_or(0, Vec::len)
    }

    /// One-shot wait for the first event of `kind` accepted by `predicate`.
    pub fn wait_for<P>(self: &Arc<Self>, kind: EventKind, predicate: P) -> EventWaiter
    where
        P: Fn(&WalletEvent) -> bool + Send + Sync + 'static,
    {
        self.wait_for_any(&[kind], predicate)
    }

    /// One-shot wait across several kinds. The first accepted event wins and
    /// every registration is removed when the waiter resolves or is dropped.
    pub fn wait_for_any<P>(self: &Arc<Self>, kinds: &[EventKind], predicate: P) -> EventWaiter
    where
        P: Fn(&WalletEvent) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let predicate: Filter = Arc::new(predicate);
        let registrations = kinds
            .iter()
            .map(|&kind| {
                let slot = slot.clone();
                let handler: Handler = Arc::new(move |event: &WalletEvent| {
                    let sender = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
                    if let Some(sender) = sender {
                        let _ = sender.send(event.clone());
                    }
                });
                (kind, self.register(kind, handler, Some(predicate.clone()), true))
            })
            .collect();
        EventWaiter {
            bus: Arc::downgrade(self),
            registrations,
            rx: Some(rx),
        }
    }

    /// Wait for the terminal event of transaction `hash`: its receipt, or the
    /// watcher giving up on it.
    pub fn completion(self: &Arc<Self>, hash: B256) -> EventWaiter {
        self.wait_for_any(
            &[EventKind::TransactionCompleted, EventKind::TransactionTimedOut],
            move |event| match event {
                WalletEvent::TransactionCompleted { receipt } => receipt.tx_hash == hash,
                WalletEvent::TransactionTimedOut { hash: target } => *target == hash,
                _ => false,
            },
        )
    }

    /// Wait for a cancellation addressed to submission `id` (or to everything).
    pub fn cancellation(self: &Arc<Self>, id: Uuid) -> EventWaiter {
        self.wait_for(EventKind::SubmissionCancelled, move |event| {
            matches!(event, WalletEvent::SubmissionCancelled { id: target, .. } if target.is_none_or(|t| t == id))
        })
    }
}

/// Pending one-shot subscription created by [`EventBus::wait_for`].
pub struct EventWaiter {
    bus: Weak<EventBus>,
    registrations: Vec<(EventKind, ListenerId)>,
    rx: Option<oneshot::Receiver<WalletEvent>>,
}

impl EventWaiter {
    pub async fn recv(mut self) -> Result<WalletEvent, WalletError> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| WalletError::DefaultFailed("event waiter already consumed".into()))?;
        rx.await
            .map_err(|_| WalletError::DefaultFailed("event bus dropped before delivery".into()))
    }
}

impl Drop for EventWaiter {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            for (kind, id) in &self.registrations {
                bus.off(*kind, *id);
            }
        }
    }
}
