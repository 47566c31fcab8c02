//! Change notification bus.
//!
//! Presentation layers subscribe to the bus to learn when the set of
//! active connections changes. Delivery is synchronous, in registration
//! order, on whichever thread called [`ChangeBus::publish`]. Each listener
//! is isolated: an error or a panic in one listener is recorded as a
//! [`ListenerFailure`] and delivery continues with the next one.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use headwatch_types::ConnectionRecord;

use crate::error::BoxError;

/// Immutable view of the active connections at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSnapshot {
    /// Monotonically increasing change counter of the publishing tracker.
    pub revision: u64,
    /// Active connections ordered by connection time, then name.
    pub connections: Vec<ConnectionRecord>,
}

impl ActiveSnapshot {
    /// Names of the active devices, in snapshot order.
    pub fn device_names(&self) -> Vec<&str> {
        self.connections
            .iter()
            .map(|c| c.device_name.as_str())
            .collect()
    }

    /// Whether `device_name` is active in this snapshot.
    pub fn contains(&self, device_name: &str) -> bool {
        self.connections.iter().any(|c| c.device_name == device_name)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no device is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Result returned by listeners.
pub type ListenerResult = std::result::Result<(), BoxError>;

/// Receives active-set change notifications.
pub trait ChangeListener: Send + Sync {
    /// Called with the new active set after every change.
    fn on_active_devices_changed(&self, snapshot: &ActiveSnapshot) -> ListenerResult;

    /// Name used when reporting failures.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> ChangeListener for F
where
    F: Fn(&ActiveSnapshot) -> ListenerResult + Send + Sync,
{
    fn on_active_devices_changed(&self, snapshot: &ActiveSnapshot) -> ListenerResult {
        self(snapshot)
    }
}

/// Handle returned by [`ChangeBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a listener failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The listener returned an error.
    Error(String),
    /// The listener panicked.
    Panic(String),
}

/// One listener's failure during a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Subscription of the failing listener.
    pub subscription: SubscriptionId,
    /// Listener name.
    pub listener: String,
    /// What went wrong.
    pub kind: FailureKind,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Error(msg) => {
                write!(f, "listener '{}' {} failed: {}", self.listener, self.subscription, msg)
            }
            FailureKind::Panic(msg) => {
                write!(f, "listener '{}' {} panicked: {}", self.listener, self.subscription, msg)
            }
        }
    }
}

type Subscriber = (SubscriptionId, Arc<dyn ChangeListener>);

/// Registry of change listeners.
#[derive(Default)]
pub struct ChangeBus {
    listeners: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl ChangeBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It receives every later publish.
    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `snapshot` to every listener in registration order.
    ///
    /// The registry lock is released before any listener runs, so
    /// listeners may subscribe or unsubscribe from inside the callback;
    /// such changes apply from the next publish.
    pub fn publish(&self, snapshot: &ActiveSnapshot) -> Vec<ListenerFailure> {
        let listeners: Vec<Subscriber> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = Vec::new();
        for (id, listener) in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.on_active_devices_changed(snapshot)
            }));
            let kind = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => FailureKind::Error(err.to_string()),
                Err(payload) => FailureKind::Panic(panic_message(payload.as_ref())),
            };
            failures.push(ListenerFailure {
                subscription: id,
                listener: listener.name().to_string(),
                kind,
            });
        }
        failures
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
