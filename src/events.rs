//! Lifecycle event notifications
//!
//! The container reports every lifecycle transition to an optional
//! [`ServiceEventPublisher`]. It treats the publisher as an opaque sink: an
//! event bus, a metrics recorder or a plain closure all work.

use crate::{LifecycleState, ServiceKey};
use std::fmt;

/// Kind of lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    /// A registration was added
    Registered,
    /// `initialize_service` is about to run
    Initializing,
    /// The service reached `Ready`
    Ready,
    /// `shutdown_service` is about to run
    ShuttingDown,
    /// The service reached `Shutdown`
    Shutdown,
    /// Resolution failed
    Failed,
}

impl ServiceEventKind {
    /// Hierarchical event name, e.g. `Service.Ready`
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceEventKind::Registered => "Service.Registered",
            ServiceEventKind::Initializing => "Service.Initializing",
            ServiceEventKind::Ready => "Service.Ready",
            ServiceEventKind::ShuttingDown => "Service.ShuttingDown",
            ServiceEventKind::Shutdown => "Service.Shutdown",
            ServiceEventKind::Failed => "Service.Failed",
        }
    }
}

impl fmt::Display for ServiceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub key: ServiceKey,
    /// State the registration is in once the event fires
    pub state: LifecycleState,
}

impl ServiceEvent {
    #[inline]
    pub(crate) fn new(kind: ServiceEventKind, key: &ServiceKey, state: LifecycleState) -> Self {
        Self {
            kind,
            key: key.clone(),
            state,
        }
    }
}

/// Sink for lifecycle events.
///
/// Called synchronously on the thread driving the transition, outside any
/// registry borrow, so publishers may query the container.
///
/// # Examples
///
/// ```rust
/// use service_locator::{ServiceEvent, ServiceLocator};
/// use std::sync::Arc;
///
/// let locator = ServiceLocator::new();
/// locator.set_event_publisher(Some(Arc::new(|event: &ServiceEvent| {
///     println!("{} {}", event.kind, event.key);
/// })));
/// ```
pub trait ServiceEventPublisher: Send + Sync {
    fn publish(&self, event: &ServiceEvent);
}

impl<F> ServiceEventPublisher for F
where
    F: Fn(&ServiceEvent) + Send + Sync,
{
    #[inline]
    fn publish(&self, event: &ServiceEvent) {
        self(event)
    }
}
