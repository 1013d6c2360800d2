//! The service capability trait and its descriptors
//!
//! A registrable service is any `Send + Sync + 'static` type implementing
//! [`Service`]. Dependencies are declared at the class level through the
//! associated function [`Service::required_dependencies`], so the container
//! knows them before anything is constructed.

use crate::container::WeakServiceLocator;
use crate::{ServiceKey, ServiceLocator};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Object-safe access to `Any`, implemented for every `Send + Sync + 'static` type.
///
/// This is what lets an `Arc<dyn Service>` be downcast back to its concrete type.
pub trait AsAny: Any + Send + Sync {
    /// Borrow as `&dyn Any`
    fn as_any(&self) -> &dyn Any;

    /// Convert into a type-erased `Arc`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Capability interface every registrable service satisfies.
///
/// Services are shared as `Arc<dyn Service>` once ready, so all hooks take
/// `&self`; keep mutable state behind a lock or atomics.
///
/// # Examples
///
/// ```rust
/// use service_locator::{Service, ServiceInitParams, ServiceKey};
///
/// #[derive(Default)]
/// struct Inventory;
///
/// impl Service for Inventory {
///     fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
///         true
///     }
///
///     fn required_dependencies() -> Vec<ServiceKey> {
///         vec![ServiceKey::from_static("Service.Data")]
///     }
/// }
/// ```
pub trait Service: AsAny {
    /// Bring the service up. Returning `false` fails the registration.
    fn initialize_service(&self, params: &ServiceInitParams) -> bool;

    /// Tear the service down. `force` is set when consumers may still hold it.
    fn shutdown_service(&self, force: bool) {
        let _ = force;
    }

    /// Keys this service needs `Ready` before it can initialize.
    fn required_dependencies() -> Vec<ServiceKey>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Human-readable name for diagnostics
    fn service_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Service").field(&self.service_name()).finish()
    }
}

/// Lifecycle state of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Registered, nothing constructed yet
    #[default]
    Uninitialized,
    /// `initialize_service` is running
    Initializing,
    /// Constructed, dependencies ready, initialized
    Ready,
    /// `shutdown_service` is running
    Shutting,
    /// Torn down; terminal until reset or re-registration
    Shutdown,
    /// Resolution failed; terminal until reset or re-registration
    Failed,
}

impl LifecycleState {
    /// Whether the container may move a registration from `self` to `next`.
    ///
    /// Resets to `Uninitialized` from `Shutdown`/`Failed` are allowed here;
    /// `reset_all_services` forces every state back regardless.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Ready)
                | (Ready, Shutting)
                | (Initializing, Shutting)
                | (Shutting, Shutdown)
                | (Uninitialized | Initializing | Ready, Failed)
                | (Shutdown | Failed, Uninitialized)
        ) || (self == Failed && next == Failed)
    }

    /// `Shutdown` and `Failed` end the current generation
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Shutdown | LifecycleState::Failed)
    }

    /// Short name used in logs and the dependency graph
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "Uninitialized",
            LifecycleState::Initializing => "Initializing",
            LifecycleState::Ready => "Ready",
            LifecycleState::Shutting => "Shutting",
            LifecycleState::Shutdown => "Shutdown",
            LifecycleState::Failed => "Failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters handed to [`Service::initialize_service`]
#[derive(Clone, Default)]
pub struct ServiceInitParams {
    /// Keys that must be `Ready` first, on top of the class-declared ones
    pub required_services: BTreeSet<ServiceKey>,
    /// Auto-started services survive idle cleanup
    pub auto_start: bool,
    /// Opaque caller data
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
    locator: Option<WeakServiceLocator>,
}

impl ServiceInitParams {
    /// Empty parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required dependency
    pub fn with_dependency(mut self, key: ServiceKey) -> Self {
        self.required_services.insert(key);
        self
    }

    /// Add several required dependencies
    pub fn with_dependencies(mut self, keys: impl IntoIterator<Item = ServiceKey>) -> Self {
        self.required_services.extend(keys);
        self
    }

    /// Mark the service as auto-started
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Attach opaque data
    pub fn with_payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Borrow the payload as `P`
    pub fn payload<P: Any>(&self) -> Option<&P> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<P>())
    }

    /// The container that initialized this service, if it is still alive.
    ///
    /// Set on every initialization, before the injection callback runs.
    pub fn locator(&self) -> Option<ServiceLocator> {
        self.locator.as_ref().and_then(WeakServiceLocator::upgrade)
    }

    #[inline]
    pub(crate) fn set_locator(&mut self, locator: WeakServiceLocator) {
        self.locator = Some(locator);
    }
}

impl fmt::Debug for ServiceInitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInitParams")
            .field("required_services", &self.required_services)
            .field("auto_start", &self.auto_start)
            .field("has_payload", &self.payload.is_some())
            .field("has_locator", &self.locator.is_some())
            .finish()
    }
}

/// Constructor stored in a class descriptor
pub type ConstructFn = fn() -> Option<Arc<dyn Service>>;

/// Class-level dependency declaration
pub type DependenciesFn = fn() -> Vec<ServiceKey>;

/// Class descriptor: how to build a service and what it depends on.
///
/// The dependency list is a pure data lookup; no instance is needed.
#[derive(Clone, Copy)]
pub struct ServiceClass {
    name: &'static str,
    construct: ConstructFn,
    dependencies: DependenciesFn,
}

impl ServiceClass {
    /// Descriptor for a default-constructible service
    ///
    /// # Examples
    ///
    /// ```rust
    /// use service_locator::{Service, ServiceClass, ServiceInitParams};
    ///
    /// #[derive(Default)]
    /// struct Audio;
    ///
    /// impl Service for Audio {
    ///     fn initialize_service(&self, _: &ServiceInitParams) -> bool { true }
    /// }
    ///
    /// let class = ServiceClass::of::<Audio>();
    /// assert!(class.name().ends_with("Audio"));
    /// assert!(class.declared_dependencies().is_empty());
    /// ```
    pub fn of<T: Service + Default>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            construct: construct_default::<T>,
            dependencies: T::required_dependencies,
        }
    }

    /// Hand-written descriptor, for services that are not `Default`
    pub fn new(name: &'static str, construct: ConstructFn, dependencies: DependenciesFn) -> Self {
        Self {
            name,
            construct,
            dependencies,
        }
    }

    /// Class name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build a fresh instance
    #[inline]
    pub fn construct(&self) -> Option<Arc<dyn Service>> {
        (self.construct)()
    }

    /// Class-declared dependencies
    #[inline]
    pub fn declared_dependencies(&self) -> Vec<ServiceKey> {
        (self.dependencies)()
    }

    #[inline]
    pub(crate) fn dependencies_fn(&self) -> DependenciesFn {
        self.dependencies
    }
}

fn construct_default<T: Service + Default>() -> Option<Arc<dyn Service>> {
    Some(Arc::new(T::default()) as Arc<dyn Service>)
}

impl fmt::Debug for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClass").field("name", &self.name).finish()
    }
}
