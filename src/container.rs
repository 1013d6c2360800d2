//! Dependency-ordered service container
//!
//! The `ServiceLocator` registers services, resolves their dependencies,
//! constructs and initializes them in dependency order, tracks each one's
//! lifecycle state and tears them down in reverse order.
//!
//! All registry mutation, construction and shutdown run on the calling thread
//! under one container-wide reentrant lock. The registry sits in a `RefCell`
//! inside that lock and is never borrowed while user code runs (factories,
//! injection callbacks, `initialize_service`, `shutdown_service`, event
//! publishers), so user code may call back into the container.

use crate::config::LocatorConfig;
use crate::events::{ServiceEvent, ServiceEventKind, ServiceEventPublisher};
use crate::factory::{InjectionFn, ServiceSource};
use crate::graph::{find_cycle, topological_order};
use crate::storage::{LocatorStats, ReadyServices, Registration, Registry};
use crate::{
    LifecycleState, Result, Service, ServiceClass, ServiceError, ServiceInitParams, ServiceKey,
};
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

#[cfg(feature = "logging")]
use tracing::{debug, error, info, trace, warn};

struct LocatorInner {
    /// Container-wide lock; reentrant so recursive resolution and callbacks
    /// on the owning thread can take it again
    registry: ReentrantMutex<RefCell<Registry>>,
    /// Mirror of the `Ready` services, readable without the lock
    ready: ReadyServices,
    publisher: RwLock<Option<Arc<dyn ServiceEventPublisher>>>,
    config: LocatorConfig,
    detailed_logging: AtomicBool,
}

/// Dependency-ordered service container.
///
/// Cloning is cheap and yields another handle to the same container.
///
/// # Examples
///
/// ```rust
/// use service_locator::{Service, ServiceClass, ServiceInitParams, ServiceKey, ServiceLocator};
///
/// #[derive(Default)]
/// struct Database;
///
/// impl Service for Database {
///     fn initialize_service(&self, _: &ServiceInitParams) -> bool { true }
/// }
///
/// #[derive(Default)]
/// struct Inventory;
///
/// impl Service for Inventory {
///     fn initialize_service(&self, _: &ServiceInitParams) -> bool { true }
///
///     fn required_dependencies() -> Vec<ServiceKey> {
///         vec![ServiceKey::from_static("Service.Database")]
///     }
/// }
///
/// let locator = ServiceLocator::new();
/// locator.register::<Database>("Service.Database", ServiceInitParams::new()).unwrap();
/// locator.register::<Inventory>("Service.Inventory", ServiceInitParams::new()).unwrap();
///
/// // Resolving the inventory brings its database up first
/// let inventory = locator.get_service_as::<Inventory>("Service.Inventory").unwrap();
/// assert!(locator.is_ready("Service.Database"));
/// ```
#[derive(Clone)]
pub struct ServiceLocator {
    inner: Arc<LocatorInner>,
}

/// Non-owning handle to a [`ServiceLocator`]
#[derive(Clone)]
pub struct WeakServiceLocator(Weak<LocatorInner>);

impl WeakServiceLocator {
    /// Get the container back if it is still alive
    #[inline]
    pub fn upgrade(&self) -> Option<ServiceLocator> {
        self.0.upgrade().map(|inner| ServiceLocator { inner })
    }
}

impl fmt::Debug for WeakServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakServiceLocator")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

impl ServiceLocator {
    /// Create an empty container with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(LocatorConfig::default())
    }

    /// Create an empty container.
    pub fn with_config(config: LocatorConfig) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "service_locator",
            capacity = config.initial_capacity,
            max_dependency_depth = config.max_dependency_depth,
            "Creating service locator"
        );

        Self {
            inner: Arc::new(LocatorInner {
                registry: ReentrantMutex::new(RefCell::new(Registry::with_capacity(
                    config.initial_capacity,
                ))),
                ready: ReadyServices::with_capacity(config.initial_capacity),
                publisher: RwLock::new(None),
                detailed_logging: AtomicBool::new(config.detailed_logging),
                config,
            }),
        }
    }

    /// Settings this container was built with
    #[inline]
    pub fn config(&self) -> &LocatorConfig {
        &self.inner.config
    }

    /// Non-owning handle, for back-references that must not keep the container alive
    #[inline]
    pub fn downgrade(&self) -> WeakServiceLocator {
        WeakServiceLocator(Arc::downgrade(&self.inner))
    }

    /// Whether two handles point at the same container
    #[inline]
    pub fn same_container(&self, other: &ServiceLocator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a default-constructible service type.
    ///
    /// Shorthand for `register_class(key, ServiceClass::of::<T>(), params)`.
    #[inline]
    pub fn register<T: Service + Default>(
        &self,
        key: impl AsRef<str>,
        params: ServiceInitParams,
    ) -> Result<()> {
        self.register_class(key, ServiceClass::of::<T>(), params)
    }

    /// Register a service by class descriptor. The instance is built on first resolve.
    ///
    /// Fails without touching the registry if the key is invalid or taken.
    pub fn register_class(
        &self,
        key: impl AsRef<str>,
        class: ServiceClass,
        params: ServiceInitParams,
    ) -> Result<()> {
        self.register_source(key.as_ref(), ServiceSource::class(class), params, None)
    }

    /// Register a service by class descriptor with an injection callback.
    ///
    /// The callback runs once per initialization, after construction and
    /// before `initialize_service`. Returning `Err` fails the service.
    pub fn register_class_with_injection<F>(
        &self,
        key: impl AsRef<str>,
        class: ServiceClass,
        params: ServiceInitParams,
        injection: F,
    ) -> Result<()>
    where
        F: Fn(&Arc<dyn Service>, &ServiceLocator) -> std::result::Result<(), String>
            + Send
            + Sync
            + 'static,
    {
        let injection: InjectionFn = Arc::new(injection);
        self.register_source(
            key.as_ref(),
            ServiceSource::class(class),
            params,
            Some(injection),
        )
    }

    /// Register an already constructed instance.
    ///
    /// The instance still goes through dependency resolution and
    /// `initialize_service` on first resolve.
    pub fn register_instance<T: Service>(
        &self,
        key: impl AsRef<str>,
        instance: Arc<T>,
        params: ServiceInitParams,
    ) -> Result<()> {
        self.register_source(key.as_ref(), ServiceSource::instance(instance), params, None)
    }

    /// Register a factory closure. Returning `None` fails the service.
    pub fn register_factory<T, F>(
        &self,
        key: impl AsRef<str>,
        factory: F,
        params: ServiceInitParams,
    ) -> Result<()>
    where
        T: Service,
        F: Fn(&ServiceLocator) -> Option<T> + Send + Sync + 'static,
    {
        self.register_source(key.as_ref(), ServiceSource::factory(factory), params, None)
    }

    fn register_source(
        &self,
        key: &str,
        source: ServiceSource,
        params: ServiceInitParams,
        injection: Option<InjectionFn>,
    ) -> Result<()> {
        let key = match ServiceKey::new(key) {
            Ok(key) => key,
            Err(err) => {
                #[cfg(feature = "logging")]
                error!(
                    target: "service_locator",
                    source = source.kind(),
                    error = %err,
                    "Rejected registration with invalid key"
                );
                return Err(err);
            }
        };

        let guard = self.inner.registry.lock();
        {
            let mut registry = guard.borrow_mut();
            if registry.contains(&key) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "service_locator",
                    service = %key,
                    "Service already registered, keeping existing registration"
                );
                return Err(ServiceError::AlreadyRegistered { key });
            }

            #[cfg(feature = "logging")]
            info!(
                target: "service_locator",
                service = %key,
                source = source.kind(),
                service_type = source.type_name(),
                dependencies = params.required_services.len(),
                auto_start = params.auto_start,
                "Registered service"
            );

            registry.insert(Registration::new(key.clone(), source, params, injection));
        }

        self.publish(
            ServiceEventKind::Registered,
            &key,
            LifecycleState::Uninitialized,
        );
        Ok(())
    }

    /// Remove a registration.
    ///
    /// A `Ready` or `Initializing` service is shut down first; if that is
    /// refused because consumers still hold references and `force_shutdown`
    /// is false, the registration is left untouched.
    pub fn unregister(&self, key: &str, force_shutdown: bool) -> Result<()> {
        let guard = self.inner.registry.lock();
        let cell: &RefCell<Registry> = &guard;
        let key = self.registered_key(cell, key)?;

        let state = cell.borrow().get(&key).map(|r| r.state);
        if matches!(
            state,
            Some(LifecycleState::Ready | LifecycleState::Initializing)
        ) {
            self.shutdown_registered(cell, &key, force_shutdown)?;
        }

        cell.borrow_mut().remove(&key);
        self.inner.ready.remove(&key);

        #[cfg(feature = "logging")]
        info!(target: "service_locator", service = %key, "Unregistered service");

        Ok(())
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Resolve a service, constructing and initializing it and its
    /// dependencies if needed, and take a reference on it.
    ///
    /// Blocks for the whole transitive construction. Each successful call
    /// increments the service's reference count by one.
    pub fn get_service(&self, key: &str) -> Result<Arc<dyn Service>> {
        let guard = self.inner.registry.lock();
        let cell: &RefCell<Registry> = &guard;
        let key = match self.registered_key(cell, key) {
            Ok(key) => key,
            Err(err) => {
                #[cfg(feature = "logging")]
                warn!(target: "service_locator", error = %err, "get_service on unknown key");
                return Err(err);
            }
        };

        let instance = self.resolve(cell, &key)?;

        if let Some(entry) = cell.borrow_mut().get_mut(&key) {
            entry.reference_count = entry.reference_count.saturating_add(1);

            #[cfg(feature = "logging")]
            trace!(
                target: "service_locator",
                service = %key,
                references = entry.reference_count,
                "Service reference taken"
            );
        }

        Ok(instance)
    }

    /// [`get_service`](Self::get_service) downcast to the concrete type.
    ///
    /// On a type mismatch the reference just taken is released again.
    pub fn get_service_as<T: Service>(&self, key: &str) -> Result<Arc<T>> {
        let service = self.get_service(key)?;
        match service.into_any().downcast::<T>() {
            Ok(service) => Ok(service),
            Err(_) => {
                let key = ServiceKey::new(key)?;
                let _ = self.release_service(&key);
                Err(ServiceError::type_mismatch::<T>(&key))
            }
        }
    }

    /// The instance if the service is already `Ready`.
    ///
    /// Never constructs, never takes a reference and never waits on a
    /// construction running on another thread.
    #[inline]
    pub fn try_get_service(&self, key: &str) -> Option<Arc<dyn Service>> {
        self.inner.ready.get(key)
    }

    /// [`try_get_service`](Self::try_get_service) downcast to the concrete type
    pub fn try_get_service_as<T: Service>(&self, key: &str) -> Option<Arc<T>> {
        self.try_get_service(key)
            .and_then(|service| service.into_any().downcast::<T>().ok())
    }

    /// Give back a reference taken by [`get_service`](Self::get_service).
    ///
    /// Returns the remaining count. The count never drops below zero.
    pub fn release_service(&self, key: &str) -> Result<u32> {
        let guard = self.inner.registry.lock();
        let cell: &RefCell<Registry> = &guard;
        let key = self.registered_key(cell, key)?;

        let mut registry = cell.borrow_mut();
        let entry = registry
            .get_mut(&key)
            .ok_or_else(|| ServiceError::NotRegistered { key: key.clone() })?;
        entry.reference_count = entry.reference_count.saturating_sub(1);

        #[cfg(feature = "logging")]
        trace!(
            target: "service_locator",
            service = %key,
            references = entry.reference_count,
            "Service reference released"
        );

        Ok(entry.reference_count)
    }

    /// Whether a registration exists for `key`
    pub fn is_registered(&self, key: &str) -> bool {
        let guard = self.inner.registry.lock();
        let registered = guard.borrow().contains(key);
        registered
    }

    /// Whether the service is `Ready`. Does not wait on the container lock.
    #[inline]
    pub fn is_ready(&self, key: &str) -> bool {
        self.inner.ready.contains(key)
    }

    /// Current lifecycle state, or `None` if not registered
    pub fn get_state(&self, key: &str) -> Option<LifecycleState> {
        let guard = self.inner.registry.lock();
        let state = guard.borrow().get(key).map(|r| r.state);
        state
    }

    /// Outstanding references, or `None` if not registered
    pub fn reference_count(&self, key: &str) -> Option<u32> {
        let guard = self.inner.registry.lock();
        let count = guard.borrow().get(key).map(|r| r.reference_count);
        count
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        let guard = self.inner.registry.lock();
        let len = guard.borrow().len();
        len
    }

    /// Whether nothing is registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Shut one service down.
    ///
    /// A no-op for services that are `Uninitialized`, `Shutting`, `Shutdown`
    /// or `Failed`. Refused while references are outstanding unless `force`.
    pub fn shutdown_service(&self, key: &str, force: bool) -> Result<()> {
        let guard = self.inner.registry.lock();
        let cell: &RefCell<Registry> = &guard;
        let key = self.registered_key(cell, key)?;
        self.shutdown_registered(cell, &key, force)
    }

    /// Initialize every `Uninitialized` service in dependency order.
    ///
    /// Not transactional: a failure leaves earlier services as they are and
    /// the batch moves on. Returns how many services ended up `Ready`.
    pub fn initialize_all_services(&self) -> usize {
        let guard = self.inner.registry.lock();
        let cell: &RefCell<Registry> = &guard;

        let order = {
            let registry = cell.borrow();
            let pending = registry.keys_where(|r| r.state == LifecycleState::Uninitialized);
            topological_order(&pending, &*registry)
        };

        let initialized = order
            .iter()
            .filter(|key| self.resolve(cell, key).is_ok())
            .count();

        #[cfg(feature = "logging")]
        info!(
            target: "service_locator",
            pending = order.len(),
            initialized,
            "Initialized pending services"
        );

        initialized
    }

    /// Shut down every `Ready` service, dependents before their dependencies.
    ///
    /// Services with outstanding references are skipped unless `force`.
    /// Returns how many services were shut down.
    pub fn shutdown_all_services(&self, force: bool) -> usize {
        let guard = self.inner.registry.lock();
        let cell: &RefCell<Registry> = &guard;

        let order = {
            let registry = cell.borrow();
            let active = registry.keys_where(|r| r.state == LifecycleState::Ready);
            topological_order(&active, &*registry)
        };

        let shut_down = order
            .iter()
            .rev()
            .filter(|key| self.shutdown_registered(cell, key, force).is_ok())
            .count();

        #[cfg(feature = "logging")]
        info!(
            target: "service_locator",
            active = order.len(),
            shut_down,
            force,
            "Shut down active services"
        );

        shut_down
    }

    /// Put every registration back to `Uninitialized`.
    ///
    /// Drops owned instances and clears reference counts but keeps the
    /// registrations, so the same classes and factories build fresh instances
    /// on the next resolve. Instances are not shut down.
    pub fn reset_all_services(&self) {
        let guard = self.inner.registry.lock();
        {
            let mut registry = guard.borrow_mut();
            for entry in registry.iter_mut() {
                entry.reset();
            }
            registry.clear_resolving();
        }
        self.inner.ready.clear();

        #[cfg(feature = "logging")]
        info!(
            target: "service_locator",
            "All services reset to Uninitialized"
        );
    }

    /// Shut down and delete idle services.
    ///
    /// Every `Ready` service with no outstanding references and `auto_start`
    /// unset is shut down and its registration removed. Returns the number
    /// removed.
    pub fn cleanup_unused_services(&self) -> usize {
        let guard = self.inner.registry.lock();
        let cell: &RefCell<Registry> = &guard;

        let idle = cell.borrow().keys_where(|r| {
            r.state == LifecycleState::Ready && r.reference_count == 0 && !r.init_params.auto_start
        });

        let mut removed = 0;
        for key in &idle {
            if self.shutdown_registered(cell, key, false).is_ok() {
                cell.borrow_mut().remove(key);
                self.inner.ready.remove(key);
                removed += 1;
            }
        }

        #[cfg(feature = "logging")]
        if removed > 0 {
            info!(target: "service_locator", removed, "Removed unused services");
        }

        removed
    }

    /// Tear the container down: shut down what can be shut down without
    /// force, then drop every registration.
    pub fn deinitialize(&self) {
        #[cfg(feature = "logging")]
        info!(target: "service_locator", "Deinitializing service locator");

        let guard = self.inner.registry.lock();
        self.shutdown_all_services(false);
        guard.borrow_mut().clear();
        self.inner.ready.clear();
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Human-readable dependency graph with states and reference counts
    pub fn build_dependency_graph(&self) -> String {
        let guard = self.inner.registry.lock();
        let registry = guard.borrow();

        let mut out = String::from("Service Dependency Graph\n");
        for entry in registry.ordered() {
            let _ = writeln!(
                out,
                "- {} [{}] refs={} source={} age={:.1}s",
                entry.key,
                entry.state,
                entry.reference_count,
                entry.source.kind(),
                entry.age().as_secs_f64()
            );
            for dependency in entry.dependencies() {
                let missing = if registry.contains(&dependency) {
                    ""
                } else {
                    " (missing)"
                };
                let _ = writeln!(out, "    -> {dependency}{missing}");
            }
        }
        out
    }

    /// Check every registration without constructing anything.
    ///
    /// Reports failed services, dependency cycles reachable from each
    /// registration and dependencies with no registration. An empty list
    /// means the container is consistent.
    pub fn validate_all_services(&self) -> Vec<ServiceError> {
        let guard = self.inner.registry.lock();
        let registry = guard.borrow();

        let mut errors = Vec::new();
        for entry in registry.ordered() {
            if entry.state == LifecycleState::Failed {
                errors.push(ServiceError::ServiceFailed {
                    key: entry.key.clone(),
                });
            }

            if let Some(path) = find_cycle(&entry.key, &*registry) {
                errors.push(ServiceError::CircularDependency {
                    key: entry.key.clone(),
                    path,
                });
            }

            for dependency in entry.dependencies() {
                if !registry.contains(&dependency) {
                    errors.push(ServiceError::MissingDependency {
                        key: entry.key.clone(),
                        dependency,
                    });
                }
            }
        }

        #[cfg(feature = "logging")]
        if !errors.is_empty() {
            warn!(
                target: "service_locator",
                errors = errors.len(),
                "Service validation found problems"
            );
        }

        errors
    }

    /// Registered keys in registration order
    pub fn get_registered_services(&self) -> Vec<ServiceKey> {
        let guard = self.inner.registry.lock();
        let keys = guard.borrow().keys_where(|_| true);
        keys
    }

    /// Snapshot of the running counters
    pub fn stats(&self) -> LocatorStats {
        let guard = self.inner.registry.lock();
        let stats = guard.borrow().stats;
        stats
    }

    /// Log every lifecycle event at `info` instead of `trace`
    #[inline]
    pub fn set_detailed_logging(&self, enable: bool) {
        self.inner.detailed_logging.store(enable, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_detailed_logging(&self) -> bool {
        self.inner.detailed_logging.load(Ordering::Relaxed)
    }

    /// Install or remove the lifecycle event sink
    pub fn set_event_publisher(&self, publisher: Option<Arc<dyn ServiceEventPublisher>>) {
        *self.inner.publisher.write() = publisher;
    }

    // =========================================================================
    // Resolver internals (container lock held)
    // =========================================================================

    /// Registered key for `key`, or the reason there is none
    fn registered_key(&self, cell: &RefCell<Registry>, key: &str) -> Result<ServiceKey> {
        if let Some(entry) = cell.borrow().get(key) {
            return Ok(entry.key.clone());
        }
        Err(ServiceError::NotRegistered {
            key: ServiceKey::new(key)?,
        })
    }

    /// Bring `key` and its dependencies to `Ready`. Takes no reference.
    fn resolve(&self, cell: &RefCell<Registry>, key: &ServiceKey) -> Result<Arc<dyn Service>> {
        let dependencies = {
            let mut registry = cell.borrow_mut();
            let depth = registry.resolution_depth();
            let cycle = registry
                .is_resolving(key)
                .then(|| registry.resolution_path(key));

            let entry = registry
                .get_mut(key)
                .ok_or_else(|| ServiceError::NotRegistered { key: key.clone() })?;

            if let (LifecycleState::Ready, Some(instance)) = (entry.state, &entry.instance) {
                return Ok(Arc::clone(instance));
            }

            if let Some(path) = cycle {
                // Leave the key on the chain; the frame that pushed it pops it
                drop(registry);
                return self.mark_failed(
                    cell,
                    key,
                    ServiceError::CircularDependency {
                        key: key.clone(),
                        path,
                    },
                );
            }

            if entry.state.is_terminal() {
                #[cfg(feature = "logging")]
                debug!(
                    target: "service_locator",
                    service = %key,
                    state = %entry.state,
                    "Service not retried until reset"
                );

                return Err(ServiceError::Unavailable {
                    key: key.clone(),
                    state: entry.state,
                });
            }

            if entry.state != LifecycleState::Uninitialized {
                return Err(ServiceError::Unavailable {
                    key: key.clone(),
                    state: entry.state,
                });
            }

            if depth >= self.inner.config.max_dependency_depth {
                drop(registry);
                return self.mark_failed(
                    cell,
                    key,
                    ServiceError::DepthExceeded {
                        key: key.clone(),
                        depth,
                    },
                );
            }

            let dependencies = entry.dependencies();
            registry.begin_resolving(key);

            #[cfg(feature = "logging")]
            debug!(
                target: "service_locator",
                service = %key,
                depth,
                dependencies = dependencies.len(),
                "Resolving service"
            );

            dependencies
        };

        for dependency in &dependencies {
            if !cell.borrow().contains(dependency) {
                return self.fail(
                    cell,
                    key,
                    ServiceError::MissingDependency {
                        key: key.clone(),
                        dependency: dependency.clone(),
                    },
                );
            }

            if let Err(_cause) = self.resolve(cell, dependency) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "service_locator",
                    service = %key,
                    dependency = %dependency,
                    cause = %_cause,
                    "Dependency resolution failed"
                );

                return self.fail(
                    cell,
                    key,
                    ServiceError::DependencyFailed {
                        key: key.clone(),
                        dependency: dependency.clone(),
                    },
                );
            }
        }

        let started = Instant::now();

        let snapshot = cell
            .borrow()
            .get(key)
            .map(|entry| (entry.instance.clone(), entry.source.clone()));
        let Some((existing, source)) = snapshot else {
            return self.vanished(cell, key);
        };

        let instance = match existing {
            Some(instance) => instance,
            None => {
                let Some(instance) = source.create_instance(self) else {
                    return self.fail(cell, key, ServiceError::InvalidInstance { key: key.clone() });
                };

                let mut registry = cell.borrow_mut();
                registry.stats.services_created += 1;
                match registry.get_mut(key) {
                    Some(entry) => entry.instance = Some(Arc::clone(&instance)),
                    None => {
                        drop(registry);
                        return self.vanished(cell, key);
                    }
                }
                instance
            }
        };

        // Injection point A: the back-reference is always recorded
        let injection = cell.borrow_mut().get_mut(key).map(|entry| {
            entry.init_params.set_locator(self.downgrade());
            entry.injection.clone()
        });
        let Some(injection) = injection else {
            return self.vanished(cell, key);
        };

        // Injection point B
        if let Some(inject) = injection {
            #[cfg(feature = "logging")]
            trace!(target: "service_locator", service = %key, "Running injection callback");

            if let Err(reason) = inject(&instance, self) {
                return self.fail(cell, key, ServiceError::injection_failure(key, reason));
            }
        }

        let params = {
            let mut registry = cell.borrow_mut();
            let Some(entry) = registry.get_mut(key) else {
                drop(registry);
                return self.vanished(cell, key);
            };
            if entry.state != LifecycleState::Uninitialized {
                let state = entry.state;
                registry.end_resolving(key);
                return Err(ServiceError::Unavailable {
                    key: key.clone(),
                    state,
                });
            }
            entry.set_state(LifecycleState::Initializing);
            entry.init_params.clone()
        };

        self.publish(
            ServiceEventKind::Initializing,
            key,
            LifecycleState::Initializing,
        );

        if !instance.initialize_service(&params) {
            return self.fail(
                cell,
                key,
                ServiceError::UserInitializationFailure { key: key.clone() },
            );
        }

        let elapsed = started.elapsed();
        {
            let mut registry = cell.borrow_mut();
            let Some(entry) = registry.get_mut(key) else {
                drop(registry);
                return self.vanished(cell, key);
            };
            if entry.state != LifecycleState::Initializing {
                // Failed or shut down re-entrantly while initializing
                let state = entry.state;
                registry.end_resolving(key);
                return Err(ServiceError::Unavailable {
                    key: key.clone(),
                    state,
                });
            }
            entry.set_state(LifecycleState::Ready);
            registry.end_resolving(key);
            registry.stats.services_initialized += 1;
            registry.stats.total_init_time += elapsed;
        }

        self.inner.ready.insert(key.clone(), Arc::clone(&instance));

        #[cfg(feature = "logging")]
        info!(
            target: "service_locator",
            service = %key,
            service_type = instance.service_name(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Service initialized"
        );

        self.publish(ServiceEventKind::Ready, key, LifecycleState::Ready);
        Ok(instance)
    }

    /// Pop `key` off the resolution chain, then mark it failed
    fn fail(
        &self,
        cell: &RefCell<Registry>,
        key: &ServiceKey,
        error: ServiceError,
    ) -> Result<Arc<dyn Service>> {
        cell.borrow_mut().end_resolving(key);
        self.mark_failed(cell, key, error)
    }

    /// Move `key` to `Failed`, count, log and notify
    fn mark_failed(
        &self,
        cell: &RefCell<Registry>,
        key: &ServiceKey,
        error: ServiceError,
    ) -> Result<Arc<dyn Service>> {
        let failed = {
            let mut registry = cell.borrow_mut();
            registry.stats.failures += 1;
            match registry.get_mut(key) {
                Some(entry) if entry.state.can_transition_to(LifecycleState::Failed) => {
                    entry.set_state(LifecycleState::Failed);
                    true
                }
                _ => false,
            }
        };

        #[cfg(feature = "logging")]
        error!(
            target: "service_locator",
            service = %key,
            error = %error,
            "Service initialization failed"
        );

        if failed {
            self.publish(ServiceEventKind::Failed, key, LifecycleState::Failed);
        }
        Err(error)
    }

    /// The registration disappeared while user code ran
    fn vanished(&self, cell: &RefCell<Registry>, key: &ServiceKey) -> Result<Arc<dyn Service>> {
        cell.borrow_mut().end_resolving(key);

        #[cfg(feature = "logging")]
        warn!(
            target: "service_locator",
            service = %key,
            "Service was unregistered during its own initialization"
        );

        Err(ServiceError::NotRegistered { key: key.clone() })
    }

    fn shutdown_registered(
        &self,
        cell: &RefCell<Registry>,
        key: &ServiceKey,
        force: bool,
    ) -> Result<()> {
        let instance = {
            let mut registry = cell.borrow_mut();
            let entry = registry
                .get_mut(key)
                .ok_or_else(|| ServiceError::NotRegistered { key: key.clone() })?;

            match entry.state {
                LifecycleState::Ready | LifecycleState::Initializing => {}
                _ => return Ok(()),
            }

            if !force && entry.reference_count > 0 {
                #[cfg(feature = "logging")]
                warn!(
                    target: "service_locator",
                    service = %key,
                    references = entry.reference_count,
                    "Shutdown refused, service still referenced"
                );

                return Err(ServiceError::ShutdownRefused {
                    key: key.clone(),
                    references: entry.reference_count,
                });
            }

            // Out of the ready mirror before leaving Ready
            self.inner.ready.remove(key);
            entry.set_state(LifecycleState::Shutting);
            entry.instance.clone()
        };

        self.publish(
            ServiceEventKind::ShuttingDown,
            key,
            LifecycleState::Shutting,
        );

        if let Some(instance) = &instance {
            instance.shutdown_service(force);
        }

        if let Some(entry) = cell.borrow_mut().get_mut(key) {
            entry.instance = None;
            entry.reference_count = 0;
            if entry.state == LifecycleState::Shutting {
                entry.set_state(LifecycleState::Shutdown);
            }
        }

        #[cfg(feature = "logging")]
        info!(target: "service_locator", service = %key, force, "Service shut down");

        self.publish(ServiceEventKind::Shutdown, key, LifecycleState::Shutdown);
        Ok(())
    }

    fn publish(&self, kind: ServiceEventKind, key: &ServiceKey, state: LifecycleState) {
        #[cfg(feature = "logging")]
        if self.is_detailed_logging() {
            info!(
                target: "service_locator",
                event = kind.as_str(),
                service = %key,
                state = %state,
                "Service event"
            );
        } else {
            trace!(
                target: "service_locator",
                event = kind.as_str(),
                service = %key,
                state = %state,
                "Service event"
            );
        }

        let publisher = self.inner.publisher.read().clone();
        if let Some(publisher) = publisher {
            publisher.publish(&ServiceEvent::new(kind, key, state));
        }
    }
}

impl Default for ServiceLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never wait on a construction running on another thread
        let registered = self
            .inner
            .registry
            .try_lock()
            .and_then(|guard| guard.try_borrow().ok().map(|r| r.len()));

        f.debug_struct("ServiceLocator")
            .field("registered", &registered)
            .field("ready", &self.inner.ready.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
        succeed: bool,
    }

    impl Service for Recorder {
        fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
            self.journal.lock().unwrap().push(format!("init:{}", self.name));
            self.succeed
        }

        fn shutdown_service(&self, _force: bool) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("shutdown:{}", self.name));
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    fn deps(names: &[&'static str]) -> ServiceInitParams {
        ServiceInitParams::new().with_dependencies(names.iter().map(|n| ServiceKey::from_static(*n)))
    }

    fn register_recorder(
        locator: &ServiceLocator,
        name: &'static str,
        dependencies: &[&'static str],
        journal: &Journal,
    ) {
        register_recorder_with(locator, name, deps(dependencies), journal, true);
    }

    fn register_recorder_with(
        locator: &ServiceLocator,
        name: &'static str,
        params: ServiceInitParams,
        journal: &Journal,
        succeed: bool,
    ) {
        let journal = Arc::clone(journal);
        locator
            .register_factory(
                name,
                move |_| {
                    Some(Recorder {
                        name,
                        journal: Arc::clone(&journal),
                        succeed,
                    })
                },
                params,
            )
            .unwrap();
    }

    #[derive(Default)]
    struct Fuel;

    impl Service for Fuel {
        fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct Engine;

    impl Service for Engine {
        fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
            true
        }

        fn required_dependencies() -> Vec<ServiceKey> {
            vec![ServiceKey::from_static("Test.Fuel")]
        }
    }

    #[test]
    fn test_get_service_is_idempotent() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &[], &log);

        let first = locator.get_service_as::<Recorder>("Test.A").unwrap();
        let second = locator.get_service_as::<Recorder>("Test.A").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(entries(&log), ["init:Test.A"]);
        assert_eq!(locator.reference_count("Test.A"), Some(2));
        assert_eq!(locator.get_state("Test.A"), Some(LifecycleState::Ready));
    }

    #[test]
    fn test_dependencies_ready_before_dependent() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.C", &["Test.B"], &log);
        register_recorder(&locator, "Test.B", &["Test.A"], &log);
        register_recorder(&locator, "Test.A", &[], &log);

        locator.get_service("Test.C").unwrap();

        assert_eq!(entries(&log), ["init:Test.A", "init:Test.B", "init:Test.C"]);
        assert!(locator.is_ready("Test.A"));
        assert!(locator.is_ready("Test.B"));
    }

    #[test]
    fn test_dependency_wiring_takes_no_reference() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &["Test.B"], &log);
        register_recorder(&locator, "Test.B", &[], &log);

        locator.get_service("Test.A").unwrap();

        assert_eq!(locator.reference_count("Test.A"), Some(1));
        assert_eq!(locator.reference_count("Test.B"), Some(0));
    }

    #[test]
    fn test_circular_dependency_fails_both() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &["Test.B"], &log);
        register_recorder(&locator, "Test.B", &["Test.A"], &log);

        assert!(locator.get_service("Test.A").is_err());
        assert_eq!(locator.get_state("Test.A"), Some(LifecycleState::Failed));
        assert_eq!(locator.get_state("Test.B"), Some(LifecycleState::Failed));
        assert!(entries(&log).is_empty());

        let errors = locator.validate_all_services();
        assert!(errors.iter().any(|e| matches!(
            e,
            ServiceError::CircularDependency { path, .. } if path.len() == 3
        )));
    }

    #[test]
    fn test_self_dependency_reports_cycle() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.Loop", &["Test.Loop"], &log);

        let err = locator.get_service("Test.Loop").unwrap_err();
        assert!(matches!(err, ServiceError::DependencyFailed { .. }));
        assert_eq!(locator.get_state("Test.Loop"), Some(LifecycleState::Failed));
    }

    #[test]
    fn test_initialize_all_in_dependency_order() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.C", &["Test.B"], &log);
        register_recorder(&locator, "Test.B", &["Test.A"], &log);
        register_recorder(&locator, "Test.A", &[], &log);

        assert_eq!(locator.initialize_all_services(), 3);
        assert_eq!(entries(&log), ["init:Test.A", "init:Test.B", "init:Test.C"]);
        // Batch initialization takes no references
        assert_eq!(locator.reference_count("Test.C"), Some(0));
    }

    #[test]
    fn test_shutdown_all_in_reverse_order() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.C", &["Test.B"], &log);
        register_recorder(&locator, "Test.B", &["Test.A"], &log);
        register_recorder(&locator, "Test.A", &[], &log);
        locator.initialize_all_services();
        log.lock().unwrap().clear();

        assert_eq!(locator.shutdown_all_services(true), 3);
        assert_eq!(
            entries(&log),
            ["shutdown:Test.C", "shutdown:Test.B", "shutdown:Test.A"]
        );
        assert_eq!(locator.get_state("Test.A"), Some(LifecycleState::Shutdown));
        assert!(locator.try_get_service("Test.A").is_none());
    }

    #[test]
    fn test_shutdown_all_skips_referenced_unless_forced() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.Held", &[], &log);
        register_recorder(&locator, "Test.Free", &[], &log);
        locator.initialize_all_services();
        locator.get_service("Test.Held").unwrap();

        assert_eq!(locator.shutdown_all_services(false), 1);
        assert!(locator.is_ready("Test.Held"));
        assert_eq!(locator.shutdown_all_services(true), 1);
        assert_eq!(locator.reference_count("Test.Held"), Some(0));
    }

    #[test]
    fn test_unregister_refused_while_referenced() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &[], &log);
        locator.get_service("Test.A").unwrap();
        locator.get_service("Test.A").unwrap();

        let err = locator.unregister("Test.A", false).unwrap_err();
        assert_eq!(
            err,
            ServiceError::ShutdownRefused {
                key: ServiceKey::from_static("Test.A"),
                references: 2,
            }
        );
        assert_eq!(locator.get_state("Test.A"), Some(LifecycleState::Ready));

        locator.unregister("Test.A", true).unwrap();
        assert!(!locator.is_registered("Test.A"));
        assert!(!locator.is_ready("Test.A"));
        assert_eq!(entries(&log), ["init:Test.A", "shutdown:Test.A"]);
    }

    #[test]
    fn test_unregister_after_release() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &[], &log);
        locator.get_service("Test.A").unwrap();

        assert_eq!(locator.release_service("Test.A"), Ok(0));
        assert_eq!(locator.release_service("Test.A"), Ok(0));
        locator.unregister("Test.A", false).unwrap();
        assert!(locator.is_empty());
    }

    #[test]
    fn test_shutdown_service_noop_and_refusal() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &[], &log);

        // Nothing constructed yet
        assert_eq!(locator.shutdown_service("Test.A", false), Ok(()));
        assert_eq!(
            locator.get_state("Test.A"),
            Some(LifecycleState::Uninitialized)
        );

        locator.get_service("Test.A").unwrap();
        assert_eq!(
            locator.shutdown_service("Test.A", false),
            Err(ServiceError::ShutdownRefused {
                key: ServiceKey::from_static("Test.A"),
                references: 1,
            })
        );
        assert_eq!(locator.get_state("Test.A"), Some(LifecycleState::Ready));
        assert!(locator.is_ready("Test.A"));

        assert_eq!(locator.shutdown_service("Test.A", true), Ok(()));
        assert_eq!(locator.get_state("Test.A"), Some(LifecycleState::Shutdown));
        assert_eq!(locator.reference_count("Test.A"), Some(0));
        assert!(!locator.is_ready("Test.A"));
        assert!(locator.try_get_service("Test.A").is_none());

        // Already down
        assert_eq!(locator.shutdown_service("Test.A", false), Ok(()));
        assert_eq!(entries(&log), ["init:Test.A", "shutdown:Test.A"]);
        assert!(matches!(
            locator.shutdown_service("Test.Ghost", true),
            Err(ServiceError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_shutting_service_not_handed_out() {
        struct Watcher {
            locator: Mutex<Option<WeakServiceLocator>>,
            visible_while_shutting: AtomicBool,
        }

        impl Service for Watcher {
            fn initialize_service(&self, params: &ServiceInitParams) -> bool {
                *self.locator.lock().unwrap() = params.locator().map(|l| l.downgrade());
                true
            }

            fn shutdown_service(&self, _force: bool) {
                let locator = self.locator.lock().unwrap().as_ref().and_then(|w| w.upgrade());
                if let Some(locator) = locator {
                    self.visible_while_shutting.store(
                        locator.try_get_service("Test.Watcher").is_some()
                            || locator.is_ready("Test.Watcher"),
                        Ordering::SeqCst,
                    );
                }
            }
        }

        let watcher = Arc::new(Watcher {
            locator: Mutex::new(None),
            visible_while_shutting: AtomicBool::new(true),
        });
        let locator = ServiceLocator::new();
        locator
            .register_instance("Test.Watcher", Arc::clone(&watcher), ServiceInitParams::new())
            .unwrap();
        locator.initialize_all_services();

        locator.shutdown_service("Test.Watcher", false).unwrap();
        assert!(!watcher.visible_while_shutting.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unregister_unknown() {
        let locator = ServiceLocator::new();
        assert!(matches!(
            locator.unregister("Test.Ghost", false),
            Err(ServiceError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_cleanup_respects_auto_start_and_references() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.Idle", &[], &log);
        register_recorder(&locator, "Test.Held", &[], &log);
        register_recorder_with(
            &locator,
            "Test.Pinned",
            ServiceInitParams::new().auto_start(true),
            &log,
            true,
        );
        locator.initialize_all_services();
        locator.get_service("Test.Held").unwrap();

        assert_eq!(locator.cleanup_unused_services(), 1);
        assert!(!locator.is_registered("Test.Idle"));
        assert!(locator.is_ready("Test.Held"));
        assert!(locator.is_ready("Test.Pinned"));
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let first = journal();
        let second = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &[], &first);

        let journal = Arc::clone(&second);
        let err = locator
            .register_factory(
                "Test.A",
                move |_| {
                    Some(Recorder {
                        name: "other",
                        journal: Arc::clone(&journal),
                        succeed: true,
                    })
                },
                ServiceInitParams::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyRegistered { .. }));

        let service = locator.get_service_as::<Recorder>("Test.A").unwrap();
        assert_eq!(service.name, "Test.A");
        assert!(entries(&second).is_empty());
        assert_eq!(locator.len(), 1);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let locator = ServiceLocator::new();
        let err = locator
            .register::<Fuel>("Test..Fuel", ServiceInitParams::new())
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert!(locator.is_empty());
    }

    #[test]
    fn test_missing_dependency_fails_and_is_not_retried() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &["Test.Z"], &log);

        let err = locator.get_service("Test.A").unwrap_err();
        assert_eq!(
            err,
            ServiceError::MissingDependency {
                key: ServiceKey::from_static("Test.A"),
                dependency: ServiceKey::from_static("Test.Z"),
            }
        );
        assert_eq!(locator.get_state("Test.A"), Some(LifecycleState::Failed));

        register_recorder(&locator, "Test.Z", &[], &log);
        assert!(matches!(
            locator.get_service("Test.A"),
            Err(ServiceError::Unavailable {
                state: LifecycleState::Failed,
                ..
            })
        ));

        locator.reset_all_services();
        assert!(locator.get_service("Test.A").is_ok());
        assert_eq!(entries(&log), ["init:Test.Z", "init:Test.A"]);
    }

    #[test]
    fn test_user_initialization_failure() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder_with(&locator, "Test.Bad", ServiceInitParams::new(), &log, false);

        let err = locator.get_service("Test.Bad").unwrap_err();
        assert!(matches!(err, ServiceError::UserInitializationFailure { .. }));
        assert_eq!(locator.get_state("Test.Bad"), Some(LifecycleState::Failed));
        assert_eq!(locator.reference_count("Test.Bad"), Some(0));
        assert_eq!(locator.stats().failures, 1);
        assert!(locator.try_get_service("Test.Bad").is_none());
    }

    #[test]
    fn test_factory_returning_none_is_invalid_instance() {
        let locator = ServiceLocator::new();
        locator
            .register_factory("Test.Empty", |_| None::<Fuel>, ServiceInitParams::new())
            .unwrap();

        assert!(matches!(
            locator.get_service("Test.Empty"),
            Err(ServiceError::InvalidInstance { .. })
        ));
        assert_eq!(locator.get_state("Test.Empty"), Some(LifecycleState::Failed));
    }

    #[test]
    fn test_class_declared_dependencies() {
        let locator = ServiceLocator::new();
        locator
            .register::<Engine>("Test.Engine", ServiceInitParams::new())
            .unwrap();
        locator
            .register::<Fuel>("Test.Fuel", ServiceInitParams::new())
            .unwrap();

        locator.get_service_as::<Engine>("Test.Engine").unwrap();
        assert!(locator.is_ready("Test.Fuel"));
    }

    #[test]
    fn test_registered_instance_is_initialized_on_first_resolve() {
        let log = journal();
        let locator = ServiceLocator::new();
        let given = Arc::new(Recorder {
            name: "Test.Given",
            journal: Arc::clone(&log),
            succeed: true,
        });
        locator
            .register_instance("Test.Given", Arc::clone(&given), ServiceInitParams::new())
            .unwrap();

        assert_eq!(
            locator.get_state("Test.Given"),
            Some(LifecycleState::Uninitialized)
        );
        let resolved = locator.get_service_as::<Recorder>("Test.Given").unwrap();
        assert!(Arc::ptr_eq(&resolved, &given));
        assert_eq!(entries(&log), ["init:Test.Given"]);
    }

    #[test]
    fn test_injection_runs_before_initialize() {
        #[derive(Default)]
        struct Wired {
            steps: Mutex<Vec<&'static str>>,
            saw_locator: AtomicBool,
        }

        impl Service for Wired {
            fn initialize_service(&self, params: &ServiceInitParams) -> bool {
                self.saw_locator
                    .store(params.locator().is_some(), Ordering::SeqCst);
                self.steps.lock().unwrap().push("init");
                true
            }
        }

        let locator = ServiceLocator::new();
        locator
            .register_class_with_injection(
                "Test.Wired",
                ServiceClass::of::<Wired>(),
                ServiceInitParams::new(),
                |service, _locator| {
                    let wired = Arc::clone(service)
                        .into_any()
                        .downcast::<Wired>()
                        .map_err(|_| "unexpected type".to_string())?;
                    wired.steps.lock().unwrap().push("inject");
                    Ok(())
                },
            )
            .unwrap();

        let wired = locator.get_service_as::<Wired>("Test.Wired").unwrap();
        assert_eq!(*wired.steps.lock().unwrap(), ["inject", "init"]);
        assert!(wired.saw_locator.load(Ordering::SeqCst));
    }

    #[test]
    fn test_injection_failure() {
        let locator = ServiceLocator::new();
        locator
            .register_class_with_injection(
                "Test.Fuel",
                ServiceClass::of::<Fuel>(),
                ServiceInitParams::new(),
                |_, _| Err("no config".into()),
            )
            .unwrap();

        let err = locator.get_service("Test.Fuel").unwrap_err();
        assert_eq!(
            err,
            ServiceError::injection_failure(&ServiceKey::from_static("Test.Fuel"), "no config")
        );
        assert_eq!(locator.get_state("Test.Fuel"), Some(LifecycleState::Failed));
    }

    #[test]
    fn test_reentrant_resolution_from_initialize() {
        #[derive(Default)]
        struct Consumer {
            resolved: AtomicBool,
        }

        impl Service for Consumer {
            fn initialize_service(&self, params: &ServiceInitParams) -> bool {
                let Some(locator) = params.locator() else {
                    return false;
                };
                let ok = locator.get_service("Test.Fuel").is_ok();
                self.resolved.store(ok, Ordering::SeqCst);
                ok
            }
        }

        let locator = ServiceLocator::new();
        locator
            .register::<Fuel>("Test.Fuel", ServiceInitParams::new())
            .unwrap();
        locator
            .register::<Consumer>("Test.Consumer", ServiceInitParams::new())
            .unwrap();

        let consumer = locator.get_service_as::<Consumer>("Test.Consumer").unwrap();
        assert!(consumer.resolved.load(Ordering::SeqCst));
        assert_eq!(locator.reference_count("Test.Fuel"), Some(1));
    }

    #[test]
    fn test_depth_limit() {
        let log = journal();
        let locator =
            ServiceLocator::with_config(LocatorConfig::new().with_max_dependency_depth(3));
        register_recorder(&locator, "Test.S0", &["Test.S1"], &log);
        register_recorder(&locator, "Test.S1", &["Test.S2"], &log);
        register_recorder(&locator, "Test.S2", &["Test.S3"], &log);
        register_recorder(&locator, "Test.S3", &["Test.S4"], &log);
        register_recorder(&locator, "Test.S4", &[], &log);

        assert!(locator.get_service("Test.S0").is_err());
        assert_eq!(locator.get_state("Test.S3"), Some(LifecycleState::Failed));
        assert_eq!(
            locator.get_state("Test.S4"),
            Some(LifecycleState::Uninitialized)
        );
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_try_get_never_constructs() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &[], &log);

        assert!(locator.try_get_service("Test.A").is_none());
        assert!(entries(&log).is_empty());

        locator.get_service("Test.A").unwrap();
        assert!(locator.try_get_service_as::<Recorder>("Test.A").is_some());
        assert!(locator.try_get_service_as::<Fuel>("Test.A").is_none());
        assert_eq!(locator.reference_count("Test.A"), Some(1));
    }

    #[test]
    fn test_type_mismatch_releases_reference() {
        let locator = ServiceLocator::new();
        locator
            .register::<Fuel>("Test.Fuel", ServiceInitParams::new())
            .unwrap();

        assert!(matches!(
            locator.get_service_as::<Engine>("Test.Fuel"),
            Err(ServiceError::TypeMismatch { .. })
        ));
        assert_eq!(locator.reference_count("Test.Fuel"), Some(0));
        assert!(locator.is_ready("Test.Fuel"));
    }

    #[test]
    fn test_reset_builds_fresh_instances() {
        let locator = ServiceLocator::new();
        locator
            .register::<Fuel>("Test.Fuel", ServiceInitParams::new())
            .unwrap();
        let before = locator.get_service_as::<Fuel>("Test.Fuel").unwrap();

        locator.reset_all_services();
        assert_eq!(
            locator.get_state("Test.Fuel"),
            Some(LifecycleState::Uninitialized)
        );
        assert_eq!(locator.reference_count("Test.Fuel"), Some(0));
        assert!(locator.try_get_service("Test.Fuel").is_none());

        let after = locator.get_service_as::<Fuel>("Test.Fuel").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(locator.stats().services_created, 2);
    }

    #[test]
    fn test_deinitialize_clears_registry() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &[], &log);
        register_recorder(&locator, "Test.B", &["Test.A"], &log);
        locator.initialize_all_services();

        locator.deinitialize();
        assert!(locator.is_empty());
        assert!(!locator.is_ready("Test.A"));
        assert!(entries(&log).contains(&"shutdown:Test.B".to_string()));
    }

    #[test]
    fn test_events_follow_lifecycle() {
        let seen: Arc<Mutex<Vec<(ServiceEventKind, LifecycleState)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let locator = ServiceLocator::new();
        locator.set_event_publisher(Some(Arc::new(move |event: &ServiceEvent| {
            if event.key.as_str() == "Test.Fuel" {
                sink.lock().unwrap().push((event.kind, event.state));
            }
        })));

        locator
            .register::<Fuel>("Test.Fuel", ServiceInitParams::new())
            .unwrap();
        locator.get_service("Test.Fuel").unwrap();
        locator.unregister("Test.Fuel", true).unwrap();

        let kinds: Vec<ServiceEventKind> = seen.lock().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            [
                ServiceEventKind::Registered,
                ServiceEventKind::Initializing,
                ServiceEventKind::Ready,
                ServiceEventKind::ShuttingDown,
                ServiceEventKind::Shutdown,
            ]
        );
    }

    #[test]
    fn test_dependency_graph_and_validation() {
        let log = journal();
        let locator = ServiceLocator::new();
        register_recorder(&locator, "Test.A", &["Test.B", "Test.Missing"], &log);
        register_recorder(&locator, "Test.B", &[], &log);
        locator.get_service("Test.B").unwrap();

        let graph = locator.build_dependency_graph();
        assert!(graph.contains("- Test.A [Uninitialized]"));
        assert!(graph.contains("- Test.B [Ready] refs=1"));
        assert!(graph.contains("-> Test.Missing (missing)"));

        let errors = locator.validate_all_services();
        assert_eq!(
            errors,
            vec![ServiceError::MissingDependency {
                key: ServiceKey::from_static("Test.A"),
                dependency: ServiceKey::from_static("Test.Missing"),
            }]
        );
        assert_eq!(
            locator.get_registered_services(),
            vec![
                ServiceKey::from_static("Test.A"),
                ServiceKey::from_static("Test.B")
            ]
        );
    }

    #[test]
    fn test_concurrent_get_shares_one_instance() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructed);
        let locator = ServiceLocator::new();
        locator
            .register_factory(
                "Test.Shared",
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Some(Fuel)
                },
                ServiceInitParams::new(),
            )
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locator = locator.clone();
                thread::spawn(move || locator.get_service_as::<Fuel>("Test.Shared").unwrap())
            })
            .collect();
        let services: Vec<Arc<Fuel>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(services.iter().all(|s| Arc::ptr_eq(s, &services[0])));
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert_eq!(locator.reference_count("Test.Shared"), Some(8));
    }

    #[test]
    fn test_try_get_does_not_wait_on_construction() {
        struct Slow {
            started: Mutex<mpsc::Sender<()>>,
            proceed: Mutex<mpsc::Receiver<()>>,
        }

        impl Service for Slow {
            fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
                let _ = self.started.lock().unwrap().send(());
                let _ = self.proceed.lock().unwrap().recv();
                true
            }
        }

        let (started_tx, started_rx) = mpsc::channel();
        let (proceed_tx, proceed_rx) = mpsc::channel();
        let locator = ServiceLocator::new();
        locator
            .register::<Fuel>("Test.Fuel", ServiceInitParams::new())
            .unwrap();
        locator.get_service("Test.Fuel").unwrap();
        locator
            .register_instance(
                "Test.Slow",
                Arc::new(Slow {
                    started: Mutex::new(started_tx),
                    proceed: Mutex::new(proceed_rx),
                }),
                ServiceInitParams::new(),
            )
            .unwrap();

        let worker = {
            let locator = locator.clone();
            thread::spawn(move || locator.get_service("Test.Slow").is_ok())
        };
        started_rx.recv().unwrap();

        // The worker holds the container lock inside initialize_service
        assert!(locator.try_get_service("Test.Slow").is_none());
        assert!(locator.try_get_service("Test.Fuel").is_some());
        assert!(locator.is_ready("Test.Fuel"));
        assert!(!locator.is_ready("Test.Slow"));

        proceed_tx.send(()).unwrap();
        assert!(worker.join().unwrap());
        assert!(locator.is_ready("Test.Slow"));
    }

    #[test]
    fn test_stats_track_initializations() {
        let locator = ServiceLocator::new();
        locator
            .register::<Engine>("Test.Engine", ServiceInitParams::new())
            .unwrap();
        locator
            .register::<Fuel>("Test.Fuel", ServiceInitParams::new())
            .unwrap();
        locator.initialize_all_services();

        let stats = locator.stats();
        assert_eq!(stats.services_created, 2);
        assert_eq!(stats.services_initialized, 2);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn test_weak_handle() {
        let locator = ServiceLocator::new();
        let weak = locator.downgrade();
        assert!(weak.upgrade().is_some_and(|l| l.same_container(&locator)));

        drop(locator);
        assert!(weak.upgrade().is_none());
    }
}
