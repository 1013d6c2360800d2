//! Registration store for the service locator
//!
//! `Registry` holds every registration and is only touched under the
//! container lock. `ReadyServices` mirrors the `Ready` subset in a `DashMap`
//! so `try_get_service` never waits on a running construction.

use crate::factory::{InjectionFn, ServiceSource};
use crate::graph::DependencyLookup;
use crate::{LifecycleState, Service, ServiceInitParams, ServiceKey};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::unsync::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One registration slot: how to build the service and where it is in its lifecycle
pub(crate) struct Registration {
    pub key: ServiceKey,
    pub source: ServiceSource,
    /// Owned instance; `None` until constructed and after shutdown
    pub instance: Option<Arc<dyn Service>>,
    pub init_params: ServiceInitParams,
    pub injection: Option<InjectionFn>,
    pub state: LifecycleState,
    pub reference_count: u32,
    pub registered_at: Instant,
    /// Registration order, used as the base order for batches and diagnostics
    pub sequence: u64,
    /// Class-declared dependencies, queried once
    class_dependencies: OnceCell<Vec<ServiceKey>>,
}

impl Registration {
    pub fn new(
        key: ServiceKey,
        source: ServiceSource,
        init_params: ServiceInitParams,
        injection: Option<InjectionFn>,
    ) -> Self {
        Self {
            key,
            source,
            instance: None,
            init_params,
            injection,
            state: LifecycleState::Uninitialized,
            reference_count: 0,
            registered_at: Instant::now(),
            sequence: 0,
            class_dependencies: OnceCell::new(),
        }
    }

    /// Explicit `required_services` plus the class-declared dependencies, sorted
    pub fn dependencies(&self) -> Vec<ServiceKey> {
        let declared = self
            .class_dependencies
            .get_or_init(|| self.source.declared_dependencies());

        let mut all: BTreeSet<ServiceKey> = self.init_params.required_services.clone();
        all.extend(declared.iter().cloned());
        all.into_iter().collect()
    }

    /// Move to `next`, checking the state machine in debug builds
    #[inline]
    pub fn set_state(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid lifecycle transition for {}: {} -> {}",
            self.key,
            self.state,
            next
        );
        self.state = next;
    }

    /// Back to `Uninitialized` from any state, dropping the instance
    pub fn reset(&mut self) {
        self.state = LifecycleState::Uninitialized;
        self.reference_count = 0;
        self.instance = None;
    }

    /// Time since registration
    #[inline]
    pub fn age(&self) -> Duration {
        self.registered_at.elapsed()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("source", &self.source)
            .field("state", &self.state)
            .field("reference_count", &self.reference_count)
            .field("has_instance", &self.instance.is_some())
            .finish()
    }
}

/// Running counters kept by the container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocatorStats {
    /// Instances produced by a source
    pub services_created: u64,
    /// Services that reached `Ready` through the resolver
    pub services_initialized: u64,
    /// Lifecycle failures recorded
    pub failures: u64,
    /// Cumulative time from construction to `Ready`
    pub total_init_time: Duration,
}

impl LocatorStats {
    /// Mean time from construction to `Ready`
    pub fn average_init_time(&self) -> Duration {
        match u32::try_from(self.services_initialized) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total_init_time / count,
            Err(_) => Duration::ZERO,
        }
    }
}

/// All registrations plus the resolution chain of the thread holding the lock
pub(crate) struct Registry {
    entries: HashMap<ServiceKey, Registration, RandomState>,
    /// Keys currently being resolved, outermost first
    resolving: Vec<ServiceKey>,
    pub stats: LocatorStats,
    next_sequence: u64,
}

impl Registry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            resolving: Vec::new(),
            stats: LocatorStats::default(),
            next_sequence: 0,
        }
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Registration> {
        self.entries.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Registration> {
        self.entries.get_mut(key)
    }

    /// Insert a new registration. The caller has checked the key is free.
    pub fn insert(&mut self, mut registration: Registration) {
        registration.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(registration.key.clone(), registration);
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<Registration> {
        self.resolving.retain(|k| k.as_str() != key);
        self.entries.remove(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Registrations in registration order
    pub fn ordered(&self) -> Vec<&Registration> {
        let mut all: Vec<&Registration> = self.entries.values().collect();
        all.sort_by_key(|r| r.sequence);
        all
    }

    /// Keys in registration order whose state matches `filter`
    pub fn keys_where(&self, filter: impl Fn(&Registration) -> bool) -> Vec<ServiceKey> {
        self.ordered()
            .into_iter()
            .filter(|r| filter(r))
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Registration> {
        self.entries.values_mut()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.resolving.clear();
    }

    // Resolution chain

    #[inline]
    pub fn is_resolving(&self, key: &str) -> bool {
        self.resolving.iter().any(|k| k.as_str() == key)
    }

    #[inline]
    pub fn resolution_depth(&self) -> usize {
        self.resolving.len()
    }

    /// The current chain followed by `key`, for cycle reports
    pub fn resolution_path(&self, key: &ServiceKey) -> Vec<ServiceKey> {
        let start = self
            .resolving
            .iter()
            .position(|k| k == key)
            .unwrap_or(0);
        let mut path = self.resolving[start..].to_vec();
        path.push(key.clone());
        path
    }

    #[inline]
    pub fn begin_resolving(&mut self, key: &ServiceKey) {
        self.resolving.push(key.clone());
    }

    #[inline]
    pub fn end_resolving(&mut self, key: &str) {
        if let Some(pos) = self.resolving.iter().rposition(|k| k.as_str() == key) {
            self.resolving.remove(pos);
        }
    }

    pub fn clear_resolving(&mut self) {
        self.resolving.clear();
    }
}

impl DependencyLookup for Registry {
    fn dependencies_of(&self, key: &ServiceKey) -> Option<Vec<ServiceKey>> {
        self.entries.get(key.as_str()).map(Registration::dependencies)
    }
}

/// Lock-free view of the `Ready` services.
///
/// Uses `DashMap` with `ahash`; readers never wait on the container lock.
pub(crate) struct ReadyServices {
    services: DashMap<ServiceKey, Arc<dyn Service>, RandomState>,
}

impl ReadyServices {
    /// 8 shards: containers rarely hold more than a few dozen services
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            services: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                8,
            ),
        }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<Arc<dyn Service>> {
        self.services.get(key).map(|entry| Arc::clone(entry.value()))
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    #[inline]
    pub fn insert(&self, key: ServiceKey, service: Arc<dyn Service>) {
        self.services.insert(key, service);
    }

    #[inline]
    pub fn remove(&self, key: &str) {
        self.services.remove(key);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn clear(&self) {
        self.services.clear();
    }
}
