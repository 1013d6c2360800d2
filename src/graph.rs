//! Dependency graph algorithms
//!
//! - [`topological_order`]: dependencies-first ordering of a key subset, used
//!   forward for batch initialization and reversed for batch shutdown.
//! - [`find_cycle`]: read-only cycle search from one root, used by validation.
//!
//! Both work over any [`DependencyLookup`], never construct anything and never
//! change lifecycle state.

use crate::ServiceKey;
use ahash::AHashSet;

#[cfg(feature = "logging")]
use tracing::warn;

/// Read access to the dependency edges of registered services
pub(crate) trait DependencyLookup {
    /// Dependencies of `key`, or `None` if it is not registered
    fn dependencies_of(&self, key: &ServiceKey) -> Option<Vec<ServiceKey>>;
}

/// Order `keys` so that each key's dependencies that are also in `keys` come first.
///
/// DFS post-order over the subset only; dependencies outside `keys` are not
/// traversed. A back edge means a cycle inside the subset: it is logged and
/// skipped so the sort still covers every key. The cycle itself surfaces when
/// the services are resolved.
pub(crate) fn topological_order<L>(keys: &[ServiceKey], lookup: &L) -> Vec<ServiceKey>
where
    L: DependencyLookup + ?Sized,
{
    let mut sorter = TopoSorter {
        subset: keys.iter().map(ServiceKey::as_str).collect(),
        lookup,
        visited: AHashSet::with_capacity(keys.len()),
        on_stack: AHashSet::new(),
        sorted: Vec::with_capacity(keys.len()),
    };

    for key in keys {
        sorter.visit(key);
    }
    sorter.sorted
}

struct TopoSorter<'a, L: ?Sized> {
    subset: AHashSet<&'a str>,
    lookup: &'a L,
    visited: AHashSet<ServiceKey>,
    on_stack: AHashSet<ServiceKey>,
    sorted: Vec<ServiceKey>,
}

impl<L: DependencyLookup + ?Sized> TopoSorter<'_, L> {
    fn visit(&mut self, key: &ServiceKey) {
        if self.visited.contains(key) {
            return;
        }
        if self.on_stack.contains(key) {
            #[cfg(feature = "logging")]
            warn!(
                target: "service_locator",
                service = %key,
                "Cycle detected during topological sort, skipping back edge"
            );
            return;
        }

        self.on_stack.insert(key.clone());

        if let Some(dependencies) = self.lookup.dependencies_of(key) {
            for dependency in &dependencies {
                if self.subset.contains(dependency.as_str()) {
                    self.visit(dependency);
                }
            }
        }

        self.on_stack.remove(key);
        self.visited.insert(key.clone());
        self.sorted.push(key.clone());
    }
}

/// Look for a dependency cycle reachable from `root`.
///
/// Returns the cycle as a path that starts and ends on the same key. The path
/// set is pushed on entry and popped on exit of each frame, so separate roots
/// never see each other's state. Unregistered keys have no edges.
pub(crate) fn find_cycle<L>(root: &ServiceKey, lookup: &L) -> Option<Vec<ServiceKey>>
where
    L: DependencyLookup + ?Sized,
{
    let mut search = CycleSearch {
        lookup,
        path: Vec::new(),
        on_path: AHashSet::new(),
        clean: AHashSet::new(),
    };
    search.visit(root)
}

struct CycleSearch<'a, L: ?Sized> {
    lookup: &'a L,
    path: Vec<ServiceKey>,
    on_path: AHashSet<ServiceKey>,
    /// Fully explored without finding a cycle
    clean: AHashSet<ServiceKey>,
}

impl<L: DependencyLookup + ?Sized> CycleSearch<'_, L> {
    fn visit(&mut self, key: &ServiceKey) -> Option<Vec<ServiceKey>> {
        if self.on_path.contains(key) {
            let start = self.path.iter().position(|k| k == key).unwrap_or(0);
            let mut cycle = self.path[start..].to_vec();
            cycle.push(key.clone());
            return Some(cycle);
        }
        if self.clean.contains(key) {
            return None;
        }

        let dependencies = self.lookup.dependencies_of(key)?;

        self.on_path.insert(key.clone());
        self.path.push(key.clone());

        for dependency in &dependencies {
            if let Some(cycle) = self.visit(dependency) {
                return Some(cycle);
            }
        }

        self.path.pop();
        self.on_path.remove(key);
        self.clean.insert(key.clone());
        None
    }
}
