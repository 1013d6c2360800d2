#![no_main]

//! Fuzz target for lifecycle operations
//!
//! Drives random registrations, resolutions, releases and batch operations
//! over a small key space. Every successful resolution must leave the
//! service's dependencies Ready, and `try_get_service` must only ever return
//! Ready services.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use service_locator::{LifecycleState, Service, ServiceInitParams, ServiceKey, ServiceLocator};

const KEYS: [&str; 6] = [
    "Fuzz.A", "Fuzz.B", "Fuzz.C", "Fuzz.D", "Fuzz.E", "Fuzz.F",
];

struct Node {
    healthy: bool,
}

impl Service for Node {
    fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
        self.healthy
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    Register {
        key: u8,
        /// Bitmask over KEYS
        dependencies: u8,
        healthy: bool,
        auto_start: bool,
    },
    Get(u8),
    TryGet(u8),
    Release(u8),
    Unregister { key: u8, force: bool },
    InitializeAll,
    ShutdownAll { force: bool },
    Reset,
    Cleanup,
    Validate,
}

fn key(index: u8) -> &'static str {
    KEYS[usize::from(index) % KEYS.len()]
}

fn dependencies_of(mask: u8) -> Vec<ServiceKey> {
    KEYS.iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, k)| ServiceKey::from_static(*k))
        .collect()
}

/// A freshly resolved service sits on Ready dependencies only
fn assert_dependencies_ready(
    locator: &ServiceLocator,
    edges: &[(ServiceKey, Vec<ServiceKey>)],
    name: &str,
) {
    let Some((_, deps)) = edges.iter().find(|(k, _)| k.as_str() == name) else {
        return;
    };
    for dependency in deps {
        assert!(
            locator.is_ready(dependency),
            "{name} resolved but {dependency} is {:?}",
            locator.get_state(dependency)
        );
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let locator = ServiceLocator::new();
    let mut edges: Vec<(ServiceKey, Vec<ServiceKey>)> = Vec::new();

    for op in ops.into_iter().take(64) {
        match op {
            Op::Register {
                key: index,
                dependencies,
                healthy,
                auto_start,
            } => {
                let name = key(index);
                let deps = dependencies_of(dependencies);
                let params = ServiceInitParams::new()
                    .with_dependencies(deps.iter().cloned())
                    .auto_start(auto_start);
                if locator
                    .register_factory(name, move |_| Some(Node { healthy }), params)
                    .is_ok()
                {
                    edges.retain(|(k, _)| k.as_str() != name);
                    edges.push((ServiceKey::from_static(name), deps));
                }
            }
            Op::Get(index) => {
                // Only a resolution that ran now vouches for the dependencies
                let was_ready = locator.is_ready(key(index));
                if locator.get_service(key(index)).is_ok() && !was_ready {
                    assert_dependencies_ready(&locator, &edges, key(index));
                }
            }
            Op::TryGet(index) => {
                if let Some(_service) = locator.try_get_service(key(index)) {
                    assert_eq!(locator.get_state(key(index)), Some(LifecycleState::Ready));
                }
            }
            Op::Release(index) => {
                let _ = locator.release_service(key(index));
            }
            Op::Unregister { key: index, force } => {
                if locator.unregister(key(index), force).is_ok() {
                    edges.retain(|(k, _)| k.as_str() != key(index));
                }
            }
            Op::InitializeAll => {
                locator.initialize_all_services();
            }
            Op::ShutdownAll { force } => {
                locator.shutdown_all_services(force);
            }
            Op::Reset => locator.reset_all_services(),
            Op::Cleanup => {
                let removed = locator.cleanup_unused_services();
                if removed > 0 {
                    edges.retain(|(k, _)| locator.is_registered(k));
                }
            }
            Op::Validate => {
                let _ = locator.validate_all_services();
                let _ = locator.build_dependency_graph();
            }
        }
    }
});
