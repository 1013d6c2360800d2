//! # Service Locator - Dependency-Ordered Service Container
//!
//! A registry of long-lived services keyed by hierarchical names
//! (`Service.Equipment.Data`). The locator builds each service on first use,
//! brings its dependencies up first, initializes it, tracks its lifecycle and
//! shuts everything down again in reverse dependency order.
//!
//! ## Features
//!
//! - **Dependency ordering** - dependencies always reach `Ready` before their dependents
//! - **Cycle detection** - circular chains fail with the offending path instead of recursing
//! - **Reference-gated shutdown** - services in use refuse a non-forced shutdown
//! - **Reentrant** - services may call back into the container from their own initialization
//! - **Non-blocking lookups** - `try_get_service` never waits on a running construction
//! - **Observable** - `tracing` output with JSON or pretty subscribers, plus lifecycle events
//!
//! ## Quick Start
//!
//! ```rust
//! use service_locator::prelude::*;
//!
//! #[derive(Default)]
//! struct ItemDatabase;
//!
//! impl Service for ItemDatabase {
//!     fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
//!         true
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Equipment;
//!
//! impl Service for Equipment {
//!     fn initialize_service(&self, params: &ServiceInitParams) -> bool {
//!         // Dependencies are Ready before this runs
//!         params
//!             .locator()
//!             .is_some_and(|locator| locator.is_ready("Service.Items"))
//!     }
//!
//!     fn required_dependencies() -> Vec<ServiceKey> {
//!         vec![ServiceKey::from_static("Service.Items")]
//!     }
//! }
//!
//! let locator = ServiceLocator::new();
//! locator.register::<ItemDatabase>("Service.Items", ServiceInitParams::new())?;
//! locator.register::<Equipment>("Service.Equipment", ServiceInitParams::new())?;
//!
//! let equipment = locator.get_service_as::<Equipment>("Service.Equipment")?;
//! assert_eq!(locator.reference_count("Service.Equipment"), Some(1));
//!
//! drop(equipment);
//! locator.release_service("Service.Equipment")?;
//! assert_eq!(locator.shutdown_all_services(false), 2);
//! # Ok::<(), service_locator::ServiceError>(())
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> Shutting -> Shutdown
//!        |               |
//!        +-----> Failed <+
//! ```
//!
//! A `Failed` service stays failed until [`ServiceLocator::reset_all_services`].
//!
//! ## Sources
//!
//! ```rust
//! use service_locator::prelude::*;
//!
//! #[derive(Default)]
//! struct Settings {
//!     volume: u8,
//! }
//!
//! impl Service for Settings {
//!     fn initialize_service(&self, _params: &ServiceInitParams) -> bool {
//!         true
//!     }
//! }
//!
//! let locator = ServiceLocator::new();
//!
//! // Built from the type's Default on first resolve
//! locator.register::<Settings>("Service.Settings.Default", ServiceInitParams::new())?;
//!
//! // Built by a closure on first resolve
//! locator.register_factory(
//!     "Service.Settings.Loud",
//!     |_| Some(Settings { volume: 11 }),
//!     ServiceInitParams::new(),
//! )?;
//!
//! // Supplied up front, still initialized on first resolve
//! locator.register_instance(
//!     "Service.Settings.Muted",
//!     Arc::new(Settings { volume: 0 }),
//!     ServiceInitParams::new().auto_start(true),
//! )?;
//!
//! assert_eq!(locator.initialize_all_services(), 3);
//! # Ok::<(), service_locator::ServiceError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` (default) - `tracing` instrumentation under the `service_locator` target
//! - `logging-json` - JSON subscriber via [`logging::init_json`]
//! - `logging-pretty` - pretty subscriber via [`logging::init_pretty`]
//! - `async` - [`ServiceLocator::spawn_cleanup_task`] on tokio

mod cleanup;
mod config;
mod container;
mod error;
mod events;
mod factory;
mod graph;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod service;
mod storage;

pub use cleanup::CleanupHandle;
pub use config::*;
pub use container::*;
pub use error::*;
pub use events::*;
pub use factory::*;
pub use key::*;
pub use service::*;
pub use storage::LocatorStats;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        LifecycleState, LocatorConfig, Result, Service, ServiceClass, ServiceError,
        ServiceEvent, ServiceEventKind, ServiceInitParams, ServiceKey, ServiceLocator,
    };
    pub use std::sync::Arc;
}
