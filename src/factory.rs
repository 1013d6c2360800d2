//! Instance sources for registrations
//!
//! Every registration is backed by exactly one [`ServiceSource`]: a class
//! descriptor, a factory closure, or an instance supplied up front. The
//! resolver turns it into a concrete `Arc<dyn Service>` through a single
//! [`ServiceSource::create_instance`] call.

use crate::service::DependenciesFn;
use crate::{Service, ServiceClass, ServiceKey, ServiceLocator};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Type-erased factory closure
pub type FactoryFn = Arc<dyn Fn(&ServiceLocator) -> Option<Arc<dyn Service>> + Send + Sync>;

/// Injection callback, run after construction and before `initialize_service`
pub type InjectionFn =
    Arc<dyn Fn(&Arc<dyn Service>, &ServiceLocator) -> std::result::Result<(), String> + Send + Sync>;

/// How a registration obtains its instance
#[derive(Clone)]
pub enum ServiceSource {
    /// Construct from a class descriptor
    Class(ServiceClass),
    /// Call a factory closure
    Factory {
        create: FactoryFn,
        type_name: &'static str,
        dependencies: DependenciesFn,
    },
    /// Use an instance supplied at registration
    Instance {
        instance: Arc<dyn Service>,
        type_name: &'static str,
        dependencies: DependenciesFn,
    },
}

impl ServiceSource {
    /// Source for a class descriptor
    #[inline]
    pub fn class(class: ServiceClass) -> Self {
        Self::Class(class)
    }

    /// Source for a typed factory. `None` from the factory is an invalid instance.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Service,
        F: Fn(&ServiceLocator) -> Option<T> + Send + Sync + 'static,
    {
        Self::Factory {
            create: Arc::new(move |locator: &ServiceLocator| {
                factory(locator).map(|service| Arc::new(service) as Arc<dyn Service>)
            }),
            type_name: std::any::type_name::<T>(),
            dependencies: T::required_dependencies,
        }
    }

    /// Source for an existing instance
    pub fn instance<T: Service>(instance: Arc<T>) -> Self {
        Self::Instance {
            instance,
            type_name: std::any::type_name::<T>(),
            dependencies: T::required_dependencies,
        }
    }

    /// `class`, `factory` or `instance`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Class(_) => "class",
            Self::Factory { .. } => "factory",
            Self::Instance { .. } => "instance",
        }
    }

    /// Concrete type name behind the source
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Class(class) => class.name(),
            Self::Factory { type_name, .. } | Self::Instance { type_name, .. } => *type_name,
        }
    }

    /// Dependencies declared by the source's class
    pub fn declared_dependencies(&self) -> Vec<ServiceKey> {
        let dependencies = match self {
            Self::Class(class) => class.dependencies_fn(),
            Self::Factory { dependencies, .. } | Self::Instance { dependencies, .. } => {
                *dependencies
            }
        };
        dependencies()
    }

    /// Produce the instance. `None` means the source could not build one.
    pub(crate) fn create_instance(&self, locator: &ServiceLocator) -> Option<Arc<dyn Service>> {
        #[cfg(feature = "logging")]
        trace!(
            target: "service_locator",
            source = self.kind(),
            service_type = self.type_name(),
            "Creating service instance"
        );

        match self {
            Self::Class(class) => class.construct(),
            Self::Factory { create, .. } => create(locator),
            Self::Instance { instance, .. } => Some(Arc::clone(instance)),
        }
    }
}

impl fmt::Debug for ServiceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSource")
            .field("kind", &self.kind())
            .field("type_name", &self.type_name())
            .finish()
    }
}
