//! Error types for the service locator

use crate::{LifecycleState, ServiceKey};
use thiserror::Error;

/// Errors that can occur while registering, resolving or shutting down services.
///
/// None of these unwind: every failure is returned to the immediate caller and,
/// for lifecycle failures, leaves the registration in [`LifecycleState::Failed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Bad key, factory or instance supplied at registration time
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key collision at registration time
    #[error("Service already registered: {key}")]
    AlreadyRegistered { key: ServiceKey },

    /// No registration exists for the key
    #[error("Service not registered: {key}")]
    NotRegistered { key: ServiceKey },

    /// A declared dependency has no registration
    #[error("Missing dependency {dependency} for {key}")]
    MissingDependency {
        key: ServiceKey,
        dependency: ServiceKey,
    },

    /// A declared dependency could not be brought to `Ready`
    #[error("Dependency {dependency} failed for {key}")]
    DependencyFailed {
        key: ServiceKey,
        dependency: ServiceKey,
    },

    /// The resolver re-entered a key already on the current resolution chain
    #[error("Circular dependency detected while resolving {key}: {}", display_path(.path))]
    CircularDependency {
        key: ServiceKey,
        path: Vec<ServiceKey>,
    },

    /// The resolution chain exceeded the configured depth limit
    #[error("Dependency chain too deep while resolving {key} (depth {depth})")]
    DepthExceeded { key: ServiceKey, depth: usize },

    /// The factory produced no instance
    #[error("Invalid instance for {key}")]
    InvalidInstance { key: ServiceKey },

    /// The injection callback reported an error
    #[error("Dependency injection failed for {key}: {reason}")]
    InjectionFailure { key: ServiceKey, reason: String },

    /// The service's own `initialize_service` returned false
    #[error("initialize_service() returned false for {key}")]
    UserInitializationFailure { key: ServiceKey },

    /// Shutdown requested while consumers still hold references
    #[error("Shutdown refused for {key}: {references} outstanding references")]
    ShutdownRefused { key: ServiceKey, references: u32 },

    /// The service is in a state the resolver will not advance from
    #[error("Service {key} is unavailable ({state})")]
    Unavailable {
        key: ServiceKey,
        state: LifecycleState,
    },

    /// Validation report for a registration sitting in `Failed`
    #[error("Service {key} failed")]
    ServiceFailed { key: ServiceKey },

    /// Typed access requested a different concrete type
    #[error("Service {key} is not a {expected}")]
    TypeMismatch {
        key: ServiceKey,
        expected: &'static str,
    },
}

impl ServiceError {
    /// Create an InvalidArgument error
    #[inline]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// Create an InjectionFailure error
    #[inline]
    pub fn injection_failure(key: &ServiceKey, reason: impl Into<String>) -> Self {
        Self::InjectionFailure {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Create a TypeMismatch error for `T`
    #[inline]
    pub fn type_mismatch<T: 'static>(key: &ServiceKey) -> Self {
        Self::TypeMismatch {
            key: key.clone(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// The key this error is about, if any
    pub fn key(&self) -> Option<&ServiceKey> {
        match self {
            Self::InvalidArgument(_) => None,
            Self::AlreadyRegistered { key }
            | Self::NotRegistered { key }
            | Self::MissingDependency { key, .. }
            | Self::DependencyFailed { key, .. }
            | Self::CircularDependency { key, .. }
            | Self::DepthExceeded { key, .. }
            | Self::InvalidInstance { key }
            | Self::InjectionFailure { key, .. }
            | Self::UserInitializationFailure { key }
            | Self::ShutdownRefused { key, .. }
            | Self::Unavailable { key, .. }
            | Self::ServiceFailed { key }
            | Self::TypeMismatch { key, .. } => Some(key),
        }
    }

    /// Whether this failure moves the registration into `Failed`
    pub fn is_lifecycle_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency { .. }
                | Self::DependencyFailed { .. }
                | Self::CircularDependency { .. }
                | Self::DepthExceeded { .. }
                | Self::InvalidInstance { .. }
                | Self::InjectionFailure { .. }
                | Self::UserInitializationFailure { .. }
        )
    }
}

fn display_path(path: &[ServiceKey]) -> String {
    path.iter()
        .map(ServiceKey::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type alias for locator operations
pub type Result<T> = std::result::Result<T, ServiceError>;
