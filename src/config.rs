//! Container configuration

use std::time::Duration;

/// Default period of the background cleanup pass
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Default cap on the length of one resolution chain
pub const DEFAULT_MAX_DEPENDENCY_DEPTH: usize = 16;

/// Settings for a [`ServiceLocator`](crate::ServiceLocator).
///
/// # Examples
///
/// ```rust
/// use service_locator::{LocatorConfig, ServiceLocator};
/// use std::time::Duration;
///
/// let config = LocatorConfig::new()
///     .with_cleanup_interval(Duration::from_secs(5))
///     .with_max_dependency_depth(32)
///     .detailed_logging(true);
///
/// let locator = ServiceLocator::with_config(config);
/// assert_eq!(locator.config().max_dependency_depth, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Log every lifecycle event at `info` instead of `trace`
    pub detailed_logging: bool,
    /// Period of [`ServiceLocator::spawn_cleanup`](crate::ServiceLocator::spawn_cleanup)
    pub cleanup_interval: Duration,
    /// Longest dependency chain the resolver will follow
    pub max_dependency_depth: usize,
    /// Pre-allocated registry capacity
    pub initial_capacity: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            detailed_logging: false,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_dependency_depth: DEFAULT_MAX_DEPENDENCY_DEPTH,
            initial_capacity: 0,
        }
    }
}

impl LocatorConfig {
    /// Default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle verbose event logging
    pub fn detailed_logging(mut self, enable: bool) -> Self {
        self.detailed_logging = enable;
        self
    }

    /// Set the background cleanup period
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the resolution depth cap (at least 1)
    pub fn with_max_dependency_depth(mut self, depth: usize) -> Self {
        self.max_dependency_depth = depth.max(1);
        self
    }

    /// Pre-allocate room for `capacity` registrations
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
