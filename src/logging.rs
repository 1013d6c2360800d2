//! Subscriber setup for the locator's `tracing` output
//!
//! The container logs under the `service_locator` target: registrations,
//! resolutions, failures and shutdowns at `info`/`error`, the resolution walk
//! at `debug`, reference traffic and lifecycle events at `trace` (events move
//! to `info` with [`ServiceLocator::set_detailed_logging`]).
//!
//! Installing a subscriber needs `logging-json` or `logging-pretty`; without
//! them the `init*` functions do nothing and the host application is expected
//! to install its own.
//!
//! ```rust,ignore
//! use service_locator::logging;
//!
//! logging::init_pretty();
//!
//! logging::builder()
//!     .info()
//!     .locator_only()
//!     .compact()
//!     .with_thread_names()
//!     .init();
//! ```
//!
//! [`ServiceLocator::set_detailed_logging`]: crate::ServiceLocator::set_detailed_logging

use tracing::Level;

/// Target every locator log line is emitted under
pub const LOG_TARGET: &str = "service_locator";

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single line
    Compact,
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    respect_env: bool,
    file: bool,
    line_number: bool,
    thread_ids: bool,
    thread_names: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            target: None,
            respect_env: false,
            file: false,
            line_number: false,
            thread_ids: false,
            thread_names: false,
        }
    }
}

impl LoggingBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set log level to TRACE (most verbose)
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Set log level to DEBUG
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Set log level to INFO
    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Set log level to WARN
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Set log level to ERROR (least verbose)
    pub fn error(self) -> Self {
        self.with_level(Level::ERROR)
    }

    /// Keep only events from `target`
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Keep only the locator's own events
    pub fn locator_only(self) -> Self {
        self.with_target_filter(LOG_TARGET)
    }

    /// Let `RUST_LOG` override the configured filter when it is set
    pub fn respect_env(mut self) -> Self {
        self.respect_env = true;
        self
    }

    /// Include file names in log output
    pub fn with_file(mut self) -> Self {
        self.file = true;
        self
    }

    /// Include line numbers in log output
    pub fn with_line_number(mut self) -> Self {
        self.line_number = true;
        self
    }

    /// Include thread IDs in log output
    pub fn with_thread_ids(mut self) -> Self {
        self.thread_ids = true;
        self
    }

    /// Include thread names in log output
    pub fn with_thread_names(mut self) -> Self {
        self.thread_names = true;
        self
    }

    /// Use JSON structured output
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty colored output
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact single-line output
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Filter directive built from level and target, e.g. `service_locator=debug`
    pub fn directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        match self.target {
            Some(target) => format!("{target}={level}"),
            None => level,
        }
    }

    /// Install the subscriber globally.
    ///
    /// Does nothing if a global subscriber is already set. `Json` falls back
    /// to the default text layer when `logging-json` is off.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = if self.respect_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
        } else {
            EnvFilter::new(self.directive())
        };

        let layer = fmt::layer()
            .with_file(self.file)
            .with_line_number(self.line_number)
            .with_thread_ids(self.thread_ids)
            .with_thread_names(self.thread_names)
            .with_target(true);

        let registry = tracing_subscriber::registry().with(filter);
        let _ = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer).try_init(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.compact()).try_init(),
        };
    }

    /// No-op without a subscriber feature
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// New [`LoggingBuilder`]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON when `logging-json` is enabled, pretty otherwise
pub fn init() {
    if cfg!(feature = "logging-json") {
        init_json();
    } else {
        init_pretty();
    }
}

/// JSON lines at `debug`, for aggregated production logs
pub fn init_json() {
    builder().json().debug().respect_env().init();
}

/// Colored multi-line output at `debug`
pub fn init_pretty() {
    builder().pretty().debug().respect_env().init();
}

/// Only the locator's own events, at `debug`
pub fn init_locator_only() {
    builder().locator_only().debug().init();
}
