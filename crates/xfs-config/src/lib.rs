//! Shared configuration for the XFS service engine.
//!
//! Settings are layered by `ortho_config`: built-in defaults, then a TOML
//! file (discovered, or named with `--config-path` / `XFS_CONFIG_PATH`),
//! then `XFS_*` environment variables, then command-line flags. Later layers
//! override earlier ones.

mod defaults;
mod logging;
mod version;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_APP_ID, DEFAULT_LOG_FILTER, DEFAULT_OPEN_TIMEOUT_MS, DEFAULT_TRACE_LEVEL,
    default_app_id_string, default_log_filter_string, default_log_format,
    default_required_versions,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use version::{VersionParseError, VersionRange, XfsVersion};

/// Runtime configuration consumed by the service manager and telemetry.
///
/// Load it with `Config::load` or, when the caller owns the argument list,
/// `Config::load_from_iter`. Both return `Arc<ortho_config::OrthoError>` on
/// failure, aggregating every file, environment, and flag error found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "XFS")]
pub struct Config {
    /// Tracing filter expression, e.g. `info,xfs_service=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Application identifier sent with every open request.
    #[ortho_config(default = default_app_id_string())]
    pub app_id: String,
    /// Provider trace level sent with every open request.
    #[ortho_config(default = DEFAULT_TRACE_LEVEL)]
    pub trace_level: u32,
    /// Open timeout in milliseconds; zero waits indefinitely.
    #[ortho_config(default = DEFAULT_OPEN_TIMEOUT_MS)]
    pub open_timeout_ms: u32,
    /// Version range requested at start-up and for each open, e.g.
    /// `3.00-3.30`.
    #[ortho_config(default = default_required_versions())]
    pub required_versions: VersionRange,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            app_id: default_app_id_string(),
            trace_level: DEFAULT_TRACE_LEVEL,
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            required_versions: default_required_versions(),
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Application identifier sent with open requests.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Provider trace level.
    #[must_use]
    pub const fn trace_level(&self) -> u32 {
        self.trace_level
    }

    /// Open timeout, or `None` to wait indefinitely.
    #[must_use]
    pub fn open_timeout(&self) -> Option<Duration> {
        (self.open_timeout_ms > 0).then(|| Duration::from_millis(u64::from(self.open_timeout_ms)))
    }

    /// Version range requested from the manager and providers.
    #[must_use]
    pub const fn required_versions(&self) -> VersionRange {
        self.required_versions
    }
}
