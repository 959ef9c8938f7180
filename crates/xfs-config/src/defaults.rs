use crate::logging::LogFormat;
use crate::version::VersionRange;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Application identifier announced to service providers when none is configured.
pub const DEFAULT_APP_ID: &str = "xfs-service";

/// Trace level passed with open requests. Zero disables provider tracing.
pub const DEFAULT_TRACE_LEVEL: u32 = 0;

/// Open timeout in milliseconds. Zero waits indefinitely.
pub const DEFAULT_OPEN_TIMEOUT_MS: u32 = 0;

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned application identifier used by serde defaults.
pub fn default_app_id_string() -> String {
    DEFAULT_APP_ID.to_owned()
}

/// Version range requested from the manager and from each service.
pub const fn default_required_versions() -> VersionRange {
    VersionRange::SUPPORTED
}
