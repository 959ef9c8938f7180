//! Process-wide log output for the engine.
//!
//! [`ServiceManager::initialize`](crate::ServiceManager::initialize) calls
//! [`initialise`] with its configuration. A host that installed its own
//! `tracing` subscriber first keeps it; the engine only fills the gap.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use xfs_config::{Config, LogFormat};

static OWNER: OnceCell<SubscriberOwner> = OnceCell::new();

/// Who installed the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberOwner {
    /// The engine installed a subscriber built from [`Config`].
    Engine,
    /// The host process had already installed one.
    Host,
}

/// Errors encountered while configuring log output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Expression taken from the configuration.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// Validates the configured filter and, on the first successful call,
/// installs a subscriber unless the host already has one.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when `log_filter` is not a valid
/// filter expression. The filter is checked on every call, including calls
/// made after a subscriber is in place.
pub fn initialise(config: &Config) -> Result<SubscriberOwner, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    Ok(*OWNER.get_or_init(|| install(config.log_format(), filter)))
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        filter: expression.to_owned(),
        message: error.to_string(),
    })
}

fn install(format: LogFormat, filter: EnvFilter) -> SubscriberOwner {
    match tracing::subscriber::set_global_default(build(format, filter)) {
        Ok(()) => SubscriberOwner::Engine,
        Err(_) => SubscriberOwner::Host,
    }
}

fn build(format: LogFormat, filter: EnvFilter) -> Box<dyn Subscriber + Send + Sync> {
    // Service workers are named after their service, so thread names
    // identify the dispatcher behind each record.
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    }
}
