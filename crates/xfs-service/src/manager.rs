//! Process-level lifecycle: manager session, application handle and the
//! shared dispatcher.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{error, info, warn};
use xfs_config::Config;

use crate::cdm::CdmService;
use crate::dispatcher::EventDispatcher;
use crate::error::{ServiceError, TransportError};
use crate::future::{OpenFuture, XfsFuture};
use crate::ids::AppHandle;
use crate::queue::LoopError;
use crate::reporter::DispatchReporter;
use crate::service::ServiceKind;
use crate::sync::lock;
use crate::telemetry::{self, TelemetryError};
use crate::transport::{DeliverySink, NegotiatedVersion, OpenParams, Transport};

const MANAGER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::manager");

/// Errors raised by [`ServiceManager`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// [`ServiceManager::initialize`] has not run.
    #[error("the service manager is not initialised")]
    NotInitialized,
    /// [`ServiceManager::initialize`] already ran.
    #[error("the service manager is already initialised")]
    AlreadyInitialized,
    /// The manager was shut down and cannot be reused.
    #[error("the service manager has been shut down")]
    ShutDown,
    /// A manager call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Opening or using a service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// A dispatcher worker died.
    #[error(transparent)]
    Worker(#[from] LoopError),
    /// The configured log output could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

#[derive(Debug, Clone)]
enum Lifecycle {
    Idle,
    Running {
        app_handle: AppHandle,
        version: NegotiatedVersion,
    },
    ShutDown,
}

/// Owns the manager session and the dispatcher every service shares.
///
/// Call [`initialize`](Self::initialize) once before opening services and
/// [`shutdown`](Self::shutdown) once when done; a shut-down manager cannot
/// be restarted.
pub struct ServiceManager {
    config: Config,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<EventDispatcher>,
    lifecycle: Mutex<Lifecycle>,
}

impl ServiceManager {
    /// Builds a manager that reports dispatch activity through `tracing`.
    #[must_use]
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&transport)));
        Self::assemble(config, transport, dispatcher)
    }

    /// Builds a manager with a custom dispatch reporter.
    #[must_use]
    pub fn with_reporter(
        config: Config,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn DispatchReporter>,
    ) -> Self {
        let dispatcher = Arc::new(EventDispatcher::with_reporter(
            Arc::clone(&transport),
            reporter,
        ));
        Self::assemble(config, transport, dispatcher)
    }

    const fn assemble(
        config: Config,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            config,
            transport,
            dispatcher,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Sets up log output, starts the manager session, creates the
    /// application handle and starts routing manager messages to the
    /// dispatcher.
    ///
    /// Partially completed steps are undone on failure.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AlreadyInitialized`] or
    /// [`ManagerError::ShutDown`] for lifecycle misuse,
    /// [`ManagerError::Telemetry`] for an invalid log filter, otherwise the
    /// failing transport call.
    pub fn initialize(&self) -> Result<NegotiatedVersion, ManagerError> {
        let mut lifecycle = lock(&self.lifecycle);
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running { .. } => return Err(ManagerError::AlreadyInitialized),
            Lifecycle::ShutDown => return Err(ManagerError::ShutDown),
        }

        let owner = telemetry::initialise(&self.config)?;
        info!(target: MANAGER_TARGET, ?owner, "log output ready");
        let version = self
            .transport
            .start_up(self.config.required_versions())?;
        let app_handle = match self.transport.create_app_handle() {
            Ok(handle) => handle,
            Err(create_error) => {
                if let Err(cleanup_error) = self.transport.clean_up() {
                    self.log_failure("clean_up", &cleanup_error);
                }
                return Err(create_error.into());
            }
        };
        let sink: Arc<dyn DeliverySink> = Arc::<EventDispatcher>::clone(&self.dispatcher);
        if let Err(attach_error) = self.transport.attach(sink) {
            if let Err(destroy_error) = self.transport.destroy_app_handle(app_handle) {
                self.log_failure("destroy_app_handle", &destroy_error);
            }
            if let Err(cleanup_error) = self.transport.clean_up() {
                self.log_failure("clean_up", &cleanup_error);
            }
            return Err(attach_error.into());
        }

        info!(
            target: MANAGER_TARGET,
            version = %version.version,
            app_handle = %app_handle,
            "manager session started"
        );
        *lifecycle = Lifecycle::Running {
            app_handle,
            version: version.clone(),
        };
        Ok(version)
    }

    /// Opens `logical_name` as a service of class `kind`, using the
    /// configured application id, trace level, timeout and version range.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotInitialized`] before
    /// [`initialize`](Self::initialize), otherwise the dispatcher's
    /// submission failure.
    pub fn open(&self, logical_name: &str, kind: ServiceKind) -> Result<OpenFuture, ManagerError> {
        let app_handle = self.app_handle()?;
        let params = OpenParams::new(logical_name)
            .with_app_handle(app_handle)
            .with_app_id(self.config.app_id())
            .with_trace_level(self.config.trace_level())
            .with_timeout(self.config.open_timeout())
            .with_versions_required(self.config.required_versions());
        Ok(self.dispatcher.open(&params, kind)?)
    }

    /// Opens `logical_name` as a cash dispenser and waits for the open and
    /// registration to finish.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open), plus any failure completing the open.
    pub fn open_cdm(&self, logical_name: &str) -> Result<CdmService, ManagerError> {
        let service = self.open(logical_name, ServiceKind::Cdm)?.get()?;
        Ok(CdmService::new(service)?)
    }

    /// Dispatcher shared by every service.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Version negotiated with the manager, while running.
    #[must_use]
    pub fn negotiated_version(&self) -> Option<NegotiatedVersion> {
        match &*lock(&self.lifecycle) {
            Lifecycle::Running { version, .. } => Some(version.clone()),
            Lifecycle::Idle | Lifecycle::ShutDown => None,
        }
    }

    /// Closes every service, stops the dispatcher, then releases the
    /// application handle and the manager session.
    ///
    /// Every step runs even when an earlier one fails; failures are logged
    /// and the first one is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotInitialized`] when the manager never
    /// started, otherwise the first teardown failure.
    pub fn shutdown(&self) -> Result<(), ManagerError> {
        let app_handle = {
            let mut lifecycle = lock(&self.lifecycle);
            match std::mem::replace(&mut *lifecycle, Lifecycle::ShutDown) {
                Lifecycle::Running { app_handle, .. } => app_handle,
                Lifecycle::Idle => {
                    *lifecycle = Lifecycle::Idle;
                    return Err(ManagerError::NotInitialized);
                }
                Lifecycle::ShutDown => return Err(ManagerError::ShutDown),
            }
        };

        info!(target: MANAGER_TARGET, "shutting down");
        let mut first_failure: Option<ManagerError> = None;
        if let Err(stop_error) = self.dispatcher.stop() {
            error!(target: MANAGER_TARGET, error = %stop_error, "dispatcher ended abnormally");
            first_failure.get_or_insert(stop_error.into());
        }
        self.transport.detach();
        for (operation, outcome) in [
            (
                "destroy_app_handle",
                self.transport.destroy_app_handle(app_handle),
            ),
            ("clean_up", self.transport.clean_up()),
        ] {
            if let Err(teardown_error) = outcome {
                self.log_failure(operation, &teardown_error);
                first_failure.get_or_insert(teardown_error.into());
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    fn app_handle(&self) -> Result<AppHandle, ManagerError> {
        match &*lock(&self.lifecycle) {
            Lifecycle::Running { app_handle, .. } => Ok(*app_handle),
            Lifecycle::Idle => Err(ManagerError::NotInitialized),
            Lifecycle::ShutDown => Err(ManagerError::ShutDown),
        }
    }

    fn log_failure(&self, operation: &str, failure: &TransportError) {
        warn!(
            target: MANAGER_TARGET,
            operation,
            error = %failure,
            app_id = %self.config.app_id(),
            "manager teardown step failed"
        );
    }
}
