//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section; every field has a default so an empty file is a valid config.

pub mod logging;
pub mod queue;
pub mod worker;

use serde::{Deserialize, Serialize};

use self::logging::LoggingConfig;
use self::queue::QueueConfig;
use self::worker::WorkerConfig;

use crate::error::AppError;

/// Prefix of environment variables overriding file settings,
/// e.g. `TASKCHAIN__WORKER__MAX_ATTEMPTS=5`.
pub const ENV_PREFIX: &str = "TASKCHAIN";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Executor pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Persistent queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Sources, later ones winning: `config/default.toml` if present, the
    /// explicit `path` if given (must exist), then `TASKCHAIN__*` environment
    /// variables. The result is validated before it is returned.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without consulting files or
    /// the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, AppError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Cross-section validation.
    pub fn validate(&self) -> Result<(), AppError> {
        self.worker.validate()?;

        // A timed-out execution keeps its slot for the cancel grace, so the
        // lease has to cover both or the job is handed out while still running.
        let held = self
            .worker
            .per_job_timeout()
            .saturating_add(self.worker.cancel_grace());
        if self.queue.lease() <= held {
            return Err(AppError::configuration(format!(
                "queue.lease_seconds ({}) must exceed worker.per_job_timeout_seconds ({}) plus worker.cancel_grace_ms ({})",
                self.queue.lease_seconds,
                self.worker.per_job_timeout_seconds,
                self.worker.cancel_grace_ms
            )));
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(AppError::configuration(format!(
                "logging.format must be 'json' or 'pretty', got '{other}'"
            ))),
        }
    }
}
