use crate::env::{ENVIRONMENT_ENV, LOGS_FOLDER_ENV, REMOTE_API_KEY_ENV};
use crate::error::ConfigurationError;
use crate::file::RotationPolicy;
use crate::forwarder::QueueConfig;
use std::path::PathBuf;
use tracing::Level;

pub const DEFAULT_ENV: &str = "dev";
pub const DEFAULT_LOGS_FOLDER: &str = "logs";

/// Remote intake host records are posted to.
pub const DEFAULT_INTAKE_URL: &str = "https://http-intake.logs.datadoghq.com";

/// `ddsource` tag sent with every remote record.
pub const DEFAULT_SOURCE: &str = "rust";

/// Logger configuration, resolved once at process entry.
///
/// Build it explicitly with [`LoggerConfig::new`] and the `with_*`
/// methods, or from the environment with [`LoggerConfig::from_env`].
/// Explicit values always win over the environment, which wins over the
/// defaults (`env = "dev"`, `logs_folder = "logs"`).
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub service: String,
    pub env: String,
    pub logs_folder: PathBuf,
    /// Enables the remote sink when set.
    pub remote_api_key: Option<String>,
    pub sinks: SinkSettings,
}

impl LoggerConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            env: DEFAULT_ENV.to_string(),
            logs_folder: PathBuf::from(DEFAULT_LOGS_FOLDER),
            remote_api_key: None,
            sinks: SinkSettings::default(),
        }
    }

    /// Resolve from the process environment.
    ///
    /// The service name is never read from the environment: `None`, an
    /// empty or a blank name is [`ConfigurationError::MissingService`].
    pub fn from_env(service: Option<&str>) -> Result<Self, ConfigurationError> {
        Self::from_lookup(service, crate::env::env_opt)
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup<F>(service: Option<&str>, lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let service = service.ok_or(ConfigurationError::MissingService)?;

        let mut config = Self::new(service);
        if let Some(env) = get(ENVIRONMENT_ENV) {
            config.env = env;
        }
        if let Some(folder) = get(LOGS_FOLDER_ENV) {
            config.logs_folder = PathBuf::from(folder);
        }
        config.remote_api_key = get(REMOTE_API_KEY_ENV);
        config.validate()?;
        Ok(config)
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    pub fn with_logs_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.logs_folder = folder.into();
        self
    }

    pub fn with_remote_api_key(mut self, key: impl Into<String>) -> Self {
        self.remote_api_key = Some(key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn with_sinks(mut self, sinks: SinkSettings) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.service.trim().is_empty() {
            return Err(ConfigurationError::MissingService);
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

/// Per-sink thresholds and policies.
///
/// The remote sink defaults to `INFO` while the local sinks take
/// `DEBUG`.
#[derive(Clone, Debug)]
pub struct SinkSettings {
    pub console_level: Level,
    pub console_colors: bool,
    pub file_level: Level,
    pub rotation: RotationPolicy,
    pub remote_level: Level,
    pub remote: RemoteSettings,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            console_level: Level::DEBUG,
            console_colors: true,
            file_level: Level::DEBUG,
            rotation: RotationPolicy::default(),
            remote_level: Level::INFO,
            remote: RemoteSettings::default(),
        }
    }
}

/// Where and how the remote sink ships records.
#[derive(Clone, Debug)]
pub struct RemoteSettings {
    pub intake_url: String,
    pub source: String,
    pub queue: QueueConfig,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            intake_url: DEFAULT_INTAKE_URL.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            queue: QueueConfig::default(),
        }
    }
}
