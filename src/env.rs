//! Environment variable names read when a [`LoggerConfig`] is resolved
//! from the process environment.
//!
//! These are purely helpers; the logger itself never reads the
//! environment, it only sees the resolved config.
//!
//! [`LoggerConfig`]: crate::config::LoggerConfig

/// Deployment environment name, e.g. `production`.
pub const ENVIRONMENT_ENV: &str = "NODE_ENV";

/// Directory for the rotating file sink.
pub const LOGS_FOLDER_ENV: &str = "LOGS_FOLDER";

/// API key for the remote intake. Its presence enables the remote sink.
pub const REMOTE_API_KEY_ENV: &str = "DD_API_KEY";

/// Read an environment variable, treating an empty value as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
