pub mod config;
pub mod env;
pub mod error;
pub mod record;
pub mod sink;

pub mod console;
pub mod file;
pub mod forwarder;
pub mod remote;

pub mod capture;
pub mod layer;
pub mod logger;
pub mod init;

pub mod docs;
pub mod middleware;

pub use config::LoggerConfig;
pub use error::{ConfigurationError, LoggerError, SinkInitError};
pub use logger::{create_logger, create_logger_from_env, LineWriter, Logger, LoggerBuilder};
