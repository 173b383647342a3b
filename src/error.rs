use std::io;
use std::path::PathBuf;

/// Invalid logger configuration, detected before any sink is built.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("missing mandatory parameter: service")]
    MissingService,
}

/// A sink could not be constructed.
#[derive(thiserror::Error, Debug)]
pub enum SinkInitError {
    #[error("cannot prepare log directory {path}: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("remote sink requires a running Tokio runtime")]
    NoRuntime,

    #[error("remote feature is not enabled")]
    RemoteFeatureDisabled,

    #[cfg(feature = "remote")]
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Error returned by [`create_logger`](crate::logger::create_logger).
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    SinkInitialization(#[from] SinkInitError),
}

/// Failure to hand a single record to a sink.
///
/// The logger absorbs these; they never reach application code.
#[derive(thiserror::Error, Debug)]
pub enum EmitError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink lock poisoned")]
    Poisoned,

    #[error("remote queue full, record dropped")]
    QueueFull,

    #[error("remote worker stopped")]
    WorkerStopped,
}
