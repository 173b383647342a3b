use crate::error::EmitError;
use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use tracing::Level;

/// Which destination a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Console,
    RotatingFile,
    RemoteHttp,
    /// Any sink added through [`LoggerBuilder::sink`](crate::logger::LoggerBuilder::sink).
    Custom(&'static str),
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Console => f.write_str("console"),
            SinkKind::RotatingFile => f.write_str("rotating-file"),
            SinkKind::RemoteHttp => f.write_str("remote-http"),
            SinkKind::Custom(name) => f.write_str(name),
        }
    }
}

/// Output destination the [`Logger`](crate::logger::Logger) fans records
/// out to.
///
/// `emit` is called synchronously on the logging thread, so
/// implementations must not block on network I/O; sinks that talk to the
/// network hand records to a background task instead (see
/// [`Forwarder`](crate::forwarder::Forwarder)). Implementations serialize
/// their own writes.
#[async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Least severe level this sink accepts.
    fn threshold(&self) -> Level;

    /// Whether a record at `level` passes this sink's threshold.
    ///
    /// `tracing` orders levels by verbosity, so `ERROR` is the smallest.
    fn accepts(&self, level: Level) -> bool {
        level <= self.threshold()
    }

    /// Write a single record.
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError>;

    /// Wait until previously emitted records are written out.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), EmitError> {
        Ok(())
    }
}

/// Asynchronous delivery of [`LogRecord`]s to a network backend.
///
/// Called from the forwarder's background task and never awaited on the
/// application thread.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single log record to the underlying backend.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, serialization
    ///   error, HTTP status, etc.). The forwarder treats this as a
    ///   transient failure and retries with backoff.
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>>;
}
