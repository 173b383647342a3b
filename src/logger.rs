use crate::config::LoggerConfig;
use crate::console::ConsoleSink;
use crate::error::{LoggerError, SinkInitError};
use crate::file::RotatingFileSink;
use crate::record::{DefaultMeta, LogRecord};
use crate::remote::RemoteHttpSink;
use crate::sink::{Sink, SinkKind, Transport};
use serde_json::Value;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Level;

/// Build a logger from an explicit configuration.
///
/// Always attaches a console sink and a rotating file sink; attaches the
/// remote sink only when `config.remote_api_key` is set. Emits one
/// `debug` record announcing the environment.
///
/// **Errors**
/// - [`LoggerError::Configuration`] if `config.service` is empty.
/// - [`LoggerError::SinkInitialization`] if a sink cannot be built, e.g.
///   the log directory is not writable, or the remote sink is enabled
///   outside a Tokio runtime.
pub fn create_logger(config: LoggerConfig) -> Result<Logger, LoggerError> {
    LoggerBuilder::new(config).build()
}

/// Resolve a [`LoggerConfig`] from the environment, then build it.
///
/// `service` is required; `None` fails with
/// [`LoggerError::Configuration`] whatever the environment holds.
pub fn create_logger_from_env(service: Option<&str>) -> Result<Logger, LoggerError> {
    create_logger(LoggerConfig::from_env(service)?)
}

/// Something that accepts whole lines of text, such as an access-log
/// formatter's output.
pub trait LineWriter: Send + Sync {
    fn write(&self, line: &str);
}

/// Handle to a configured set of sinks.
///
/// Cloning is cheap; every clone shares the same sinks. Records are
/// fanned out to every sink whose threshold admits them. A failing sink
/// never affects the caller or the other sinks.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    config: LoggerConfig,
    meta: DefaultMeta,
    sinks: Vec<Arc<dyn Sink>>,
    emit_failures: AtomicU64,
}

impl Logger {
    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    /// Fields merged into every record.
    pub fn default_meta(&self) -> &DefaultMeta {
        &self.inner.meta
    }

    pub fn sink_count(&self) -> usize {
        self.inner.sinks.len()
    }

    pub fn sink_kinds(&self) -> Vec<SinkKind> {
        self.inner.sinks.iter().map(|s| s.kind()).collect()
    }

    /// Most verbose level any sink accepts.
    pub fn max_level(&self) -> Option<Level> {
        self.inner.sinks.iter().map(|s| s.threshold()).max()
    }

    /// Records that a sink failed to accept since construction.
    pub fn emit_failures(&self) -> u64 {
        self.inner.emit_failures.load(Ordering::Relaxed)
    }

    /// Emit `message` at `level`. Strings are logged as-is; structured
    /// values (`serde_json::json!`) keep their shape.
    pub fn log(&self, level: Level, message: impl Into<Value>) {
        let record = LogRecord::new(level, message.into(), self.inner.meta.clone());
        self.dispatch(&record);
    }

    pub fn error(&self, message: impl Into<Value>) {
        self.log(Level::ERROR, message);
    }

    pub fn warn(&self, message: impl Into<Value>) {
        self.log(Level::WARN, message);
    }

    pub fn info(&self, message: impl Into<Value>) {
        self.log(Level::INFO, message);
    }

    pub fn debug(&self, message: impl Into<Value>) {
        self.log(Level::DEBUG, message);
    }

    /// Fan a fully built record out to the sinks.
    pub fn dispatch(&self, record: &LogRecord) {
        for sink in &self.inner.sinks {
            if !sink.accepts(record.level) {
                continue;
            }
            if let Err(e) = sink.emit(record) {
                self.inner.emit_failures.fetch_add(1, Ordering::Relaxed);
                eprintln!("{} sink failed to emit log record: {}", sink.kind(), e);
            }
        }
    }

    /// Wait for sinks that buffer (the remote sink) to drain.
    pub async fn flush(&self) {
        for sink in &self.inner.sinks {
            if let Err(e) = sink.flush().await {
                eprintln!("{} sink failed to flush: {}", sink.kind(), e);
            }
        }
    }

    /// An [`io::Write`] adapter: each complete line becomes one `info`
    /// record.
    pub fn stream(&self) -> LogStream {
        LogStream {
            logger: self.clone(),
            pending: Vec::new(),
        }
    }
}

impl LineWriter for Logger {
    /// Log `line` at `info`, without its trailing newline.
    fn write(&self, line: &str) {
        self.info(line.trim_end_matches(['\r', '\n']));
    }
}

/// Line-buffered [`io::Write`] over a [`Logger`].
///
/// A trailing partial line is logged on `flush` or drop.
pub struct LogStream {
    logger: Logger,
    pending: Vec<u8>,
}

impl LogStream {
    fn emit_pending_line(&mut self, end: usize) {
        let line: Vec<u8> = self.pending.drain(..end).collect();
        LineWriter::write(&self.logger, &String::from_utf8_lossy(&line));
    }
}

impl Write for LogStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            self.emit_pending_line(pos + 1);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let end = self.pending.len();
            self.emit_pending_line(end);
        }
        Ok(())
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        let _ = Write::flush(self);
    }
}

/// Step-by-step construction of a [`Logger`].
///
/// Besides the fixed console/file/remote set, lets callers redirect the
/// console, swap the remote transport or add their own sinks.
pub struct LoggerBuilder {
    config: LoggerConfig,
    host: Option<String>,
    console_writer: Option<Box<dyn Write + Send>>,
    remote_transport: Option<Arc<dyn Transport>>,
    extra_sinks: Vec<Arc<dyn Sink>>,
}

impl LoggerBuilder {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            host: None,
            console_writer: None,
            remote_transport: None,
            extra_sinks: Vec::new(),
        }
    }

    /// Override the resolved machine hostname.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Write console output somewhere other than stdout.
    pub fn console_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.console_writer = Some(Box::new(writer));
        self
    }

    /// Deliver remote records through `transport` instead of the default
    /// HTTPS intake client. Only used when a remote API key is configured.
    pub fn remote_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.remote_transport = Some(transport);
        self
    }

    /// Attach an additional sink after the built-in ones.
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<Logger, LoggerError> {
        let config = self.config;
        config.validate()?;

        let meta = DefaultMeta {
            env: config.env.clone(),
            host: self.host.unwrap_or_else(resolve_hostname),
            service: config.service.clone(),
        };

        let settings = &config.sinks;
        let console = match self.console_writer {
            Some(writer) => ConsoleSink::with_writer(writer, settings.console_level, settings.console_colors),
            None => ConsoleSink::stdout(settings.console_level, settings.console_colors),
        };
        let file = RotatingFileSink::new(
            &config.logs_folder,
            &config.service,
            settings.rotation.clone(),
            settings.file_level,
        )?;

        let mut sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(console), Arc::new(file)];

        if let Some(api_key) = &config.remote_api_key {
            let transport = match self.remote_transport {
                Some(transport) => transport,
                None => intake_transport(&config, api_key)?,
            };
            let remote = RemoteHttpSink::new(
                transport,
                settings.remote.queue.clone(),
                settings.remote_level,
            )?;
            sinks.push(Arc::new(remote));
        }

        sinks.extend(self.extra_sinks);

        let logger = Logger {
            inner: Arc::new(LoggerInner {
                config,
                meta,
                sinks,
                emit_failures: AtomicU64::new(0),
            }),
        };
        logger.debug(format!("Environment: {}", logger.default_meta().env));
        Ok(logger)
    }
}

#[cfg(feature = "remote")]
fn intake_transport(config: &LoggerConfig, api_key: &str) -> Result<Arc<dyn Transport>, SinkInitError> {
    let transport = crate::remote::IntakeTransport::new(
        &config.sinks.remote.intake_url,
        api_key,
        &config.sinks.remote.source,
        &config.service,
    )?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "remote"))]
fn intake_transport(_config: &LoggerConfig, _api_key: &str) -> Result<Arc<dyn Transport>, SinkInitError> {
    Err(SinkInitError::RemoteFeatureDisabled)
}

fn resolve_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
