use crate::error::EmitError;
use crate::record::{level_name, LogRecord};
use crate::sink::{Sink, SinkKind};
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::Level;

/// Human-readable sink: `level - timestamp - jsonMessage`, with the level
/// colorized and the message indented by two spaces.
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
    threshold: Level,
    colorize: bool,
}

impl ConsoleSink {
    pub fn stdout(threshold: Level, colorize: bool) -> Self {
        Self::with_writer(io::stdout(), threshold, colorize)
    }

    pub fn with_writer(writer: impl Write + Send + 'static, threshold: Level, colorize: bool) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            threshold,
            colorize,
        }
    }

    pub fn format_line(&self, record: &LogRecord) -> Result<String, EmitError> {
        let level = if self.colorize {
            colorize(&record.level)
        } else {
            level_name(&record.level).to_string()
        };
        Ok(format!(
            "{} - {} - {}",
            level,
            record.formatted_timestamp(),
            record.message_json(2)?
        ))
    }
}

impl Sink for ConsoleSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Console
    }

    fn threshold(&self) -> Level {
        self.threshold
    }

    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        let line = self.format_line(record)?;
        let mut writer = self.writer.lock().map_err(|_| EmitError::Poisoned)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

fn colorize(level: &Level) -> String {
    let code = match *level {
        Level::ERROR => 31,
        Level::WARN => 33,
        Level::INFO => 32,
        Level::DEBUG => 34,
        Level::TRACE => 35,
    };
    format!("\x1b[{}m{}\x1b[39m", code, level_name(level))
}
