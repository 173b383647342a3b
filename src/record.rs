use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::Level;

/// Timestamp layout shared by every sink (`MM-DD-YYYY HH:mm:ss`).
pub const TIMESTAMP_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

/// Metadata merged into every record a [`Logger`](crate::logger::Logger)
/// emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultMeta {
    pub env: String,
    pub host: String,
    pub service: String,
}

/// A single log record as seen by sinks.
///
/// Serializes to a flat JSON object:
/// `{"level", "timestamp", "message", "env", "host", "service", ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    #[serde(serialize_with = "serialize_level")]
    pub level: Level,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Local>,
    /// Free-form body: a plain string or a structured mapping.
    pub message: serde_json::Value,
    #[serde(flatten)]
    pub meta: DefaultMeta,
    /// Originating `tracing` target, for records captured by the layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    pub fn new(level: Level, message: serde_json::Value, meta: DefaultMeta) -> Self {
        Self {
            level,
            timestamp: Local::now(),
            message,
            meta,
            target: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Message body as JSON indented by `indent` spaces.
    pub fn message_json(&self, indent: usize) -> Result<String, serde_json::Error> {
        to_indented_json(&self.message, indent)
    }
}

/// Lowercase level name, e.g. `info`.
pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

pub(crate) fn to_indented_json<T: Serialize + ?Sized>(
    value: &T,
    indent: usize,
) -> Result<String, serde_json::Error> {
    let indent = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser)?;
    // serde_json only ever writes valid UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn serialize_level<S: Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(level_name(level))
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}
