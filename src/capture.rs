use crate::error::EmitError;
use crate::record::LogRecord;
use crate::sink::{Sink, SinkKind};
use std::sync::{Arc, Mutex};
use tracing::Level;

/// A sink that keeps every record in memory.
///
/// Useful for asserting on what a service logged in tests without
/// touching the console, disk or network.
#[derive(Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
    threshold: Level,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(Level::TRACE)
    }
}

impl MemorySink {
    pub fn new(threshold: Level) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            threshold,
        }
    }

    /// Snapshot of the records captured so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl Sink for MemorySink {
    fn kind(&self) -> SinkKind {
        SinkKind::Custom("memory")
    }

    fn threshold(&self) -> Level {
        self.threshold
    }

    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        self.records
            .lock()
            .map_err(|_| EmitError::Poisoned)?
            .push(record.clone());
        Ok(())
    }
}
