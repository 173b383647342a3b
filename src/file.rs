use crate::error::{EmitError, SinkInitError};
use crate::record::{level_name, LogRecord};
use crate::sink::{Sink, SinkKind};
use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// When to roll over and prune log files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Days of files to keep, today included.
    pub max_age_days: u32,
    /// Size cap for a single file, in bytes.
    pub max_file_size: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_age_days: 15,
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

/// Plain-text sink writing `level - timestamp - host - jsonMessage` lines
/// into `<dir>/<service>-<YYYY-MM-DD>.log`, one file per calendar day.
///
/// A file that reaches the size cap continues in
/// `<service>-<YYYY-MM-DD>.log.1`, `.log.2`, and so on. Files are never
/// compressed.
pub struct RotatingFileSink {
    file: Mutex<RollingFile>,
    threshold: Level,
}

impl RotatingFileSink {
    /// Create the log directory and open today's file.
    ///
    /// Fails if the directory cannot be created or the file cannot be
    /// opened for appending.
    pub fn new(
        dir: impl Into<PathBuf>,
        service: &str,
        policy: RotationPolicy,
        threshold: Level,
    ) -> Result<Self, SinkInitError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SinkInitError::LogDirectory {
            path: dir.clone(),
            source,
        })?;

        let mut file = RollingFile {
            dir,
            service: service.to_string(),
            policy,
            current: None,
        };
        let today = Local::now().date_naive();
        file.open_for(today).map_err(|source| SinkInitError::LogFile {
            path: file.path_for(today, 0),
            source,
        })?;

        Ok(Self {
            file: Mutex::new(file),
            threshold,
        })
    }

    /// Path of the file records dated `date` start in.
    pub fn path_for(&self, date: NaiveDate) -> Result<PathBuf, EmitError> {
        let file = self.file.lock().map_err(|_| EmitError::Poisoned)?;
        Ok(file.path_for(date, 0))
    }

    pub fn format_line(record: &LogRecord) -> Result<String, EmitError> {
        Ok(format!(
            "{} - {} - {} - {}",
            level_name(&record.level),
            record.formatted_timestamp(),
            record.meta.host,
            record.message_json(4)?
        ))
    }
}

impl Sink for RotatingFileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::RotatingFile
    }

    fn threshold(&self) -> Level {
        self.threshold
    }

    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        let mut line = Self::format_line(record)?;
        line.push('\n');
        let mut file = self.file.lock().map_err(|_| EmitError::Poisoned)?;
        file.write_line(record.timestamp.date_naive(), &line)?;
        Ok(())
    }
}

struct OpenFile {
    date: NaiveDate,
    index: u32,
    size: u64,
    handle: File,
}

struct RollingFile {
    dir: PathBuf,
    service: String,
    policy: RotationPolicy,
    current: Option<OpenFile>,
}

impl RollingFile {
    fn path_for(&self, date: NaiveDate, index: u32) -> PathBuf {
        let base = format!("{}-{}.log", self.service, date.format(DATE_FORMAT));
        if index == 0 {
            self.dir.join(base)
        } else {
            self.dir.join(format!("{}.{}", base, index))
        }
    }

    fn write_line(&mut self, date: NaiveDate, line: &str) -> io::Result<()> {
        let stale = self.current.as_ref().map_or(true, |f| f.date != date);
        if stale {
            self.open_for(date)?;
        }

        let len = line.len() as u64;
        let full = self
            .current
            .as_ref()
            .map_or(false, |f| f.size > 0 && f.size + len > self.policy.max_file_size);
        if full {
            let next = self.current.as_ref().map_or(1, |f| f.index + 1);
            self.open_segment(date, next)?;
        }

        let current = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no open log file"))?;
        current.handle.write_all(line.as_bytes())?;
        current.size += len;
        Ok(())
    }

    /// Open the newest segment for `date`, continuing where a previous
    /// process left off, then prune expired files.
    fn open_for(&mut self, date: NaiveDate) -> io::Result<()> {
        let mut index = 0;
        while self.path_for(date, index + 1).exists() {
            index += 1;
        }
        self.open_segment(date, index)?;
        self.prune(date);
        Ok(())
    }

    fn open_segment(&mut self, date: NaiveDate, index: u32) -> io::Result<()> {
        let path = self.path_for(date, index);
        let handle = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = handle.metadata()?.len();
        self.current = Some(OpenFile {
            date,
            index,
            size,
            handle,
        });
        Ok(())
    }

    fn prune(&self, today: NaiveDate) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("cannot list log directory {}: {}", self.dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(|n| self.file_date(n)) else {
                continue;
            };
            if (today - date).num_days() >= i64::from(self.policy.max_age_days) {
                remove_quietly(&entry.path());
            }
        }
    }

    /// Date encoded in a file name produced by this sink, if any.
    fn file_date(&self, name: &str) -> Option<NaiveDate> {
        let rest = name.strip_prefix(&self.service)?.strip_prefix('-')?;
        let (date, suffix) = (rest.get(..10)?, rest.get(10..)?);
        if suffix != ".log" && !suffix.starts_with(".log.") {
            return None;
        }
        NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        eprintln!("cannot remove expired log file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DefaultMeta;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn record_on(date: (i32, u32, u32), message: serde_json::Value) -> LogRecord {
        let mut record = LogRecord::new(
            Level::INFO,
            message,
            DefaultMeta {
                env: "dev".into(),
                host: "box-1".into(),
                service: "billing".into(),
            },
        );
        record.timestamp = Local
            .with_ymd_and_hms(date.0, date.1, date.2, 8, 30, 0)
            .unwrap();
        record
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn creates_missing_directory_and_todays_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/logs");
        let sink = RotatingFileSink::new(&dir, "billing", RotationPolicy::default(), Level::DEBUG).unwrap();

        let today = Local::now().date_naive();
        let path = sink.path_for(today).unwrap();
        assert!(path.exists());
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("billing-{}.log", today.format("%Y-%m-%d"))
        );
    }

    #[test]
    fn unwritable_directory_fails_construction() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let err = RotatingFileSink::new(&blocker, "billing", RotationPolicy::default(), Level::DEBUG)
            .err()
            .unwrap();
        assert!(matches!(err, SinkInitError::LogDirectory { .. }));
    }

    #[test]
    fn writes_line_with_host_and_four_space_indent() {
        let tmp = TempDir::new().unwrap();
        let sink = RotatingFileSink::new(tmp.path(), "billing", RotationPolicy::default(), Level::DEBUG).unwrap();

        sink.emit(&record_on((2024, 5, 1), json!({"k": 1}))).unwrap();

        let text = fs::read_to_string(tmp.path().join("billing-2024-05-01.log")).unwrap();
        assert_eq!(text, "info - 05-01-2024 08:30:00 - box-1 - {\n    \"k\": 1\n}\n");
    }

    #[test]
    fn one_file_per_day() {
        let tmp = TempDir::new().unwrap();
        let sink = RotatingFileSink::new(tmp.path(), "billing", RotationPolicy::default(), Level::DEBUG).unwrap();

        sink.emit(&record_on((2024, 5, 1), json!("first"))).unwrap();
        sink.emit(&record_on((2024, 5, 2), json!("second"))).unwrap();

        let first = fs::read_to_string(tmp.path().join("billing-2024-05-01.log")).unwrap();
        let second = fs::read_to_string(tmp.path().join("billing-2024-05-02.log")).unwrap();
        assert!(first.contains("\"first\""));
        assert!(!first.contains("\"second\""));
        assert!(second.contains("\"second\""));
    }

    #[test]
    fn size_cap_rolls_into_numbered_segment() {
        let tmp = TempDir::new().unwrap();
        let policy = RotationPolicy {
            max_age_days: 15,
            max_file_size: 80,
        };
        let sink = RotatingFileSink::new(tmp.path(), "billing", policy, Level::DEBUG).unwrap();

        for i in 0..3 {
            sink.emit(&record_on((2024, 5, 1), json!(format!("message number {}", i)))).unwrap();
        }

        let base = tmp.path().join("billing-2024-05-01.log");
        let first = fs::read_to_string(&base).unwrap();
        assert_eq!(first.lines().count(), 1);
        assert!(tmp.path().join("billing-2024-05-01.log.1").exists());
        assert!(tmp.path().join("billing-2024-05-01.log.2").exists());
    }

    #[test]
    fn prunes_files_older_than_max_age() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "billing-2024-04-01.log",
            "billing-2024-04-16.log",
            "billing-2024-04-16.log.1",
            "billing-2024-04-17.log",
            "other-2024-01-01.log",
            "notes.txt",
        ] {
            fs::write(tmp.path().join(name), b"old\n").unwrap();
        }

        let mut file = RollingFile {
            dir: tmp.path().to_path_buf(),
            service: "billing".into(),
            policy: RotationPolicy::default(),
            current: None,
        };
        file.open_for(day(2024, 5, 1)).unwrap();

        assert!(!tmp.path().join("billing-2024-04-01.log").exists());
        assert!(!tmp.path().join("billing-2024-04-16.log").exists());
        assert!(!tmp.path().join("billing-2024-04-16.log.1").exists());
        assert!(tmp.path().join("billing-2024-04-17.log").exists());
        assert!(tmp.path().join("billing-2024-05-01.log").exists());
        assert!(tmp.path().join("other-2024-01-01.log").exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn reopening_continues_latest_segment() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("billing-2024-05-01.log"), b"a\n").unwrap();
        fs::write(tmp.path().join("billing-2024-05-01.log.1"), b"b\n").unwrap();

        let mut file = RollingFile {
            dir: tmp.path().to_path_buf(),
            service: "billing".into(),
            policy: RotationPolicy::default(),
            current: None,
        };
        file.write_line(day(2024, 5, 1), "c\n").unwrap();

        let seg = fs::read_to_string(tmp.path().join("billing-2024-05-01.log.1")).unwrap();
        assert_eq!(seg, "b\nc\n");
    }
}
