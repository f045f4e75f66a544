//! Date-partitioned attendance log.
//!
//! One CSV file per calendar day, `attendance_<YYYY-MM-DD>.csv`, with a
//! `Name,Time` header written once when the file is created. Rows are only
//! ever appended. All writers go through one lock so rows never interleave.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

pub const HEADER: [&str; 2] = ["Name", "Time"];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("attendance io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("attendance csv error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed row in {path}: {row}")]
    MalformedRow { path: PathBuf, row: String },
}

/// One check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub name: String,
    pub timestamp: NaiveDateTime,
}

/// Source of "now" for the log; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

/// Parse a `YYYY-MM-DD` date as used in log file names.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
}

pub struct AttendanceLog {
    dir: PathBuf,
    clock: Clock,
    write_lock: Mutex<()>,
}

impl AttendanceLog {
    /// Open (creating if needed) the log directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AttendanceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| AttendanceError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            clock: local_clock(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(file_name_for(date))
    }

    /// Record `name` at the current clock time.
    ///
    /// The time is read while holding the writer lock, so rows in a day's
    /// file are in chronological order.
    pub fn mark(&self, name: &str) -> Result<AttendanceRecord, AttendanceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.now();
        self.write_row(name, now)
    }

    /// Record `name` at an explicit time, in the file for `now`'s date.
    pub fn append(&self, name: &str, now: NaiveDateTime) -> Result<AttendanceRecord, AttendanceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_row(name, now)
    }

    fn write_row(&self, name: &str, now: NaiveDateTime) -> Result<AttendanceRecord, AttendanceError> {
        let path = self.path_for(now.date());
        let io_err = |source| AttendanceError::Io {
            path: path.clone(),
            source,
        };
        let csv_err = |source| AttendanceError::Csv {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let is_new = file.metadata().map_err(io_err)?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER).map_err(csv_err)?;
        }
        let time = now.format(TIME_FORMAT).to_string();
        writer.write_record([name, time.as_str()]).map_err(csv_err)?;
        writer.flush().map_err(io_err)?;

        tracing::info!(name, date = %now.date(), time = %time, "attendance marked");
        Ok(AttendanceRecord {
            name: name.to_string(),
            timestamp: now,
        })
    }

    /// Raw CSV bytes for `date`, `None` when nothing was logged that day.
    pub fn export(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, AttendanceError> {
        let path = self.path_for(date);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AttendanceError::Io { path, source }),
        }
    }

    /// Parsed rows for `date`, in file order. Empty when the file is absent.
    pub fn records(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let Some(bytes) = self.export(date)? else {
            return Ok(Vec::new());
        };
        let path = self.path_for(date);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes.as_slice());

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|source| AttendanceError::Csv {
                path: path.clone(),
                source,
            })?;
            let malformed = || AttendanceError::MalformedRow {
                path: path.clone(),
                row: row.iter().collect::<Vec<_>>().join(","),
            };
            let (Some(name), Some(time)) = (row.get(0), row.get(1)) else {
                return Err(malformed());
            };
            let time = NaiveTime::parse_from_str(time, TIME_FORMAT).map_err(|_| malformed())?;
            records.push(AttendanceRecord {
                name: name.to_string(),
                timestamp: date.and_time(time),
            });
        }
        Ok(records)
    }
}

pub fn file_name_for(date: NaiveDate) -> String {
    format!("attendance_{}.csv", date.format(DATE_FORMAT))
}
