//! Structured logging with daily file rollover
//!
//! The engine logs through the `tracing` facade; this module supplies the
//! subscriber setup and a writer that appends to `app_YYYYMMDD.log` in the
//! configured directory, opening a new file at the first write after UTC
//! midnight. Error sites attach their cause with the usual `error = %e`
//! field so the stringified cause lands in the record.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Thread-safe appender that rolls to a fresh file when the UTC date
/// changes between writes.
#[derive(Clone)]
pub struct DailyFileWriter {
    inner: Arc<WriterInner>,
}

struct WriterInner {
    directory: PathBuf,
    state: Mutex<RollState>,
}

struct RollState {
    date: Option<NaiveDate>,
    file: Option<File>,
}

impl DailyFileWriter {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                directory,
                state: Mutex::new(RollState {
                    date: None,
                    file: None,
                }),
            }),
        }
    }

    /// Log file path for a given date.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.inner
            .directory
            .join(format!("app_{}.log", date.format("%Y%m%d")))
    }

    fn write_dated(&self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let mut state = match self.inner.state.lock() {
            Ok(state) => state,
            // A poisoned logger mutex silently drops the record
            Err(_) => return Ok(buf.len()),
        };

        if state.date != Some(date) || state.file.is_none() {
            let _ = std::fs::create_dir_all(&self.inner.directory);
            state.file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(date))
                .ok();
            state.date = Some(date);
        }

        match state.file.as_mut() {
            Some(file) => file.write(buf),
            // Logging is best-effort; an unopenable file swallows records
            None => Ok(buf.len()),
        }
    }
}

impl io::Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_dated(Utc::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(file) = state.file.as_mut() {
                file.flush()?;
            }
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DailyFileWriter {
    type Writer = DailyFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global subscriber writing to the daily log file.
///
/// `RUST_LOG` overrides the default `info` filter. Safe to call more than
/// once; later calls keep the first subscriber.
pub fn init(log_directory: &Path) {
    let writer = DailyFileWriter::new(log_directory.to_path_buf());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}
