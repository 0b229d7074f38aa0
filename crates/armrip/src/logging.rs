//! Subscriber setup: human-readable stderr plus a JSON log file per job.
//!
//! The subscriber is installed before the job exists, so the file layer
//! writes into a [`JobLogFile`] that discards output until
//! [`JobLogFile::attach`] opens `arm_<device>_<timestamp>.log`. `log`
//! records from the database layer are bridged in by the subscriber.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::ArmError;

const DEFAULT_FILTER: &str = "info";

/// Shared handle to the per-job log file.
#[derive(Clone, Default)]
pub struct JobLogFile {
    file: Arc<Mutex<Option<File>>>,
}

impl JobLogFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the job's log file under `logpath` and routes the file layer to it.
    pub fn attach(
        &self,
        logpath: &Path,
        devpath: &str,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ArmError> {
        std::fs::create_dir_all(logpath).map_err(|e| {
            ArmError::Logging(format!("cannot create '{}': {}", logpath.display(), e))
        })?;
        let path = logpath.join(log_file_name(devpath, now));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ArmError::Logging(format!("cannot open '{}': {}", path.display(), e)))?;

        let mut slot = self
            .file
            .lock()
            .map_err(|_| ArmError::Logging("log file lock poisoned".to_string()))?;
        *slot = Some(file);
        Ok(path)
    }
}

pub struct JobLogWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl Write for JobLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock() {
            Ok(mut slot) => match slot.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock() {
            Ok(mut slot) => match slot.as_mut() {
                Some(file) => file.flush(),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for JobLogFile {
    type Writer = JobLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        JobLogWriter {
            file: Arc::clone(&self.file),
        }
    }
}

/// `arm_<device>_<yymmdd_HHMMSS>.log`, e.g. `arm_sr0_261018_142501.log`.
pub fn log_file_name(devpath: &str, now: DateTime<Utc>) -> String {
    let device = Path::new(devpath)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    format!("arm_{}_{}.log", device, now.format("%y%m%d_%H%M%S"))
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(job_log: JobLogFile) -> Result<(), ArmError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = fmt::layer()
        .json()
        .with_writer(job_log)
        .with_ansi(false)
        .with_target(true)
        .with_current_span(true);

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| ArmError::Logging(e.to_string()))
}
