//! Status record file adapter.
//!
//! Each dome's state is published to `<dir>/<id>.stat` as one line:
//!
//! ```text
//! 2026-01-15 06:00:14.123456 True
//! ```
//!
//! Writers hold the lock file `<id>.stat.lock` (created exclusively) while
//! they write a temp file in the same directory and rename it over the
//! record, so readers never see a partial line.  A lock older than
//! `stale_after` is assumed abandoned by a crashed writer and removed.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::NaiveDateTime;
use log::warn;
use tempfile::NamedTempFile;

use crate::app::ports::{StatusPublisher, StatusRecord};
use crate::error::StatusError;

const LOCK_RETRY: Duration = Duration::from_millis(20);
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone)]
pub struct FileStatusPublisher {
    dir: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
}

impl FileStatusPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
        }
    }

    pub fn with_lock_timeouts(mut self, lock_timeout: Duration, stale_after: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self.stale_after = stale_after;
        self
    }

    pub fn record_path(&self, dome_id: &str) -> PathBuf {
        self.dir.join(format!("{dome_id}.stat"))
    }

    pub fn lock_path(&self, dome_id: &str) -> PathBuf {
        self.dir.join(format!("{dome_id}.stat.lock"))
    }

    /// Read back a published record.  Not used by the control loop.
    pub fn read(&self, dome_id: &str) -> Result<StatusRecord, StatusError> {
        let path = self.record_path(dome_id);
        let text = fs::read_to_string(&path)
            .map_err(|e| StatusError::Io(format!("{}: {e}", path.display())))?;
        parse_record(&text)
    }

    fn lock(&self, dome_id: &str) -> Result<LockGuard, StatusError> {
        let path = self.lock_path(dome_id);
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(LockGuard { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.is_stale(&path) {
                        warn!("Removing stale status lock {}", path.display());
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => {
                                warn!("Cannot remove stale status lock {}: {e}", path.display());
                            }
                        }
                    }
                }
                Err(e) => return Err(StatusError::Io(format!("{}: {e}", path.display()))),
            }
            if Instant::now() >= deadline {
                return Err(StatusError::LockTimeout(path.display().to_string()));
            }
            std::thread::sleep(LOCK_RETRY);
        }
    }

    fn is_stale(&self, lock: &Path) -> bool {
        fs::metadata(lock)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| SystemTime::now().duration_since(t).ok())
            .is_some_and(|age| age > self.stale_after)
    }
}

/// Removes the lock file when dropped.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Cannot remove status lock {}: {e}", self.path.display());
        }
    }
}

pub fn format_record(record: &StatusRecord) -> String {
    format!(
        "{} {}",
        record.timestamp.format(TIMESTAMP_FORMAT),
        if record.is_open { "True" } else { "False" }
    )
}

pub fn parse_record(text: &str) -> Result<StatusRecord, StatusError> {
    let text = text.trim();
    let malformed = || StatusError::Malformed(text.to_owned());
    let (stamp, flag) = text.rsplit_once(' ').ok_or_else(malformed)?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|_| malformed())?
        .and_utc();
    let is_open = match flag {
        "True" => true,
        "False" => false,
        _ => return Err(malformed()),
    };
    Ok(StatusRecord { timestamp, is_open })
}

impl StatusPublisher for FileStatusPublisher {
    fn publish(&self, dome_id: &str, record: &StatusRecord) -> Result<(), StatusError> {
        let path = self.record_path(dome_id);
        let io = |e: std::io::Error| StatusError::Io(format!("{}: {e}", path.display()));

        let _guard = self.lock(dome_id)?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io)?;
        tmp.write_all(format_record(record).as_bytes()).map_err(io)?;
        tmp.persist(&path).map_err(|e| io(e.error))?;
        Ok(())
    }
}
