//! File-presence override adapter.
//!
//! Operators raise an override by creating a file in the override
//! directory and drop it by deleting the file:
//!
//! | File                      | Flag             |
//! |---------------------------|------------------|
//! | `<id>.request.txt`        | `open_requested` |
//! | `sunOverride.<id>.txt`    | `sun`            |
//! | `cloudOverride.<id>.txt`  | `cloud`          |
//! | `timeoutOverride.<id>.txt`| `timeout`        |
//!
//! The manual decision gate is the site-wide `manualDecision.txt`, holding
//! one UTC timestamp `YYYY-mm-dd HH:MM:SS[.ffffff]`.  A file that cannot be
//! parsed reads as a very old gate, so it blocks and asks for inspection.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use tempfile::NamedTempFile;

use crate::app::ports::{OverrideFlags, OverrideSource};
use crate::error::OverrideError;

pub const MANUAL_DECISION_FILE: &str = "manualDecision.txt";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// [`OverrideSource`] backed by files in one directory.
#[derive(Debug, Clone)]
pub struct FileOverrideSource {
    dir: PathBuf,
}

impl FileOverrideSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn request_path(&self, dome_id: &str) -> PathBuf {
        self.dir.join(format!("{dome_id}.request.txt"))
    }

    pub fn sun_path(&self, dome_id: &str) -> PathBuf {
        self.dir.join(format!("sunOverride.{dome_id}.txt"))
    }

    pub fn cloud_path(&self, dome_id: &str) -> PathBuf {
        self.dir.join(format!("cloudOverride.{dome_id}.txt"))
    }

    pub fn timeout_path(&self, dome_id: &str) -> PathBuf {
        self.dir.join(format!("timeoutOverride.{dome_id}.txt"))
    }

    pub fn manual_decision_path(&self) -> PathBuf {
        self.dir.join(MANUAL_DECISION_FILE)
    }
}

fn exists(path: &Path) -> Result<bool, OverrideError> {
    path.try_exists()
        .map_err(|e| OverrideError::Io(format!("{}: {e}", path.display())))
}

/// Parse a stored gate timestamp.  Unparsable text maps to the epoch.
pub fn parse_manual_decision(text: &str) -> DateTime<Utc> {
    let text = text.trim();
    match NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        Ok(naive) => naive.and_utc(),
        Err(e) => {
            warn!("Unparsable manual decision {text:?} ({e}); treating as expired");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

pub fn format_manual_decision(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

impl OverrideSource for FileOverrideSource {
    fn flags(&self, dome_id: &str) -> Result<OverrideFlags, OverrideError> {
        Ok(OverrideFlags {
            sun: exists(&self.sun_path(dome_id))?,
            cloud: exists(&self.cloud_path(dome_id))?,
            timeout: exists(&self.timeout_path(dome_id))?,
            open_requested: exists(&self.request_path(dome_id))?,
        })
    }

    fn manual_decision(&self) -> Result<Option<DateTime<Utc>>, OverrideError> {
        let path = self.manual_decision_path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(parse_manual_decision(&text))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OverrideError::Io(format!("{}: {e}", path.display()))),
        }
    }

    fn reset_manual_decision(&self, at: DateTime<Utc>) -> Result<(), OverrideError> {
        let path = self.manual_decision_path();
        let io = |e: std::io::Error| OverrideError::Io(format!("{}: {e}", path.display()));

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io)?;
        tmp.write_all(format_manual_decision(at).as_bytes())
            .map_err(io)?;
        tmp.persist(&path).map_err(|e| io(e.error))?;
        Ok(())
    }
}
