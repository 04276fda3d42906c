//! Per-night log files.
//!
//! ```text
//! <log_dir>/2026-01-15/domewatch.log
//! <log_dir>/2026-01-16/domewatch.log
//! ```
//!
//! [`DailyLogWriter`] is handed to `env_logger` as a pipe target.  Before
//! every write it compares the UTC date with the date of the open file and
//! switches to the new day's directory when they differ.  Files are opened
//! in append mode, so a restart on the same day continues the same file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::app::ports::Clock;

pub const LOG_FILE_NAME: &str = "domewatch.log";
const DIR_FORMAT: &str = "%Y-%m-%d";

pub struct DailyLogWriter {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    current: Option<(NaiveDate, File)>,
}

impl DailyLogWriter {
    /// Create `root` and open today's file so a bad path fails at startup.
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let mut writer = Self {
            root: root.into(),
            clock,
            current: None,
        };
        writer.file()?;
        Ok(writer)
    }

    /// Log file for the UTC day `day`.
    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(day.format(DIR_FORMAT).to_string())
            .join(LOG_FILE_NAME)
    }

    fn file(&mut self) -> io::Result<&mut File> {
        let today = self.clock.now().date_naive();
        let file = match self.current.take() {
            Some((day, file)) if day == today => file,
            _ => self.open(today)?,
        };
        Ok(&mut self.current.insert((today, file)).1)
    }

    fn open(&self, day: NaiveDate) -> io::Result<File> {
        let path = self.path_for(day);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }
}

impl Write for DailyLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}
