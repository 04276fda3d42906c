//! Weather snapshot file adapter.
//!
//! The weather daemon rewrites one JSON file with the latest
//! [`WeatherSnapshot`]; this adapter reads it on demand.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::app::ports::WeatherSource;
use crate::error::WeatherError;
use crate::weather::WeatherSnapshot;

#[derive(Debug, Clone)]
pub struct JsonFileWeatherSource {
    path: PathBuf,
}

impl JsonFileWeatherSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WeatherSource for JsonFileWeatherSource {
    fn current_snapshot(&self) -> Result<WeatherSnapshot, WeatherError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            let what = if e.kind() == ErrorKind::NotFound {
                "no snapshot yet".to_owned()
            } else {
                e.to_string()
            };
            WeatherError::Unavailable(format!("{}: {what}", self.path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| WeatherError::Malformed(format!("{}: {e}", self.path.display())))
    }
}
