//! Weather snapshot model.
//!
//! A [`WeatherSnapshot`] is a point-in-time reading of every monitored
//! quantity plus the redundant cloud sensors.  It is produced by the
//! weather collaborator (see [`WeatherSource`](crate::app::ports::WeatherSource)),
//! never mutated after capture, and replaced wholesale on each refresh.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Limit-table key for the sun altitude, which travels in its own field.
pub const SUN_ALTITUDE: &str = "sunAltitude";

/// A point-in-time snapshot of site weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// When the weather station captured this snapshot.
    pub timestamp: DateTime<Utc>,
    /// Sun altitude above the horizon (degrees), supplied by the ephemeris.
    pub sun_altitude: f64,
    /// Scalar quantities keyed by limit-table name (e.g. `windSpeed`).
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
    /// Raw cloud-sensor readings, sentinels included.
    #[serde(default)]
    pub clouds: BTreeMap<String, f64>,
}

impl WeatherSnapshot {
    pub fn new(timestamp: DateTime<Utc>, sun_altitude: f64) -> Self {
        Self {
            timestamp,
            sun_altitude,
            values: BTreeMap::new(),
            clouds: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, quantity: &str, value: f64) -> Self {
        self.values.insert(quantity.to_owned(), value);
        self
    }

    pub fn with_cloud(mut self, sensor: &str, value: f64) -> Self {
        self.clouds.insert(sensor.to_owned(), value);
        self
    }

    /// Look up a scalar quantity; [`SUN_ALTITUDE`] maps to the sun field.
    pub fn value(&self, quantity: &str) -> Option<f64> {
        if quantity == SUN_ALTITUDE {
            Some(self.sun_altitude)
        } else {
            self.values.get(quantity).copied()
        }
    }

    /// Raw reading of a cloud sensor.  `None` if the sensor is not reported.
    pub fn cloud(&self, sensor: &str) -> Option<f64> {
        self.clouds.get(sensor).copied()
    }

    /// Age of the snapshot at `now` (negative if the station clock runs ahead).
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}
