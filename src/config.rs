//! Site configuration parameters
//!
//! All tunable parameters for the dome supervisor: loop timing, weather
//! limit tables, cloud sensor fallback order and sentinels, restart policy,
//! adapter paths and the list of domes.  Loaded from a JSON file at startup;
//! [`SiteConfig::default`] describes a two-enclosure site.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scheduler::MIN_HEARTBEATS_PER_TIMEOUT;
use crate::weather::SUN_ALTITUDE;

/// Upper bound for every `*_secs` interval: one year.
pub const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;
/// Upper bound for the loop timing fields: one day.
pub const MAX_PERIOD_MS: u64 = 24 * 60 * 60 * 1000;

// ---------------------------------------------------------------------------
// Limit ranges
// ---------------------------------------------------------------------------

/// Inclusive `[min, max]` range.  Serialised as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl From<[f64; 2]> for Range {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

impl From<Range> for [f64; 2] {
    fn from(r: Range) -> Self {
        [r.min, r.max]
    }
}

impl core::fmt::Display for Range {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Quantity name → allowed range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimitTable(BTreeMap<String, Range>);

impl LimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, quantity: &str, min: f64, max: f64) -> Self {
        self.set(quantity, Range::new(min, max));
        self
    }

    pub fn set(&mut self, quantity: &str, range: Range) {
        self.0.insert(quantity.to_owned(), range);
    }

    pub fn get(&self, quantity: &str) -> Option<Range> {
        self.0.get(quantity).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Range)> {
        self.0.iter().map(|(k, r)| (k.as_str(), *r))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The two parallel limit tables.
///
/// `to_open` is consulted while the enclosure is closed and decides whether
/// it may open; `to_stay_open` is consulted while it is open and decides
/// whether it must close.  The defaults leave a band between the two so a
/// reading hovering at one limit cannot make the shutters cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherLimits {
    pub to_open: LimitTable,
    pub to_stay_open: LimitTable,
}

impl WeatherLimits {
    /// Table that applies for the given enclosure state.
    pub fn for_state(&self, dome_open: bool) -> &LimitTable {
        if dome_open {
            &self.to_stay_open
        } else {
            &self.to_open
        }
    }
}

impl Default for WeatherLimits {
    fn default() -> Self {
        let to_open = LimitTable::new()
            .with("outsideHumidity", 0.0, 75.0)
            .with("outsideDewPt", -100.0, 100.0)
            .with("outsideTemp", -20.0, 50.0)
            .with("windSpeed", 0.0, 30.0)
            .with("windGustSpeed", 0.0, 35.0)
            .with("barometer", 0.0, 2000.0)
            .with("MearthCloud", -999.0, -38.0)
            .with("HATCloud", -999.0, -38.0)
            .with("AuroraCloud", -999.0, -38.0)
            .with("MINERVACloud", -999.0, -38.0);
        let to_stay_open = LimitTable::new()
            .with("outsideHumidity", 0.0, 80.0)
            .with("outsideDewPt", -100.0, 100.0)
            .with("outsideTemp", -20.0, 50.0)
            .with("windSpeed", 0.0, 35.0)
            .with("windGustSpeed", 0.0, 40.0)
            .with("barometer", 0.0, 2000.0)
            .with("MearthCloud", -999.0, -35.0)
            .with("HATCloud", -999.0, -35.0)
            .with("AuroraCloud", -999.0, -35.0)
            .with("MINERVACloud", -999.0, -35.0);
        Self {
            to_open,
            to_stay_open,
        }
    }
}

// ---------------------------------------------------------------------------
// Cloud sensors
// ---------------------------------------------------------------------------

/// Redundant sky-temperature sensors and their site-specific sentinels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSensorConfig {
    /// Fallback order: the first connected sensor decides.
    pub priority: Vec<String>,
    /// Reading that means "sensor disconnected".
    pub disconnected_value: f64,
    /// Reading that means "actively raining".
    pub raining_value: f64,
    /// Sensor whose raining sentinel is trusted for rain tracking.
    pub rain_sensor: String,
}

impl CloudSensorConfig {
    pub fn is_cloud_sensor(&self, quantity: &str) -> bool {
        self.priority.iter().any(|s| s == quantity)
    }

    pub fn is_disconnected(&self, value: f64) -> bool {
        sentinel_eq(value, self.disconnected_value)
    }

    pub fn is_raining(&self, value: f64) -> bool {
        sentinel_eq(value, self.raining_value)
    }
}

impl Default for CloudSensorConfig {
    fn default() -> Self {
        Self {
            priority: vec![
                "MearthCloud".into(),
                "HATCloud".into(),
                "AuroraCloud".into(),
                "MINERVACloud".into(),
            ],
            disconnected_value: 999.0,
            raining_value: 998.0,
            rain_sensor: "MearthCloud".into(),
        }
    }
}

fn sentinel_eq(value: f64, sentinel: f64) -> bool {
    (value - sentinel).abs() < 1e-6
}

// ---------------------------------------------------------------------------
// Supervisor restart policy
// ---------------------------------------------------------------------------

/// What the supervisor does after a dome loop dies.
///
/// Either way the enclosure closes on its own once heartbeats stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Leave the loop stopped until the process is restarted.
    Never,
    /// Rebuild the controller after `delay_secs`, at most `max_restarts` times.
    After { delay_secs: u64, max_restarts: u32 },
}

impl RestartPolicy {
    /// Delay before restart number `restarts_so_far + 1`, or `None` to stop.
    pub fn next_delay(&self, restarts_so_far: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::After {
                delay_secs,
                max_restarts,
            } => (restarts_so_far < max_restarts).then(|| Duration::from_secs(delay_secs)),
        }
    }
}

// ---------------------------------------------------------------------------
// Domes
// ---------------------------------------------------------------------------

/// Hardware family that backs a dome's [`HardwareSession`](crate::app::ports::HardwareSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// In-memory dual-shutter enclosure with a heartbeat watchdog.
    Simulated,
}

/// Per-dome configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomeConfig {
    pub id: String,
    pub driver: DriverKind,
    /// Open shutter 2 before shutter 1.
    #[serde(default)]
    pub reverse: bool,
    /// Hardware can open a single shutter (daytime mode).
    #[serde(default)]
    pub partial_open: bool,
    /// Hardware reports emergency-stop state.
    #[serde(default)]
    pub estop_detection: bool,
}

impl DomeConfig {
    pub fn simulated(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            driver: DriverKind::Simulated,
            reverse: false,
            partial_open: false,
            estop_detection: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Site configuration
// ---------------------------------------------------------------------------

/// Core site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // --- Timing ---
    /// Target control cycle period (milliseconds)
    pub cycle_period_ms: u64,
    /// Hardware-side heartbeat timeout after which the enclosure closes itself (milliseconds)
    pub heartbeat_timeout_ms: u64,
    /// Favourable conditions required after bad weather before opening (seconds)
    pub hysteresis_secs: u64,
    /// Weather snapshot refresh interval (seconds)
    pub weather_refresh_secs: u64,
    /// Snapshots older than this are unsafe (seconds)
    pub max_weather_age_secs: u64,
    /// Snapshots dated further ahead of the local clock than this are unsafe (seconds)
    pub max_clock_skew_secs: u64,

    // --- Weather rules ---
    /// No opening within this long after rain (seconds)
    pub rain_lockout_secs: u64,
    /// Look-back window for the freeze-and-precipitation rule (seconds)
    pub freeze_window_secs: u64,
    /// Temperatures at or below this count as freezing (Celsius)
    pub freeze_limit_c: f64,
    /// Snapshot quantity holding the outside temperature
    pub temperature_key: String,
    /// Highest sun altitude at which the enclosure may be open (degrees)
    pub twilight_max_deg: f64,
    /// Lifetime of a manual decision before re-confirmation (seconds)
    pub manual_gate_ttl_secs: u64,
    pub clouds: CloudSensorConfig,
    pub limits: WeatherLimits,

    // --- Supervision ---
    pub restart: RestartPolicy,

    // --- Adapters ---
    /// Directory holding `<id>.stat` status records
    pub status_dir: PathBuf,
    /// Directory holding override flag files and the manual decision file
    pub override_dir: PathBuf,
    /// JSON snapshot written by the weather daemon
    pub weather_file: PathBuf,
    /// Root of the per-night log directories; `None` logs to stderr only
    pub log_dir: Option<PathBuf>,

    pub domes: Vec<DomeConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            // Timing: 14 s cycles give 4 heartbeats inside a 60 s hardware timeout
            cycle_period_ms: 14_000,
            heartbeat_timeout_ms: 60_000,
            hysteresis_secs: 30 * 60,
            weather_refresh_secs: 30 * 60,
            max_weather_age_secs: 60 * 60,
            max_clock_skew_secs: 5 * 60,

            // Weather rules
            rain_lockout_secs: 60 * 60,
            freeze_window_secs: 24 * 60 * 60,
            freeze_limit_c: 1.0,
            temperature_key: "outsideTemp".into(),
            twilight_max_deg: 6.0,
            manual_gate_ttl_secs: 24 * 60 * 60,
            clouds: CloudSensorConfig::default(),
            limits: WeatherLimits::default(),

            restart: RestartPolicy::Never,

            status_dir: PathBuf::from("status"),
            override_dir: PathBuf::from("overrides"),
            weather_file: PathBuf::from("weather/latest.json"),
            log_dir: None,

            domes: vec![
                DomeConfig {
                    id: "aqawan1".into(),
                    driver: DriverKind::Simulated,
                    reverse: true,
                    partial_open: true,
                    estop_detection: true,
                },
                DomeConfig {
                    id: "aqawan2".into(),
                    driver: DriverKind::Simulated,
                    reverse: false,
                    partial_open: true,
                    estop_detection: true,
                },
            ],
        }
    }
}

impl SiteConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make the supervisor unsafe.
    /// Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for (name, value) in [
            ("cycle_period_ms", self.cycle_period_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
        ] {
            if value > MAX_PERIOD_MS {
                return invalid(format!("{name} must be <= {MAX_PERIOD_MS}"));
            }
        }
        let restart_delay_secs = match self.restart {
            RestartPolicy::Never => 0,
            RestartPolicy::After { delay_secs, .. } => delay_secs,
        };
        for (name, value) in [
            ("hysteresis_secs", self.hysteresis_secs),
            ("weather_refresh_secs", self.weather_refresh_secs),
            ("max_weather_age_secs", self.max_weather_age_secs),
            ("max_clock_skew_secs", self.max_clock_skew_secs),
            ("rain_lockout_secs", self.rain_lockout_secs),
            ("freeze_window_secs", self.freeze_window_secs),
            ("manual_gate_ttl_secs", self.manual_gate_ttl_secs),
            ("restart.delay_secs", restart_delay_secs),
        ] {
            if value > MAX_INTERVAL_SECS {
                return invalid(format!("{name} must be <= {MAX_INTERVAL_SECS}"));
            }
        }

        if self.cycle_period_ms == 0 {
            return invalid("cycle_period_ms must be > 0".into());
        }
        let min_timeout = self
            .cycle_period_ms
            .checked_mul(u64::from(MIN_HEARTBEATS_PER_TIMEOUT));
        if min_timeout.is_none_or(|ms| ms >= self.heartbeat_timeout_ms) {
            return invalid(format!(
                "{MIN_HEARTBEATS_PER_TIMEOUT} x cycle_period_ms ({}) must be < heartbeat_timeout_ms ({})",
                self.cycle_period_ms, self.heartbeat_timeout_ms
            ));
        }
        if self.weather_refresh_secs == 0 {
            return invalid("weather_refresh_secs must be > 0".into());
        }
        if self.manual_gate_ttl_secs == 0 {
            return invalid("manual_gate_ttl_secs must be > 0".into());
        }
        if !(-90.0..=90.0).contains(&self.twilight_max_deg) {
            return invalid("twilight_max_deg must be within [-90, 90]".into());
        }

        if self.clouds.priority.is_empty() {
            return invalid("clouds.priority must name at least one sensor".into());
        }
        for (name, table) in [
            ("to_open", &self.limits.to_open),
            ("to_stay_open", &self.limits.to_stay_open),
        ] {
            for (quantity, range) in table.iter() {
                if range.min > range.max {
                    return invalid(format!("limits.{name}.{quantity}: min > max"));
                }
            }
            for sensor in &self.clouds.priority {
                if table.get(sensor).is_none() {
                    return invalid(format!("limits.{name} has no range for cloud sensor {sensor}"));
                }
            }
            if table.get(SUN_ALTITUDE).is_some() {
                return invalid(format!(
                    "limits.{name}.{SUN_ALTITUDE} is derived from twilight_max_deg; remove it"
                ));
            }
        }

        if self.domes.is_empty() {
            return invalid("domes: at least one dome required".into());
        }
        for (i, dome) in self.domes.iter().enumerate() {
            if dome.id.trim().is_empty() {
                return invalid(format!("domes[{i}].id is empty"));
            }
            if self.domes[..i].iter().any(|d| d.id == dome.id) {
                return invalid(format!("domes: duplicate id {}", dome.id));
            }
        }
        Ok(())
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

}

/// Seconds → `chrono::Duration`, saturating at the largest value chrono accepts.
pub(crate) fn secs(value: u64) -> chrono::Duration {
    const CAP: i64 = i64::MAX / 1000;
    chrono::Duration::seconds(i64::try_from(value).map_or(CAP, |v| v.min(CAP)))
}
