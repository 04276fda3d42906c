//! Weather safety evaluator.
//!
//! The evaluator runs **once per cycle before the dome state machine** and
//! turns the latest weather snapshot, the enclosure state, the override
//! flags and the manual decision gate into a [`SafetyDecision`].
//!
//! ## Evaluation order
//!
//! Every check runs; each failure is collected as a [`Violation`] so the
//! log shows the full picture, not just the first problem.
//!
//! 1. Manual decision gate (see [`crate::gate`]).
//! 2. Limit table for the current enclosure state, cloned per evaluation.
//! 3. Sun altitude, widened by the sun override.
//! 4. First connected cloud sensor in priority order, unless overridden.
//! 5. Rain tracker and rain lockout.
//! 6. Freeze + precipitation, which engages the manual gate.
//! 7. Every remaining quantity against its range.
//!
//! The evaluator owns the per-dome history it needs: when rain was last
//! seen and the outside temperatures over the freeze window.  A snapshot
//! dated beyond the allowed clock skew is itself a violation.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::app::ports::OverrideFlags;
use crate::config::{CloudSensorConfig, LimitTable, Range, SiteConfig, WeatherLimits, secs};
use crate::gate::{GateEffect, ManualGate};
use crate::weather::{SUN_ALTITUDE, WeatherSnapshot};

/// Sun altitude range while the sun override is in force.
const SUN_ANY: Range = Range::new(-90.0, 90.0);

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

/// One reason the enclosure must not be (or stay) open.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    ManualInspectionRequired,
    FreezeAndPrecipitation { coldest_c: f64 },
    RecentRain { at: DateTime<Utc> },
    AllCloudSensorsDown,
    OutOfRange { quantity: String, value: f64, range: Range },
    Missing { quantity: String },
    NoWeatherData,
    StaleWeather { age_secs: i64 },
    /// Capture time lies further ahead of the local clock than the allowed skew.
    FutureWeather { ahead_secs: i64 },
}

impl Violation {
    /// True if this is the sun-altitude check and nothing else.
    pub fn is_sun(&self) -> bool {
        matches!(self, Self::OutOfRange { quantity, .. } if quantity == SUN_ALTITUDE)
    }
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ManualInspectionRequired => f.write_str("manual inspection required"),
            Self::FreezeAndPrecipitation { coldest_c } => write!(
                f,
                "precipitation with freezing temperatures (coldest {coldest_c:.1} C)"
            ),
            Self::RecentRain { at } => write!(f, "rain detected at {at}"),
            Self::AllCloudSensorsDown => f.write_str("all cloud sensors down"),
            Self::OutOfRange {
                quantity,
                value,
                range,
            } => write!(f, "{quantity}={value} not in range {range}"),
            Self::Missing { quantity } => write!(f, "{quantity} missing"),
            Self::NoWeatherData => f.write_str("no weather data"),
            Self::StaleWeather { age_secs } => write!(f, "weather data is {age_secs} s old"),
            Self::FutureWeather { ahead_secs } => {
                write!(f, "weather data is dated {ahead_secs} s in the future")
            }
        }
    }
}

/// Result of one safety evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyDecision {
    pub ok: bool,
    /// True when the sun altitude is the only problem.
    pub ok_ignoring_sun: bool,
    pub reasons: Vec<Violation>,
}

impl SafetyDecision {
    fn from_reasons(reasons: Vec<Violation>) -> Self {
        Self {
            ok: reasons.is_empty(),
            ok_ignoring_sun: reasons.iter().all(Violation::is_sun),
            reasons,
        }
    }

    /// Reasons joined for logging.
    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Decision plus the gate side effects the caller must carry out.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub decision: SafetyDecision,
    pub gate_effects: Vec<GateEffect>,
}

/// Everything the evaluator looks at for one decision.
#[derive(Debug, Clone, Copy)]
pub struct Conditions<'a> {
    pub dome_open: bool,
    pub weather: Option<&'a WeatherSnapshot>,
    pub overrides: OverrideFlags,
    /// Stored manual decision timestamp, if any.
    pub manual_gate: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Per-dome weather safety evaluator.
pub struct WeatherEvaluator {
    limits: WeatherLimits,
    clouds: CloudSensorConfig,
    twilight_max_deg: f64,
    rain_lockout: Duration,
    freeze_window: Duration,
    freeze_limit_c: f64,
    temperature_key: String,
    max_weather_age: Duration,
    max_clock_skew: Duration,
    gate: ManualGate,
    /// Last time the rain sensor reported rain.
    last_rain_at: Option<DateTime<Utc>>,
    /// (capture time, temperature) over the freeze window, oldest first.
    temperatures: VecDeque<(DateTime<Utc>, f64)>,
}

impl WeatherEvaluator {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            limits: site.limits.clone(),
            clouds: site.clouds.clone(),
            twilight_max_deg: site.twilight_max_deg,
            rain_lockout: secs(site.rain_lockout_secs),
            freeze_window: secs(site.freeze_window_secs),
            freeze_limit_c: site.freeze_limit_c,
            temperature_key: site.temperature_key.clone(),
            max_weather_age: secs(site.max_weather_age_secs),
            max_clock_skew: secs(site.max_clock_skew_secs),
            gate: ManualGate::new(secs(site.manual_gate_ttl_secs)),
            last_rain_at: None,
            temperatures: VecDeque::new(),
        }
    }

    /// Decide whether the enclosure may be open under `cond`.
    ///
    /// `ignore_sun` widens the sun range exactly like the sun override.
    pub fn evaluate(&mut self, cond: &Conditions<'_>, ignore_sun: bool) -> Assessment {
        let now = cond.now;
        let mut reasons = Vec::new();

        // ── Manual decision gate ──────────────────────────────────
        let review = self.gate.review(cond.manual_gate, now);
        let mut gate_effects = review.effects;
        if review.blocked {
            reasons.push(Violation::ManualInspectionRequired);
        }

        let Some(snapshot) = cond.weather else {
            reasons.push(Violation::NoWeatherData);
            return self.finish(reasons, gate_effects);
        };

        let age = snapshot.age(now);
        if age > self.max_weather_age {
            reasons.push(Violation::StaleWeather {
                age_secs: age.num_seconds(),
            });
        }

        // Future-dated readings never enter the temperature history.
        if -age > self.max_clock_skew {
            reasons.push(Violation::FutureWeather {
                ahead_secs: -age.num_seconds(),
            });
        } else {
            self.record_temperature(snapshot, now);
        }

        // ── Table for this enclosure state ────────────────────────
        let mut table: LimitTable = self.limits.for_state(cond.dome_open).clone();
        let sun_range = if cond.overrides.sun || ignore_sun {
            SUN_ANY
        } else {
            Range::new(-90.0, self.twilight_max_deg)
        };
        table.set(SUN_ALTITUDE, sun_range);

        // ── Clouds ────────────────────────────────────────────────
        if !cond.overrides.cloud {
            self.check_clouds(snapshot, &table, &mut reasons);
        }

        // ── Rain ──────────────────────────────────────────────────
        if snapshot
            .cloud(&self.clouds.rain_sensor)
            .is_some_and(|v| self.clouds.is_raining(v))
        {
            self.last_rain_at = Some(now);
        }
        if let Some(at) = self.last_rain_at {
            if now - at < self.rain_lockout {
                reasons.push(Violation::RecentRain { at });
            }
        }

        // ── Freeze + precipitation ────────────────────────────────
        if let Some(coldest_c) = self.freezing_after_rain(now) {
            reasons.push(Violation::FreezeAndPrecipitation { coldest_c });
            gate_effects.extend(self.gate.engage(cond.manual_gate, now));
        }

        // ── Everything else ───────────────────────────────────────
        for (quantity, range) in table.iter() {
            if self.clouds.is_cloud_sensor(quantity) {
                continue;
            }
            match snapshot.value(quantity) {
                None => reasons.push(Violation::Missing {
                    quantity: quantity.to_owned(),
                }),
                Some(value) if !range.contains(value) => reasons.push(Violation::OutOfRange {
                    quantity: quantity.to_owned(),
                    value,
                    range,
                }),
                Some(_) => {}
            }
        }

        self.finish(reasons, gate_effects)
    }

    /// Last time rain was seen, if ever.
    pub fn last_rain_at(&self) -> Option<DateTime<Utc>> {
        self.last_rain_at
    }

    /// Coldest recorded temperature inside the freeze window.
    pub fn coldest_temperature(&self) -> Option<f64> {
        self.temperatures.iter().map(|&(_, t)| t).reduce(f64::min)
    }

    // ── Internal ──────────────────────────────────────────────────

    fn finish(&self, reasons: Vec<Violation>, gate_effects: Vec<GateEffect>) -> Assessment {
        let decision = SafetyDecision::from_reasons(reasons);
        if !decision.ok {
            info!("Not OK to open: {}", decision.summary());
        }
        Assessment {
            decision,
            gate_effects,
        }
    }

    fn check_clouds(
        &self,
        snapshot: &WeatherSnapshot,
        table: &LimitTable,
        reasons: &mut Vec<Violation>,
    ) {
        let reading = self.clouds.priority.iter().find_map(|sensor| {
            snapshot
                .cloud(sensor)
                .filter(|&v| !self.clouds.is_disconnected(v))
                .map(|v| (sensor, v))
        });

        let Some((sensor, value)) = reading else {
            reasons.push(Violation::AllCloudSensorsDown);
            return;
        };
        // Validation guarantees every priority sensor has a range.
        if let Some(range) = table.get(sensor) {
            if !range.contains(value) {
                reasons.push(Violation::OutOfRange {
                    quantity: sensor.clone(),
                    value,
                    range,
                });
            }
        }
    }

    /// Insert the snapshot's temperature once per capture time, then keep
    /// only readings inside the freeze window around `now`.
    fn record_temperature(&mut self, snapshot: &WeatherSnapshot, now: DateTime<Utc>) {
        if let Some(temp) = snapshot.value(&self.temperature_key) {
            let at = snapshot.timestamp;
            let idx = self.temperatures.partition_point(|&(t, _)| t < at);
            if self.temperatures.get(idx).is_none_or(|&(t, _)| t != at) {
                self.temperatures.insert(idx, (at, temp));
            }
        }
        let (window, skew) = (self.freeze_window, self.max_clock_skew);
        self.temperatures
            .retain(|&(at, _)| now - at <= window && at - now <= skew);
    }

    fn freezing_after_rain(&self, now: DateTime<Utc>) -> Option<f64> {
        let rained = self
            .last_rain_at
            .is_some_and(|at| now - at < self.freeze_window);
        if !rained {
            return None;
        }
        self.coldest_temperature()
            .filter(|&coldest| coldest <= self.freeze_limit_c)
    }
}
