//! Mock adapters for integration tests.
//!
//! Every port gets a recording double so tests can assert on the full
//! command history and drive time, weather and overrides by hand.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use domewatch::app::events::Alert;
use domewatch::app::ports::{
    AlertSink, Capabilities, Clock, DomePorts, HardwareSession, HardwareStatus, OverrideFlags,
    OverrideSource, ShutterState, StatusPublisher, StatusRecord, WeatherSource,
};
use domewatch::config::{DomeConfig, SiteConfig};
use domewatch::error::{HardwareError, OverrideError, StatusError, WeatherError};
use domewatch::weather::WeatherSnapshot;

// ── Hardware call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwCall {
    Open { reverse: bool, single_shutter: bool },
    Close,
    Heartbeat,
    Abort,
}

#[derive(Debug)]
struct HwState {
    shutters: [ShutterState; 2],
    calls: Vec<HwCall>,
    estop: bool,
    fail_status: bool,
    session_lost: bool,
    panic_on_status: bool,
}

// ── MockHardware ──────────────────────────────────────────────

/// Dual-shutter enclosure whose open completes instantly.
pub struct MockHardware {
    state: Mutex<HwState>,
    caps: Capabilities,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities {
            estop_detection: true,
            partial_open: true,
            abort: true,
        })
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            state: Mutex::new(HwState {
                shutters: [ShutterState::Closed; 2],
                calls: Vec::new(),
                estop: false,
                fail_status: false,
                session_lost: false,
                panic_on_status: false,
            }),
            caps,
        }
    }

    pub fn calls(&self) -> Vec<HwCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: HwCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn opens(&self) -> Vec<HwCall> {
        self.state
            .lock()
            .calls
            .iter()
            .copied()
            .filter(|c| matches!(c, HwCall::Open { .. }))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn shutters(&self) -> [ShutterState; 2] {
        self.state.lock().shutters
    }

    pub fn set_shutters(&self, shutters: [ShutterState; 2]) {
        self.state.lock().shutters = shutters;
    }

    pub fn set_estop(&self, active: bool) {
        self.state.lock().estop = active;
    }

    pub fn set_fail_status(&self, fail: bool) {
        self.state.lock().fail_status = fail;
    }

    pub fn lose_session(&self) {
        self.state.lock().session_lost = true;
    }

    pub fn panic_on_status(&self) {
        self.state.lock().panic_on_status = true;
    }

    fn check(&self) -> Result<parking_lot::MutexGuard<'_, HwState>, HardwareError> {
        let s = self.state.lock();
        if s.session_lost {
            return Err(HardwareError::SessionLost("mock session dropped".into()));
        }
        Ok(s)
    }
}

impl HardwareSession for MockHardware {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn status(&self) -> Result<HardwareStatus, HardwareError> {
        let s = self.check()?;
        if s.panic_on_status {
            drop(s);
            panic!("mock hardware exploded");
        }
        if s.fail_status {
            return Err(HardwareError::Timeout { command: "STATUS" });
        }
        Ok(HardwareStatus {
            shutters: s.shutters.to_vec(),
            fault: s.estop,
            error: None,
            ready: !s.estop,
        })
    }

    fn open(&self, reverse: bool, single_shutter: bool) -> Result<(), HardwareError> {
        let mut s = self.check()?;
        s.calls.push(HwCall::Open {
            reverse,
            single_shutter,
        });
        if s.estop {
            return Err(HardwareError::CommandRejected {
                command: "OPEN",
                detail: "Estop active".into(),
            });
        }
        let first = usize::from(reverse);
        s.shutters[first] = ShutterState::Open;
        if !single_shutter {
            s.shutters[1 - first] = ShutterState::Open;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), HardwareError> {
        let mut s = self.check()?;
        s.calls.push(HwCall::Close);
        s.shutters = [ShutterState::Closed; 2];
        Ok(())
    }

    fn heartbeat(&self) -> Result<(), HardwareError> {
        self.check()?.calls.push(HwCall::Heartbeat);
        Ok(())
    }

    fn estop_active(&self) -> Result<bool, HardwareError> {
        Ok(self.check()?.estop)
    }

    fn abort(&self) -> Result<(), HardwareError> {
        self.check()?.calls.push(HwCall::Abort);
        Ok(())
    }
}

// ── ManualClock ───────────────────────────────────────────────

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ── MockWeather ───────────────────────────────────────────────

/// Serves a template snapshot re-stamped with the clock's current time.
pub struct MockWeather {
    clock: Arc<ManualClock>,
    template: Mutex<Result<WeatherSnapshot, WeatherError>>,
    fetches: Mutex<u32>,
}

#[allow(dead_code)]
impl MockWeather {
    pub fn new(clock: Arc<ManualClock>, template: WeatherSnapshot) -> Self {
        Self {
            clock,
            template: Mutex::new(Ok(template)),
            fetches: Mutex::new(0),
        }
    }

    pub fn set(&self, template: WeatherSnapshot) {
        *self.template.lock() = Ok(template);
    }

    pub fn fail(&self) {
        *self.template.lock() = Err(WeatherError::Unavailable("station offline".into()));
    }

    pub fn fetches(&self) -> u32 {
        *self.fetches.lock()
    }
}

impl WeatherSource for MockWeather {
    fn current_snapshot(&self) -> Result<WeatherSnapshot, WeatherError> {
        *self.fetches.lock() += 1;
        let mut snapshot = self.template.lock().clone()?;
        snapshot.timestamp = self.clock.now();
        Ok(snapshot)
    }
}

/// Clear, dark, calm night that passes both limit tables.
pub fn clear_night() -> WeatherSnapshot {
    WeatherSnapshot::new(Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap(), -30.0)
        .with_value("outsideHumidity", 40.0)
        .with_value("outsideDewPt", -5.0)
        .with_value("outsideTemp", 8.0)
        .with_value("windSpeed", 5.0)
        .with_value("windGustSpeed", 9.0)
        .with_value("barometer", 1012.0)
        .with_cloud("MearthCloud", -45.0)
        .with_cloud("HATCloud", -44.0)
        .with_cloud("AuroraCloud", -43.0)
        .with_cloud("MINERVACloud", -46.0)
}

// ── MockOverrides ─────────────────────────────────────────────

pub struct MockOverrides {
    flags: Mutex<OverrideFlags>,
    gate: Mutex<Option<DateTime<Utc>>>,
    gate_writes: Mutex<Vec<DateTime<Utc>>>,
    fail_flags: Mutex<bool>,
}

#[allow(dead_code)]
impl MockOverrides {
    /// Open requested, no overrides, no gate.
    pub fn requesting() -> Self {
        Self {
            flags: Mutex::new(OverrideFlags {
                open_requested: true,
                ..OverrideFlags::default()
            }),
            gate: Mutex::new(None),
            gate_writes: Mutex::new(Vec::new()),
            fail_flags: Mutex::new(false),
        }
    }

    pub fn set_flags(&self, flags: OverrideFlags) {
        *self.flags.lock() = flags;
    }

    pub fn set_gate(&self, at: Option<DateTime<Utc>>) {
        *self.gate.lock() = at;
    }

    pub fn gate(&self) -> Option<DateTime<Utc>> {
        *self.gate.lock()
    }

    pub fn gate_writes(&self) -> Vec<DateTime<Utc>> {
        self.gate_writes.lock().clone()
    }

    pub fn set_fail_flags(&self, fail: bool) {
        *self.fail_flags.lock() = fail;
    }
}

impl OverrideSource for MockOverrides {
    fn flags(&self, _dome_id: &str) -> Result<OverrideFlags, OverrideError> {
        if *self.fail_flags.lock() {
            return Err(OverrideError::Io("override dir unreadable".into()));
        }
        Ok(*self.flags.lock())
    }

    fn manual_decision(&self) -> Result<Option<DateTime<Utc>>, OverrideError> {
        Ok(*self.gate.lock())
    }

    fn reset_manual_decision(&self, at: DateTime<Utc>) -> Result<(), OverrideError> {
        *self.gate.lock() = Some(at);
        self.gate_writes.lock().push(at);
        Ok(())
    }
}

// ── Recording sinks ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

#[allow(dead_code)]
impl RecordingAlerts {
    pub fn all(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn count(&self, alert: &Alert) -> usize {
        self.alerts.lock().iter().filter(|a| *a == alert).count()
    }

    pub fn with_subject(&self, needle: &str) -> usize {
        self.alerts
            .lock()
            .iter()
            .filter(|a| a.subject.contains(needle))
            .count()
    }
}

impl AlertSink for RecordingAlerts {
    fn send(&self, alert: &Alert) {
        self.alerts.lock().push(alert.clone());
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    records: Mutex<Vec<(String, StatusRecord)>>,
    fail: Mutex<bool>,
}

#[allow(dead_code)]
impl RecordingStatus {
    pub fn last(&self, dome_id: &str) -> Option<StatusRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == dome_id)
            .map(|(_, r)| *r)
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn count_for(&self, dome_id: &str) -> usize {
        self.records.lock().iter().filter(|(id, _)| id == dome_id).count()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

impl StatusPublisher for RecordingStatus {
    fn publish(&self, dome_id: &str, record: &StatusRecord) -> Result<(), StatusError> {
        if *self.fail.lock() {
            return Err(StatusError::LockTimeout(format!("{dome_id}.stat.lock")));
        }
        self.records.lock().push((dome_id.to_owned(), *record));
        Ok(())
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// One dome wired to mocks, with handles kept for assertions.
pub struct Rig {
    pub site: SiteConfig,
    pub dome: DomeConfig,
    pub hw: Arc<MockHardware>,
    pub clock: Arc<ManualClock>,
    pub weather: Arc<MockWeather>,
    pub overrides: Arc<MockOverrides>,
    pub alerts: Arc<RecordingAlerts>,
    pub status: Arc<RecordingStatus>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        let mut site = SiteConfig::default();
        site.weather_refresh_secs = 1;
        let mut dome = DomeConfig::simulated("aqawan1");
        dome.estop_detection = true;
        dome.partial_open = true;
        let clock = Arc::new(ManualClock::new());
        Self {
            site,
            dome,
            hw: Arc::new(MockHardware::new()),
            weather: Arc::new(MockWeather::new(clock.clone(), clear_night())),
            clock,
            overrides: Arc::new(MockOverrides::requesting()),
            alerts: Arc::new(RecordingAlerts::default()),
            status: Arc::new(RecordingStatus::default()),
        }
    }

    pub fn ports(&self) -> DomePorts {
        DomePorts {
            hardware: self.hw.clone(),
            weather: self.weather.clone(),
            overrides: self.overrides.clone(),
            alerts: self.alerts.clone(),
            status: self.status.clone(),
            clock: self.clock.clone(),
        }
    }
}
