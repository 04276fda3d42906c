//! Port traits: the hexagonal boundary between dome logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DomeController (domain)
//! ```
//!
//! Driven adapters (dome hardware, weather feed, override flags, alert
//! transport, status records, clock) implement these traits.  The
//! [`DomeController`](super::service::DomeController) holds them as shared
//! trait objects so one controller per dome can run on its own thread.
//!
//! ## Safety notes
//!
//! - **HardwareSession** implementations MUST close the enclosure on their
//!   own when heartbeats stop arriving.  The software loop relies on it.
//! - **OverrideSource** read failures are reported, never defaulted to
//!   "no override" silently; the controller decides the safe reading.
//! - All port errors are typed; callers handle every variant explicitly.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{HardwareError, OverrideError, StatusError, WeatherError};
use crate::weather::WeatherSnapshot;

use super::events::Alert;

// ───────────────────────────────────────────────────────────────
// Hardware session (driven adapter: domain ↔ dome controller)
// ───────────────────────────────────────────────────────────────

/// What a hardware family can do beyond open/close/heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `estop_active` reports the emergency stop.
    pub estop_detection: bool,
    /// `open(_, true)` opens one shutter only.
    pub partial_open: bool,
    /// `abort` interrupts a running open.
    pub abort: bool,
}

/// Position of a single shutter as reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterState {
    Open,
    Opening,
    Closed,
    Closing,
    Unknown,
}

/// One status read from the dome controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareStatus {
    pub shutters: Vec<ShutterState>,
    /// Controller reports a fault condition.
    pub fault: bool,
    /// Controller-side error text, if any.
    pub error: Option<String>,
    /// Controller is ready to accept commands.
    pub ready: bool,
}

impl HardwareStatus {
    /// Open means every shutter reports open.
    pub fn is_open(&self) -> bool {
        !self.shutters.is_empty() && self.shutters.iter().all(|s| *s == ShutterState::Open)
    }

    pub fn is_closed(&self) -> bool {
        !self.shutters.is_empty() && self.shutters.iter().all(|s| *s == ShutterState::Closed)
    }

    pub fn any_moving(&self) -> bool {
        self.shutters
            .iter()
            .any(|s| matches!(s, ShutterState::Opening | ShutterState::Closing))
    }
}

/// A live connection to one dome's hardware.
///
/// Shared between the control loop and the background open thread, hence
/// `&self` methods and `Send + Sync`.
pub trait HardwareSession: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn status(&self) -> Result<HardwareStatus, HardwareError>;

    /// Open the enclosure.  Blocks until the shutters are open or the
    /// command fails.  `reverse` swaps shutter order; `single_shutter`
    /// opens only the first shutter of that order.
    fn open(&self, reverse: bool, single_shutter: bool) -> Result<(), HardwareError>;

    /// Close the enclosure.  Idempotent.
    fn close(&self) -> Result<(), HardwareError>;

    /// Keep the hardware watchdog from closing the enclosure.
    fn heartbeat(&self) -> Result<(), HardwareError>;

    fn is_open(&self) -> Result<bool, HardwareError> {
        self.status().map(|s| s.is_open())
    }

    /// Emergency-stop state.  Only meaningful with `estop_detection`.
    fn estop_active(&self) -> Result<bool, HardwareError> {
        Err(HardwareError::Unsupported("estop query"))
    }

    /// Interrupt an in-progress open.  Only meaningful with `abort`.
    fn abort(&self) -> Result<(), HardwareError> {
        Err(HardwareError::Unsupported("abort"))
    }
}

// ───────────────────────────────────────────────────────────────
// Weather source (driven adapter: weather daemon → domain)
// ───────────────────────────────────────────────────────────────

pub trait WeatherSource: Send + Sync {
    /// Latest snapshot from the weather collaborator.
    fn current_snapshot(&self) -> Result<WeatherSnapshot, WeatherError>;
}

// ───────────────────────────────────────────────────────────────
// Override source (driven adapter: operators → domain)
// ───────────────────────────────────────────────────────────────

/// Operator overrides for one dome, polled every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideFlags {
    /// Ignore the sun altitude limit (daytime work).
    pub sun: bool,
    /// Skip the cloud-sensor check.
    pub cloud: bool,
    /// Skip the post-bad-weather hysteresis.
    pub timeout: bool,
    /// Observers want this dome open.
    pub open_requested: bool,
}

pub trait OverrideSource: Send + Sync {
    fn flags(&self, dome_id: &str) -> Result<OverrideFlags, OverrideError>;

    /// Stored manual decision timestamp; `None` when no gate exists.
    fn manual_decision(&self) -> Result<Option<DateTime<Utc>>, OverrideError>;

    /// Write (or rewrite) the manual decision timestamp.
    fn reset_manual_decision(&self, at: DateTime<Utc>) -> Result<(), OverrideError>;
}

// ───────────────────────────────────────────────────────────────
// Alert sink (driven adapter: domain → operators)
// ───────────────────────────────────────────────────────────────

pub trait AlertSink: Send + Sync {
    /// Deliver an alert.  Failures are the adapter's to log; alerting
    /// never blocks the control loop.
    fn send(&self, alert: &Alert);
}

// ───────────────────────────────────────────────────────────────
// Status publisher (driven adapter: domain → external readers)
// ───────────────────────────────────────────────────────────────

/// Externally visible state of one dome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRecord {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
}

pub trait StatusPublisher: Send + Sync {
    fn publish(&self, dome_id: &str, record: &StatusRecord) -> Result<(), StatusError>;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Wall-clock time in UTC, injected so tests control it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// ───────────────────────────────────────────────────────────────
// Bundle
// ───────────────────────────────────────────────────────────────

/// Every collaborator one dome controller needs.
#[derive(Clone)]
pub struct DomePorts {
    pub hardware: Arc<dyn HardwareSession>,
    pub weather: Arc<dyn WeatherSource>,
    pub overrides: Arc<dyn OverrideSource>,
    pub alerts: Arc<dyn AlertSink>,
    pub status: Arc<dyn StatusPublisher>,
    pub clock: Arc<dyn Clock>,
}
