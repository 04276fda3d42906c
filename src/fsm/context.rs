//! Per-dome state threaded through every FSM handler.
//!
//! `DomeState` is the single struct that phase handlers read from and the
//! controller writes to.  It holds the last hardware status read, the
//! action commanded this cycle, the bad-weather timestamp that drives the
//! hysteresis, and the estop bookkeeping.  Think of it as the
//! "blackboard" in a blackboard architecture.

use chrono::{DateTime, Duration, Utc};

use crate::app::commands::ControlAction;
use crate::app::ports::HardwareStatus;

/// The shared context passed to every phase handler function.
#[derive(Debug, Clone)]
pub struct DomeState {
    pub id: String,

    // -- Hardware view --
    /// Latest status read.  `None` until the first successful read.
    pub observed: Option<HardwareStatus>,
    /// Controller is ready to accept commands.
    pub ready: bool,
    /// Controller reports a fault.
    pub fault: bool,

    // -- Decisions --
    /// Action commanded this cycle.
    pub intent: Option<ControlAction>,
    /// A background open is still running.
    pub open_in_flight: bool,
    /// Start of the current hysteresis window.  Moves forward only.
    pub last_bad_weather_at: Option<DateTime<Utc>>,

    // -- Estop --
    pub estop_active: bool,
    pub estop_alert_sent: bool,
}

impl DomeState {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            observed: None,
            ready: false,
            fault: false,
            intent: None,
            open_in_flight: false,
            last_bad_weather_at: None,
            estop_active: false,
            estop_alert_sent: false,
        }
    }

    /// Record bad weather at `now`.  Never moves the timestamp backwards.
    pub fn note_bad_weather(&mut self, now: DateTime<Utc>) {
        self.last_bad_weather_at = Some(match self.last_bad_weather_at {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    /// Start of the hysteresis window if it is still running at `now`.
    pub fn in_hysteresis(&self, now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
        self.last_bad_weather_at.filter(|&at| now - at < window)
    }

    pub fn wants_open(&self) -> bool {
        self.intent.is_some_and(|a| a.is_open())
    }
}
