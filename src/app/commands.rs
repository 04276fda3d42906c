//! Actions the controller issues to the enclosure.
//!
//! Produced once per cycle by the decision rules in
//! [`DomeController`](super::service::DomeController) and carried out
//! against the [`HardwareSession`](super::ports::HardwareSession).

use core::fmt;

use chrono::{DateTime, Utc};

/// Why the enclosure is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// Emergency stop is active.
    Estop,
    /// Weather is unsafe.  `sun_only` when the sun altitude is the only reason.
    Weather { sun_only: bool },
    /// Bad weather ended less than one hysteresis window ago.
    Hysteresis { since: DateTime<Utc> },
    /// Nobody asked for this dome to be open.
    NotRequested,
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Estop => f.write_str("emergency stop"),
            Self::Weather { sun_only: true } => f.write_str("sun above limit"),
            Self::Weather { sun_only: false } => f.write_str("unsafe weather"),
            Self::Hysteresis { since } => write!(f, "bad weather at {since}"),
            Self::NotRequested => f.write_str("not requested"),
        }
    }
}

/// One cycle's command for the enclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Close { cause: CloseCause },
    Open { reverse: bool, single_shutter: bool },
}

impl ControlAction {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}
