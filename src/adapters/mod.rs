//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements       | Connects to                          |
//! |----------------|------------------|--------------------------------------|
//! | `simulated`    | HardwareSession  | In-memory dual-shutter enclosure     |
//! | `weather_file` | WeatherSource    | JSON snapshot from the weather daemon|
//! | `overrides`    | OverrideSource   | Flag files + `manualDecision.txt`    |
//! | `status_file`  | StatusPublisher  | `<id>.stat` under a lock file        |
//! | `log_sink`     | AlertSink        | Log output                           |
//! | `time`         | Clock            | System wall clock                    |
//!
//! `daily_log` is not a port: it is the `env_logger` target that writes
//! one log file per UTC day.

pub mod daily_log;
pub mod log_sink;
pub mod overrides;
pub mod simulated;
pub mod status_file;
pub mod time;
pub mod weather_file;

use std::sync::Arc;

use crate::app::ports::{Capabilities, HardwareSession};
use crate::config::{DomeConfig, DriverKind, SiteConfig};
use crate::error::HardwareError;

/// Open a hardware session for `dome` using the configured driver.
pub fn connect(
    dome: &DomeConfig,
    site: &SiteConfig,
) -> Result<Arc<dyn HardwareSession>, HardwareError> {
    match dome.driver {
        DriverKind::Simulated => {
            let caps = Capabilities {
                estop_detection: dome.estop_detection,
                partial_open: dome.partial_open,
                abort: true,
            };
            Ok(Arc::new(
                simulated::SimulatedDome::new(site.heartbeat_timeout()).with_capabilities(caps),
            ))
        }
    }
}
