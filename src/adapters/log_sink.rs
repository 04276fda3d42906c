//! Log-based alert sink adapter.
//!
//! Implements [`AlertSink`] by writing alerts to the process logger at a
//! level matching their severity.  A mail or paging adapter would
//! implement the same trait.

use log::{error, info, warn};

use crate::app::events::{Alert, Severity};
use crate::app::ports::AlertSink;

/// Adapter that logs every [`Alert`].
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl LogAlertSink {
    pub fn new() -> Self {
        Self
    }
}

impl AlertSink for LogAlertSink {
    fn send(&self, alert: &Alert) {
        match alert.severity {
            Severity::Informational => info!("ALERT | {} | {}", alert.subject, alert.body),
            Severity::Serious => warn!("ALERT | {} | {}", alert.subject, alert.body),
            Severity::Critical => error!("ALERT | {} | {}", alert.subject, alert.body),
        }
    }
}
