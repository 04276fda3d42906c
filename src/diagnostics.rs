//! Failure reporting and runtime diagnostics.
//!
//! A dome loop that returns an error or panics is turned into a
//! [`FailureReport`]: dome id, failure kind, message and time.  The
//! supervisor keeps the last few in a [`FailureLog`] ring and mails each
//! one to the operators as a critical alert.
//!
//! [`LoopMetrics`] counts what each control loop did (cycles, heartbeats,
//! command failures).  Controllers log them periodically; tests read them.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::events::{Alert, Severity};

const FAILURE_RING_SLOTS: usize = 8;
const MAX_MESSAGE_LEN: usize = 512;

// ───────────────────────────────────────────────────────────────
// Failure reports
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The loop returned a fatal error.
    Error,
    /// The loop panicked.
    Panic,
    /// The controller could not be built.
    Startup,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Panic => "panic",
            Self::Startup => "startup failure",
        })
    }
}

/// One dome loop failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub dome_id: String,
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FailureReport {
    pub fn new(dome_id: &str, kind: FailureKind, message: &str, at: DateTime<Utc>) -> Self {
        let mut message = message.to_owned();
        if message.len() > MAX_MESSAGE_LEN {
            let mut cut = MAX_MESSAGE_LEN;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Self {
            dome_id: dome_id.to_owned(),
            kind,
            message,
            at,
        }
    }

    /// Critical alert naming the dome in subject and body.
    pub fn to_alert(&self, restarting: bool) -> Alert {
        let next = if restarting {
            "The supervisor will restart its control loop."
        } else {
            "Its control loop stays stopped; the enclosure will close on its own \
             once heartbeats stop. Restart the daemon after fixing the problem."
        };
        Alert::new(
            Severity::Critical,
            format!("{} has crashed", self.dome_id),
            format!(
                "The {} control loop stopped at {} ({}): {}\n\n{next}",
                self.dome_id, self.at, self.kind, self.message
            ),
        )
    }
}

/// Bounded ring of recent failures, oldest evicted first.
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: VecDeque<FailureReport>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: FailureReport) {
        if self.entries.len() == FAILURE_RING_SLOTS {
            self.entries.pop_front();
        }
        self.entries.push_back(report);
    }

    pub fn entries(&self) -> impl Iterator<Item = &FailureReport> {
        self.entries.iter()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

// ───────────────────────────────────────────────────────────────
// Loop metrics
// ───────────────────────────────────────────────────────────────

/// Counters for one dome loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopMetrics {
    pub cycles: u64,
    pub heartbeats_sent: u64,
    pub heartbeat_failures: u64,
    pub command_failures: u64,
    pub status_failures: u64,
    pub weather_failures: u64,
    /// Cycles whose work took longer than the period.
    pub overruns: u64,
}

impl fmt::Display for LoopMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} heartbeats={} heartbeat_failures={} command_failures={} \
             status_failures={} weather_failures={} overruns={}",
            self.cycles,
            self.heartbeats_sent,
            self.heartbeat_failures,
            self.command_failures,
            self.status_failures,
            self.weather_failures,
            self.overruns
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that routes panics to the log.
///
/// Call once during startup, after the logger.  The supervisor still
/// catches the unwind; this only makes sure the message, thread name and
/// location land in the same log as everything else.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = panic_message(info.payload());
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        match info.location() {
            Some(loc) => log::error!(
                "PANIC in thread {name} at {}:{}: {reason}",
                loc.file(),
                loc.line()
            ),
            None => log::error!("PANIC in thread {name}: {reason}"),
        }
    }));
}
