//! Outbound operator alerts.
//!
//! The [`DomeController`](super::service::DomeController) and the
//! [`Supervisor`](crate::supervisor::Supervisor) emit these through the
//! [`AlertSink`](super::ports::AlertSink) port.  Adapters on the other
//! side decide what to do with them.

use core::fmt;

/// How urgently a human should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Informational,
    Serious,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Informational => "informational",
            Self::Serious => "serious",
            Self::Critical => "critical",
        })
    }
}

/// A message for the operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub severity: Severity,
    pub subject: String,
    pub body: String,
}

impl Alert {
    pub fn new(severity: Severity, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity,
            subject: subject.into(),
            body: body.into(),
        }
    }

    // ── Dome alerts ───────────────────────────────────────────────

    pub fn estop_tripped(dome_id: &str) -> Self {
        Self::new(
            Severity::Serious,
            format!("{dome_id} emergency stop tripped"),
            format!(
                "The emergency stop on {dome_id} is active. The enclosure will not \
                 open until it is cleared and the controller reports ready."
            ),
        )
    }

    pub fn estop_cleared(dome_id: &str) -> Self {
        Self::new(
            Severity::Informational,
            format!("{dome_id} emergency stop cleared"),
            format!("The emergency stop on {dome_id} has been cleared."),
        )
    }

    pub fn inspection_required(dome_id: &str) -> Self {
        Self::new(
            Severity::Serious,
            format!("{dome_id} needs a manual inspection"),
            "Precipitation with freezing temperatures was recorded or the last \
             manual decision has expired. Check the enclosure for ice and snow, \
             then delete the manual decision file to resume operations.",
        )
    }

    pub fn inspection_done(dome_id: &str) -> Self {
        Self::new(
            Severity::Informational,
            format!("{dome_id} manually checked, resuming operations"),
            format!("The manual decision gate was cleared; {dome_id} may open again."),
        )
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.subject)
    }
}
