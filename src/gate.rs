//! Manual decision gate.
//!
//! After wet and freezing conditions a human has to look at the roof before
//! the enclosure may open again.  The gate is a single persisted timestamp
//! owned by the [`OverrideSource`](crate::app::ports::OverrideSource):
//!
//! ```text
//!   absent ──[freeze + precipitation]──▶ engaged (now − 1 day)
//!     ▲                                      │
//!     │                              [older than TTL]
//!     │                                      ▼
//!     └──[operator deletes it]──── expired: reset + one inspection alert
//! ```
//!
//! While the timestamp exists opening is blocked.  The gate itself never
//! clears automatically; only its absence lifts the block.

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};

/// How the stored timestamp reads at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// No manual block in force.
    Absent,
    /// Set less than one TTL ago.
    Active { set_at: DateTime<Utc> },
    /// Set one TTL ago or earlier; needs re-confirmation.
    Expired { set_at: DateTime<Utc> },
}

/// Classify a stored gate timestamp.
pub fn classify(stored: Option<DateTime<Utc>>, now: DateTime<Utc>, ttl: Duration) -> GateStatus {
    match stored {
        None => GateStatus::Absent,
        Some(set_at) if now - set_at < ttl => GateStatus::Active { set_at },
        Some(set_at) => GateStatus::Expired { set_at },
    }
}

/// Side effects the controller must carry out for the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEffect {
    /// Rewrite an expired gate so any earlier approval is void.
    Reset { to: DateTime<Utc> },
    /// Create the gate because the freeze rule tripped.
    Engage { to: DateTime<Utc> },
    /// Ask operators to inspect the enclosure (once per episode).
    RequestInspection,
    /// The gate disappeared after an inspection request.
    Resumed,
}

/// Outcome of one gate review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateReview {
    pub status: GateStatus,
    pub blocked: bool,
    pub effects: Vec<GateEffect>,
}

/// Per-dome gate bookkeeping: remembers whether the inspection alert for
/// the current episode has already gone out.
#[derive(Debug, Clone)]
pub struct ManualGate {
    ttl: Duration,
    inspection_requested: bool,
}

impl ManualGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inspection_requested: false,
        }
    }

    /// Review the stored gate at `now`.
    pub fn review(&mut self, stored: Option<DateTime<Utc>>, now: DateTime<Utc>) -> GateReview {
        let status = classify(stored, now, self.ttl);
        let mut effects = Vec::new();

        let blocked = match status {
            GateStatus::Absent => {
                if self.inspection_requested {
                    info!("Manual decision gate cleared; resuming normal operations");
                    effects.push(GateEffect::Resumed);
                    self.inspection_requested = false;
                }
                false
            }
            GateStatus::Active { set_at } => {
                info!("Not OK to open: manual decision gate set at {set_at}");
                true
            }
            GateStatus::Expired { set_at } => {
                if !self.inspection_requested {
                    warn!("Manual decision gate from {set_at} expired; inspection required");
                    effects.push(GateEffect::Reset {
                        to: now - Duration::days(1),
                    });
                    effects.push(GateEffect::RequestInspection);
                    self.inspection_requested = true;
                }
                true
            }
        };

        GateReview {
            status,
            blocked,
            effects,
        }
    }

    /// Engage the gate for the freeze-and-precipitation rule.
    ///
    /// Returns nothing if a gate already exists; the normal review handles it.
    pub fn engage(&mut self, stored: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<GateEffect> {
        if stored.is_some() {
            return Vec::new();
        }
        warn!("Engaging manual decision gate: precipitation and freezing temperatures");
        let mut effects = vec![GateEffect::Engage {
            to: now - Duration::days(1),
        }];
        if !self.inspection_requested {
            effects.push(GateEffect::RequestInspection);
            self.inspection_requested = true;
        }
        effects
    }

    pub fn inspection_requested(&self) -> bool {
        self.inspection_requested
    }
}
