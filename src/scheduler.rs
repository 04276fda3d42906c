//! Loop timing.
//!
//! Two clocks drive a dome loop:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Cadence (monotonic)            RefreshTimer (wall clock)    │
//! │  ┌──────────────────────┐       ┌─────────────────────────┐  │
//! │  │ cycle: T = 14 s      │       │ weather: every 30 min   │  │
//! │  │ sleep max(T − work,0)│       │ + immediately when none │  │
//! │  └──────────┬───────────┘       └────────────┬────────────┘  │
//! │             │                                │               │
//! │             ▼                                ▼               │
//! │       DomeController::run         DomeController::cycle      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cadence measures work with [`Instant`] so a wall-clock step cannot
//! starve the heartbeat.  Refresh timers use the injected
//! [`Clock`](crate::app::ports::Clock) so tests can fast-forward them.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Heartbeats that must fit into one hardware heartbeat timeout.
pub const MIN_HEARTBEATS_PER_TIMEOUT: u32 = 4;

// ═══════════════════════════════════════════════════════════════
//  Cycle cadence
// ═══════════════════════════════════════════════════════════════

/// Fixed-period cycle pacing.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period: Duration,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left to sleep after a cycle that took `elapsed`.
    /// Zero when the cycle overran.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.period.saturating_sub(elapsed)
    }

    /// Start timing one cycle.
    pub fn start(&self) -> CycleTimer {
        CycleTimer {
            started: Instant::now(),
            period: self.period,
        }
    }
}

/// Measures one cycle's work.
#[derive(Debug)]
pub struct CycleTimer {
    started: Instant,
    period: Duration,
}

impl CycleTimer {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.period.saturating_sub(self.elapsed())
    }

    pub fn overran(&self) -> bool {
        self.elapsed() > self.period
    }
}

// ═══════════════════════════════════════════════════════════════
//  Periodic refresh
// ═══════════════════════════════════════════════════════════════

/// Fires every `interval` of wall-clock time, and immediately before the
/// first [`mark`](Self::mark).
#[derive(Debug, Clone)]
pub struct RefreshTimer {
    interval: chrono::Duration,
    last: Option<DateTime<Utc>>,
}

impl RefreshTimer {
    pub fn new(interval: chrono::Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Due if never marked or `interval` has passed since the last mark.
    /// A clock stepping backwards also counts as due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last {
            None => true,
            Some(last) => now < last || now - last >= self.interval,
        }
    }

    pub fn mark(&mut self, now: DateTime<Utc>) {
        self.last = Some(now);
    }
}
