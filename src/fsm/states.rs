//! Concrete phase handler functions and table builder.
//!
//! Each phase is defined by plain `fn` pointers.  Handlers only look at the
//! blackboard: the last status read, the action commanded this cycle and
//! whether a background open is still running.
//!
//! ```text
//!  UNKNOWN ──[first status]──▶ observed phase
//!
//!  CLOSED ──[open in flight]──▶ OPENING ──[shutters open]──▶ OPEN
//!    ▲                            │  ▲                         │
//!    │                   [close]  │  │ [open in flight]  [close]
//!    │                            ▼  │                         ▼
//!    └─────[shutters closed]──── CLOSING ◀─────────────────────┘
//!
//!  OPENING ──[open ended, shutters not open]──▶ observed phase
//! ```

use log::{info, warn};

use super::context::DomeState;
use super::{DomePhase, PhaseDescriptor};
use crate::app::ports::ShutterState;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_phase_table() -> [PhaseDescriptor; DomePhase::COUNT] {
    [
        PhaseDescriptor {
            id: DomePhase::Unknown,
            name: "Unknown",
            on_enter: None,
            on_exit: None,
            on_update: unknown_update,
        },
        PhaseDescriptor {
            id: DomePhase::Closed,
            name: "Closed",
            on_enter: Some(closed_enter),
            on_exit: None,
            on_update: closed_update,
        },
        PhaseDescriptor {
            id: DomePhase::Opening,
            name: "Opening",
            on_enter: Some(opening_enter),
            on_exit: None,
            on_update: opening_update,
        },
        PhaseDescriptor {
            id: DomePhase::Open,
            name: "Open",
            on_enter: Some(open_enter),
            on_exit: None,
            on_update: open_update,
        },
        PhaseDescriptor {
            id: DomePhase::Closing,
            name: "Closing",
            on_enter: Some(closing_enter),
            on_exit: None,
            on_update: closing_update,
        },
    ]
}

/// Phase implied by the last status read alone.
///
/// A single open shutter with nothing moving counts as open.
fn observed_phase(ctx: &DomeState) -> Option<DomePhase> {
    let status = ctx.observed.as_ref()?;
    let has = |s: ShutterState| status.shutters.contains(&s);
    Some(if status.is_open() {
        DomePhase::Open
    } else if status.is_closed() {
        DomePhase::Closed
    } else if has(ShutterState::Closing) {
        DomePhase::Closing
    } else if has(ShutterState::Opening) {
        DomePhase::Opening
    } else if has(ShutterState::Open) {
        DomePhase::Open
    } else {
        DomePhase::Unknown
    })
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNKNOWN
// ═══════════════════════════════════════════════════════════════════════════

fn unknown_update(ctx: &mut DomeState) -> Option<DomePhase> {
    observed_phase(ctx).filter(|p| *p != DomePhase::Unknown)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CLOSED
// ═══════════════════════════════════════════════════════════════════════════

fn closed_enter(ctx: &mut DomeState) {
    info!("{}: enclosure closed", ctx.id);
}

fn closed_update(ctx: &mut DomeState) -> Option<DomePhase> {
    if ctx.open_in_flight {
        return Some(DomePhase::Opening);
    }
    match observed_phase(ctx)? {
        DomePhase::Closed | DomePhase::Unknown => None,
        other => {
            if !ctx.wants_open() {
                warn!("{}: found {other:?} while closed", ctx.id);
            }
            Some(other)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPENING
// ═══════════════════════════════════════════════════════════════════════════

fn opening_enter(ctx: &mut DomeState) {
    info!("{}: opening", ctx.id);
}

fn opening_update(ctx: &mut DomeState) -> Option<DomePhase> {
    let seen = observed_phase(ctx);
    if !ctx.wants_open() {
        return Some(if seen == Some(DomePhase::Closed) {
            DomePhase::Closed
        } else {
            DomePhase::Closing
        });
    }
    match seen {
        Some(DomePhase::Open) => Some(DomePhase::Open),
        // The open attempt ended without opening: believe the hardware.
        Some(p) if !ctx.open_in_flight && p != DomePhase::Opening => {
            warn!("{}: open attempt ended with enclosure {p:?}", ctx.id);
            Some(p)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPEN
// ═══════════════════════════════════════════════════════════════════════════

fn open_enter(ctx: &mut DomeState) {
    info!("{}: enclosure open", ctx.id);
}

fn open_update(ctx: &mut DomeState) -> Option<DomePhase> {
    let seen = observed_phase(ctx);
    if !ctx.wants_open() {
        return Some(if seen == Some(DomePhase::Closed) {
            DomePhase::Closed
        } else {
            DomePhase::Closing
        });
    }
    match seen {
        // Closed underneath us, e.g. the hardware watchdog fired.
        Some(p @ (DomePhase::Closed | DomePhase::Closing)) => {
            warn!("{}: enclosure {p:?} while meant to be open", ctx.id);
            Some(p)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CLOSING
// ═══════════════════════════════════════════════════════════════════════════

fn closing_enter(ctx: &mut DomeState) {
    info!("{}: closing", ctx.id);
}

fn closing_update(ctx: &mut DomeState) -> Option<DomePhase> {
    let seen = observed_phase(ctx);
    if seen == Some(DomePhase::Closed) {
        return Some(DomePhase::Closed);
    }
    if ctx.wants_open() {
        if seen == Some(DomePhase::Open) {
            return Some(DomePhase::Open);
        }
        if ctx.open_in_flight {
            return Some(DomePhase::Opening);
        }
    }
    None
}
