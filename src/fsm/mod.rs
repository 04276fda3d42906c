//! Function-pointer finite state machine engine for the enclosure phase.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  PhaseTable                                              │
//! │  ┌─────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ Phase   │ on_enter  │ on_exit  │ on_update         │  │
//! │  ├─────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Unknown │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Closed  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Opening │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Open    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Closing │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  └─────────┴───────────┴──────────┴───────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The controller ticks the engine once per cycle after it has read the
//! hardware status and chosen an action.  `on_update` for the current
//! phase looks at both and may return the next phase; the engine then
//! runs `on_exit`, swaps the pointer and runs `on_enter`.  The phase is
//! bookkeeping for logs and tests: hardware status is the source of truth
//! and a failed command never moves the phase on its own.

pub mod context;
pub mod states;

use context::DomeState;
use log::info;

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

/// Enclosure phases.
/// Must stay in sync with the table built in [`states::build_phase_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DomePhase {
    /// Before the first successful status read.
    Unknown = 0,
    Closed = 1,
    Opening = 2,
    Open = 3,
    Closing = 4,
}

impl DomePhase {
    /// Total number of phases; sizes the table array.
    pub const COUNT: usize = 5;

    /// Convert an index back to `DomePhase`.  Panics on out-of-range in
    /// debug builds; returns `Unknown` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Unknown,
            1 => Self::Closed,
            2 => Self::Opening,
            3 => Self::Open,
            4 => Self::Closing,
            _ => {
                debug_assert!(false, "invalid phase index: {idx}");
                Self::Unknown
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type PhaseActionFn = fn(&mut DomeState);

/// Signature for the per-cycle update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type PhaseUpdateFn = fn(&mut DomeState) -> Option<DomePhase>;

// ---------------------------------------------------------------------------
// Phase descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single phase.
pub struct PhaseDescriptor {
    pub id: DomePhase,
    pub name: &'static str,
    pub on_enter: Option<PhaseActionFn>,
    pub on_exit: Option<PhaseActionFn>,
    pub on_update: PhaseUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the phase table and threads a mutable [`DomeState`] through every
/// handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `DomePhase as usize`.
    table: [PhaseDescriptor; DomePhase::COUNT],
    /// Index of the currently active phase.
    current: usize,
}

impl Fsm {
    pub fn new(table: [PhaseDescriptor; DomePhase::COUNT], initial: DomePhase) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting phase.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut DomeState) {
        info!(
            "{}: phase machine starting in {}",
            ctx.id, self.table[self.current].name
        );
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one cycle.
    ///
    /// 1. Call `on_update` for the current phase.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut DomeState) {
        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            if next_id as usize != self.current {
                self.transition(next_id, ctx);
            }
        }
    }

    pub fn current_state(&self) -> DomePhase {
        DomePhase::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: DomePhase, ctx: &mut DomeState) {
        let next_idx = next_id as usize;

        info!(
            "{}: {} -> {}",
            ctx.id, self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
