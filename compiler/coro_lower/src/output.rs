//! Lowering results.

use coro_ir::{LocalId, LocalTable, SlotId, Stmt};

use crate::slots::SlotTable;
use crate::state::FinalizerMap;

/// A debug-scope marker: user variables hoisted into `slots` are live
/// within the marked statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugScope {
    pub slots: Vec<SlotId>,
    /// Nesting depth among markers; outermost is 0.
    pub depth: u32,
}

/// A lowered method body.
#[derive(Debug)]
pub struct LoweredBody {
    /// The re-entrant body: prologue, state dispatch, rewritten statements.
    pub body: Stmt,
    /// The input local table extended with the locals lowering introduced.
    pub locals: LocalTable,
    /// Every durable slot, frame slots first.
    pub slots: SlotTable,
    /// Empty unless the strategy keeps finalizer bookkeeping.
    pub finalizer_map: FinalizerMap,
    /// In the order their markers appear in `body`.
    pub debug_scopes: Vec<DebugScope>,
    /// State values handed out, finalizer states included.
    pub state_count: u32,
    pub first_state: u32,
    /// Per-activation copy of the persisted state.
    pub cached_state: LocalId,
    /// Per-activation copy of the current instance, in optimized builds of
    /// instance methods on reference types.
    pub this_cache: Option<LocalId>,
}
