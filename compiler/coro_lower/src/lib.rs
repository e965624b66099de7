//! State machine lowering for resumable methods.
//!
//! Rewrites a method body containing suspension points (`await`, `yield`)
//! into a single re-entrant body driven by an integer state:
//!
//! - **States** ([`StateAllocator`]): every suspension point gets a state
//!   number and a resume label; the body starts with a dispatch on the
//!   persisted state that jumps straight back to the right point.
//! - **Hoisting**: variables that live across a suspension move into
//!   durable slots of the machine instance ([`SlotTable`]). Optimized
//!   builds share slots between variables with disjoint lifetimes; every
//!   build clears reference-holding slots when their scope ends.
//! - **Protected regions**: each `try` body gets its own dispatch header,
//!   and (for machines that can be disposed while suspended) a finalizer
//!   state that runs the enclosing `finally` blocks without resuming the
//!   body ([`FinalizerMap`]).
//!
//! What a suspension does and how the machine returns to its caller is
//! supplied per invocation by a [`ResumeStrategy`]: [`AsyncStrategy`] for
//! asynchronous methods, [`IteratorStrategy`] for pausable iterations.
//!
//! # Pipeline Position
//!
//! ```text
//! loop/using lowering → spilling → capture analysis → [state machine lowering] → emission
//! ```
//!
//! The input tree has no structured loops or `using` statements left, and
//! every suspension point is a statement. [`analyze_hoisted_variables`]
//! computes which variables need slots when the driver has not already
//! decided.

mod capture;
mod classify;
mod error;
mod frame;
mod hoist;
mod options;
mod output;
mod rewrite;
mod slots;
mod state;
mod strategy;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

use coro_ir::{LocalTable, OriginalMethod, Stmt, StringInterner, Variable};
use coro_types::Pool;
use rustc_hash::FxHashSet;

pub use capture::analyze_hoisted_variables;
pub use classify::RetentionClassifier;
pub use error::LowerError;
pub use frame::{Proxy, StateMachineFrame};
pub use options::{LowerOptions, OptimizationLevel};
pub use output::{DebugScope, LoweredBody};
pub use slots::{PreviousSlots, ReusePool, SlotDecl, SlotKey, SlotKind, SlotTable};
pub use state::{
    ClosedScope, DispatchTable, FinalizerMap, StateAllocator, FINISHED, FIRST_UNUSED,
    NOT_STARTED_OR_RUNNING,
};
pub use strategy::{AsyncIntrinsics, AsyncStrategy, IteratorStrategy, ResumeStrategy};

use hoist::{Hoisting, HoistingConfig};
use rewrite::Rewriter;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber for lowering diagnostics.
///
/// Does nothing unless `RUST_LOG` is set; safe to call repeatedly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Everything lowering needs to know about one method.
pub struct LowerInput<'a> {
    pub method: &'a OriginalMethod,
    pub locals: LocalTable,
    pub body: &'a Stmt,
    /// Slots and proxies allocated by the caller. Must hold a proxy for
    /// every parameter (and the current instance) in `hoisted`.
    pub frame: StateMachineFrame,
    /// Variables that must live in slots.
    pub hoisted: FxHashSet<Variable>,
    /// Slot indices from a previous compilation of the method.
    pub previous_slots: Option<&'a dyn PreviousSlots>,
}

/// Lower `input.body` into a re-entrant state machine body.
///
/// # Errors
///
/// Returns a [`LowerError`] if the input violates a precondition of this
/// pass (an unlowered loop, a hoisted variable without a proxy, ...).
/// These are internal compiler errors, not user diagnostics.
pub fn lower_state_machine<'a>(
    input: LowerInput<'a>,
    pool: &'a Pool,
    interner: &'a StringInterner,
    strategy: &'a dyn ResumeStrategy,
    options: &LowerOptions,
) -> Result<LoweredBody, LowerError> {
    let first_state = options.first_state.unwrap_or_else(|| strategy.first_state());
    tracing::debug!(
        method = interner.lookup(input.method.name),
        hoisted = input.hoisted.len(),
        first_state,
        optimized = options.is_optimized(),
        "lowering state machine"
    );

    let (slots, state_slot, proxies) = input.frame.into_parts();
    let first_slot_index = u32::try_from(slots.len()).unwrap_or(u32::MAX);
    let hoisting = Hoisting::new(HoistingConfig {
        classifier: RetentionClassifier::new(pool),
        interner,
        method: input.method,
        previous: input.previous_slots,
        optimized: options.is_optimized(),
        slots,
        proxies,
        hoisted: input.hoisted,
        first_slot_index,
    });
    let states = StateAllocator::new(first_state, strategy.uses_finalizer_bookkeeping());

    let lowered = Rewriter::new(input.method, strategy, input.locals, states, hoisting, state_slot)
        .lower(input.body)?;

    tracing::debug!(
        states = lowered.state_count,
        slots = lowered.slots.len(),
        debug_scopes = lowered.debug_scopes.len(),
        "lowered state machine"
    );
    Ok(lowered)
}
