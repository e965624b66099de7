//! Internal consistency failures.
//!
//! The input tree is semantically valid by construction, so nothing here is
//! a user diagnostic: apart from running out of state numbers, every variant
//! means an earlier pass handed this one a tree it promised not to produce.
//! Drivers report these as internal compiler errors.

use coro_ir::{Span, Variable};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LowerError {
    /// A structured statement that must already be lowered to blocks and
    /// `try` statements.
    #[error("`{kind}` statement at {span:?} reached state machine lowering unlowered")]
    UnloweredConstruct { kind: &'static str, span: Span },

    /// A current-instance reference in a method without one.
    #[error("reference to the current instance at {span:?} in a static method")]
    ThisInStaticMethod { span: Span },

    /// A variable that must live in durable storage was referenced before
    /// any proxy was registered for it.
    #[error("{variable:?} needs durable storage but has no proxy")]
    MissingProxy { variable: Variable },

    /// By-reference hoisting of an expression whose address is not stable.
    #[error("cannot hoist {kind} by reference across a suspension point")]
    UnsupportedRefHoist { kind: &'static str },

    /// A suspension point inside a `catch` or `finally` clause. Resumption
    /// can only re-enter a `try` body through its dispatch header.
    #[error("suspension point at {span:?} inside an exception handler")]
    SuspensionInHandler { span: Span },

    /// More states than the persisted state value can number, counting up
    /// from the strategy's first state.
    #[error("state numbers starting at {first_state} exhausted")]
    StatesExhausted { first_state: u32 },
}
