//! Coro IR - the tree consumed and produced by state machine lowering.
//!
//! This crate contains the data structures shared by every pass around the
//! resumable-method lowering:
//! - Spans for source locations
//! - Names for interned identifiers
//! - [`Idx`] type handles (interpreted by `coro_types::Pool`)
//! - Id newtypes for locals, parameters, labels, storage slots and states
//! - The statement/expression tree ([`Stmt`], [`Expr`]) with explicit
//!   suspension points
//! - The method descriptor ([`OriginalMethod`], [`LocalTable`])
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: Strings → `Name(u32)`, Types → `Idx(u32)`
//! - **Immutable Input**: passes never mutate a tree, they rebuild it
//! - **Typed Leaves**: every variable reference carries its type so a pass
//!   can size storage without a side table

mod idx;
mod ids;
mod interner;
mod method;
mod name;
mod span;
pub mod tree;
pub mod visitor;

pub use idx::Idx;
pub use ids::{LabelId, LocalId, ParamId, SlotId, StateId};
pub use interner::StringInterner;
pub use method::{
    LocalDecl, LocalKind, LocalTable, OriginalMethod, ParamDecl, RefKind, Variable,
};
pub use name::Name;
pub use span::Span;
pub use tree::{
    BinaryOp, Block, CatchClause, Dispatch, DispatchArm, Expr, FieldRef, Literal, Stmt,
    SuspendKind, SuspendPoint, SwitchSection, TryStmt,
};
