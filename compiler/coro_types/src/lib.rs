//! Type pool for state machine lowering.
//!
//! The tree refers to types through [`Idx`] handles. [`Pool`] owns the data
//! behind the non-primitive handles and answers the questions lowering asks:
//!
//! - Is this a reference type, a value type, or a type parameter?
//! - What are a struct's instance fields, and can they be inspected at all?
//! - Are two types the same representation once purely cosmetic annotations
//!   (`dynamic`, tuple element names) are ignored? See [`TypeKey`].
//!
//! # Design
//!
//! Same layout as a Zig-style intern pool: primitives live at fixed indices
//! (see [`Idx`]), everything else is appended and addressed by
//! `Idx::FIRST_DYNAMIC + offset`. Arrays and tuples are interned
//! structurally; classes, structs and type parameters are nominal.

mod pool;
mod tag;

pub use coro_ir::Idx;
pub use pool::{Layout, Pool, TypeKey};
pub use tag::Tag;
