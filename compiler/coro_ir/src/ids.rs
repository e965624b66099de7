//! Id newtypes.
//!
//! Every id is a dense `u32` allocated sequentially from 0 by whoever owns
//! the corresponding table (the method's [`LocalTable`](crate::LocalTable),
//! the lowering pass's label counter, the slot table, the state allocator).

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create an id from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A local variable declared in (or synthesized for) the method body.
    LocalId,
    "local"
);

define_id!(
    /// A declared parameter of the original method.
    ParamId,
    "param"
);

define_id!(
    /// A jump target. Labels are unique per lowered method.
    LabelId,
    "L"
);

define_id!(
    /// A durable storage slot (a field of the state machine instance).
    SlotId,
    "slot"
);

define_id!(
    /// A resumable state number.
    ///
    /// State numbers are non-negative and never reused within one method.
    /// The negative values the persisted state can hold (running, finished)
    /// are sentinels, not states, and have no `StateId`.
    StateId,
    "state"
);

impl StateId {
    /// The value stored in the persisted state field for this state.
    #[inline]
    pub fn value(self) -> i64 {
        i64::from(self.0)
    }
}
