//! Type handle.
//!
//! `Idx` is how the tree refers to types. The handle is meaningless on its
//! own; `coro_types::Pool` owns the type data it indexes.
//!
//! # Design
//!
//! - 32-bit indices, O(1) equality
//! - Primitive types have fixed indices so classification of the common
//!   cases never touches the pool

use std::fmt;

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Idx(u32);

impl Idx {
    // === Primitive Types (indices 0-9) ===

    /// 64-bit signed integer.
    pub const INT: Self = Self(0);
    /// 64-bit floating point.
    pub const FLOAT: Self = Self(1);
    /// Boolean.
    pub const BOOL: Self = Self(2);
    /// Immutable string (reference type).
    pub const STR: Self = Self(3);
    /// Unicode scalar value.
    pub const CHAR: Self = Self(4);
    /// 8-bit unsigned integer.
    pub const BYTE: Self = Self(5);
    /// The unit type (no value).
    pub const UNIT: Self = Self(6);
    /// The root reference type.
    pub const OBJECT: Self = Self(7);
    /// `object` with late-bound member access. Representation-identical to
    /// [`OBJECT`](Self::OBJECT); the difference is only an annotation.
    pub const DYNAMIC: Self = Self(8);
    /// The runtime's typed-reference construct: a value type that carries a
    /// managed pointer.
    pub const TYPED_REFERENCE: Self = Self(9);

    /// First index for dynamically allocated types.
    pub const FIRST_DYNAMIC: u32 = 64;

    /// Sentinel value indicating no type / invalid index.
    pub const NONE: Self = Self(u32::MAX);

    /// Number of pre-interned primitive types.
    pub const PRIMITIVE_COUNT: u32 = 10;

    /// Create an index from a raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if this is a pre-interned primitive.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::FIRST_DYNAMIC
    }

    /// Check if this is the NONE sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Human-readable name for primitives, `None` for pool-allocated types.
    #[inline]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("int"),
            1 => Some("float"),
            2 => Some("bool"),
            3 => Some("str"),
            4 => Some("char"),
            5 => Some("byte"),
            6 => Some("unit"),
            7 => Some("object"),
            8 => Some("dynamic"),
            9 => Some("typedref"),
            _ => None,
        }
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Idx({name})"),
            None if self.is_none() => write!(f, "Idx(NONE)"),
            None => write!(f, "Idx({})", self.0),
        }
    }
}
