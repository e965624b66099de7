//! Type kind tag.

/// The kind of a type in the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    // Primitives (fixed indices)
    Int,
    Float,
    Bool,
    Str,
    Char,
    Byte,
    Unit,
    Object,
    Dynamic,
    TypedReference,

    // Pool-allocated
    Class,
    Struct,
    Array,
    Tuple,
    TypeParam,

    /// `Idx::NONE` or an index this pool never allocated.
    Invalid,
}

impl Tag {
    /// Numeric, boolean and character primitives: plain bits, never a reference.
    #[inline]
    pub fn is_plain_primitive(self) -> bool {
        matches!(
            self,
            Tag::Int | Tag::Float | Tag::Bool | Tag::Char | Tag::Byte | Tag::Unit
        )
    }
}
