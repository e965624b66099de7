//! Method descriptor: the original method's parameters, current instance,
//! and local variable table.

use crate::{Idx, LocalId, Name, ParamId, Span};

/// Where a local variable came from.
///
/// Only [`UserDefined`](LocalKind::UserDefined) and
/// [`LambdaDisplayClass`](LocalKind::LambdaDisplayClass) locals are shown by
/// the debugger; everything else is a compiler temporary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum LocalKind {
    /// Declared in source.
    UserDefined,
    /// Closure environment created by closure conversion.
    LambdaDisplayClass,
    /// Temporary introduced by the spilling pass.
    Spill,
    /// Cached array of a lowered `foreach` over an array.
    ForEachArray,
    /// Any other compiler temporary.
    Temp,
    /// The per-activation copy of the persisted state.
    CachedState,
    /// The per-activation copy of the current instance reference.
    ThisCache,
}

impl LocalKind {
    /// Whether the debugger shows locals of this kind.
    #[inline]
    pub fn is_user_visible(self) -> bool {
        matches!(self, LocalKind::UserDefined | LocalKind::LambdaDisplayClass)
    }
}

/// Whether a local holds a value or a reference to storage elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum RefKind {
    #[default]
    Value,
    Ref,
}

/// A declared local.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalDecl {
    pub name: Name,
    pub ty: Idx,
    pub kind: LocalKind,
    pub ref_kind: RefKind,
    /// Declaration site. Generated locals use [`Span::DUMMY`].
    pub span: Span,
}

impl LocalDecl {
    /// A user-declared by-value local.
    pub fn user(name: Name, ty: Idx, span: Span) -> Self {
        Self {
            name,
            ty,
            kind: LocalKind::UserDefined,
            ref_kind: RefKind::Value,
            span,
        }
    }

    /// A compiler temporary.
    pub fn temp(kind: LocalKind, ty: Idx, ref_kind: RefKind) -> Self {
        Self {
            name: Name::EMPTY,
            ty,
            kind,
            ref_kind,
            span: Span::DUMMY,
        }
    }
}

/// Dense table of every local in a method body, indexed by [`LocalId`].
///
/// Lowering appends to the table (cached state, this-cache, sacrificial
/// temporaries) and hands the extended table back with its output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalTable {
    decls: Vec<LocalDecl>,
}

impl LocalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a local and return its id.
    pub fn declare(&mut self, decl: LocalDecl) -> LocalId {
        let id = LocalId::new(
            u32::try_from(self.decls.len())
                .unwrap_or_else(|_| panic!("local count exceeds u32::MAX")),
        );
        self.decls.push(decl);
        id
    }

    /// Look up a local's declaration.
    ///
    /// # Panics
    /// Panics if `id` was not allocated by this table.
    #[inline]
    pub fn get(&self, id: LocalId) -> &LocalDecl {
        &self.decls[id.index()]
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Iterate `(id, decl)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (LocalId, &LocalDecl)> + '_ {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, decl)| (LocalId::new(u32::try_from(i).unwrap_or(u32::MAX)), decl))
    }
}

/// A declared parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamDecl {
    pub name: Name,
    pub ty: Idx,
}

/// The method whose body is being lowered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginalMethod {
    pub name: Name,
    pub params: Vec<ParamDecl>,
    /// Type of the current instance; `None` for static methods.
    pub this_ty: Option<Idx>,
    /// Span of the whole body, used to compute local identity offsets.
    pub body_span: Span,
}

impl OriginalMethod {
    #[inline]
    pub fn is_static(&self) -> bool {
        self.this_ty.is_none()
    }

    /// Parameter declaration by id.
    ///
    /// # Panics
    /// Panics if `id` is not a parameter of this method.
    #[inline]
    pub fn param(&self, id: ParamId) -> &ParamDecl {
        &self.params[id.index()]
    }

    /// Offset of a declaration site relative to the start of the body.
    ///
    /// Stable under edits outside the method, which is what incremental
    /// recompilation needs to keep generated slot names unchanged.
    pub fn local_offset(&self, span: Span) -> i32 {
        let delta = i64::from(span.start) - i64::from(self.body_span.start);
        i32::try_from(delta).unwrap_or(if delta < 0 { i32::MIN } else { i32::MAX })
    }
}

/// Anything that can be hoisted into durable storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Variable {
    Local(LocalId),
    Param(ParamId),
    This,
}
