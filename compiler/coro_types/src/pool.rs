//! The type pool.

use coro_ir::{Idx, Name};
use rustc_hash::FxHashMap;

use crate::Tag;

/// Whether a struct's instance fields can be inspected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Fields are known to this compilation.
    Inspectable,
    /// A by-layout type copied from a foreign module; its field list is not
    /// available and must be treated conservatively.
    Opaque,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum TypeData {
    Class {
        name: Name,
    },
    Struct {
        name: Name,
        fields: Vec<(Name, Idx)>,
        layout: Layout,
    },
    Array {
        elem: Idx,
    },
    Tuple {
        elems: Vec<Idx>,
        /// Element names are an annotation; they never change layout.
        names: Option<Vec<Name>>,
    },
    TypeParam {
        name: Name,
    },
}

/// Representation identity of a type, ignoring cosmetic annotations.
///
/// Two types with equal keys have identical runtime representation, so a
/// storage slot of one can hold a value of the other. Only `dynamic` (same
/// representation as `object`) and tuple element names are erased; every
/// nominal type stays distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Nominal(Idx),
    Array(Box<TypeKey>),
    Tuple(Vec<TypeKey>),
}

/// Type pool.
pub struct Pool {
    items: Vec<TypeData>,
    /// Structural interning for arrays and tuples.
    interned: FxHashMap<TypeData, Idx>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            interned: FxHashMap::default(),
        }
    }

    fn push(&mut self, data: TypeData) -> Idx {
        let offset = u32::try_from(self.items.len())
            .unwrap_or_else(|_| panic!("type pool exceeded u32::MAX entries"));
        self.items.push(data);
        Idx::from_raw(Idx::FIRST_DYNAMIC + offset)
    }

    fn intern(&mut self, data: TypeData) -> Idx {
        if let Some(&idx) = self.interned.get(&data) {
            return idx;
        }
        let idx = self.push(data.clone());
        self.interned.insert(data, idx);
        idx
    }

    fn data(&self, idx: Idx) -> Option<&TypeData> {
        if idx.is_primitive() || idx.is_none() {
            return None;
        }
        self.items.get((idx.raw() - Idx::FIRST_DYNAMIC) as usize)
    }

    // Construction

    /// A reference type.
    pub fn class(&mut self, name: Name) -> Idx {
        self.push(TypeData::Class { name })
    }

    /// A value type with inspectable fields.
    pub fn struct_type(&mut self, name: Name, fields: &[(Name, Idx)]) -> Idx {
        self.push(TypeData::Struct {
            name,
            fields: fields.to_vec(),
            layout: Layout::Inspectable,
        })
    }

    /// A value type whose fields cannot be inspected.
    pub fn opaque_struct(&mut self, name: Name) -> Idx {
        self.push(TypeData::Struct {
            name,
            fields: Vec::new(),
            layout: Layout::Opaque,
        })
    }

    /// Replace a struct's field list. Used to build structs whose fields are
    /// declared after the struct itself.
    ///
    /// # Panics
    /// Panics if `idx` is not a struct in this pool.
    pub fn set_struct_fields(&mut self, idx: Idx, new_fields: &[(Name, Idx)]) {
        let offset = (idx.raw().wrapping_sub(Idx::FIRST_DYNAMIC)) as usize;
        match self.items.get_mut(offset) {
            Some(TypeData::Struct { fields, .. }) => *fields = new_fields.to_vec(),
            _ => panic!("set_struct_fields: {idx:?} is not a struct"),
        }
    }

    pub fn array(&mut self, elem: Idx) -> Idx {
        self.intern(TypeData::Array { elem })
    }

    pub fn tuple(&mut self, elems: &[Idx]) -> Idx {
        self.intern(TypeData::Tuple {
            elems: elems.to_vec(),
            names: None,
        })
    }

    /// A tuple with element names. Same representation as the unnamed tuple.
    pub fn named_tuple(&mut self, elems: &[Idx], names: &[Name]) -> Idx {
        debug_assert_eq!(elems.len(), names.len());
        self.intern(TypeData::Tuple {
            elems: elems.to_vec(),
            names: Some(names.to_vec()),
        })
    }

    pub fn type_param(&mut self, name: Name) -> Idx {
        self.push(TypeData::TypeParam { name })
    }

    // Queries

    pub fn tag(&self, idx: Idx) -> Tag {
        match idx {
            Idx::INT => Tag::Int,
            Idx::FLOAT => Tag::Float,
            Idx::BOOL => Tag::Bool,
            Idx::STR => Tag::Str,
            Idx::CHAR => Tag::Char,
            Idx::BYTE => Tag::Byte,
            Idx::UNIT => Tag::Unit,
            Idx::OBJECT => Tag::Object,
            Idx::DYNAMIC => Tag::Dynamic,
            Idx::TYPED_REFERENCE => Tag::TypedReference,
            _ => match self.data(idx) {
                Some(TypeData::Class { .. }) => Tag::Class,
                Some(TypeData::Struct { .. }) => Tag::Struct,
                Some(TypeData::Array { .. }) => Tag::Array,
                Some(TypeData::Tuple { .. }) => Tag::Tuple,
                Some(TypeData::TypeParam { .. }) => Tag::TypeParam,
                None => Tag::Invalid,
            },
        }
    }

    /// Whether values of this type are references to heap objects.
    pub fn is_reference_type(&self, idx: Idx) -> bool {
        matches!(
            self.tag(idx),
            Tag::Str | Tag::Object | Tag::Dynamic | Tag::Class | Tag::Array
        )
    }

    /// Instance fields of a struct, or of a tuple (named by position).
    /// Empty for every other type.
    pub fn fields(&self, idx: Idx) -> Vec<Idx> {
        match self.data(idx) {
            Some(TypeData::Struct { fields, .. }) => fields.iter().map(|(_, ty)| *ty).collect(),
            Some(TypeData::Tuple { elems, .. }) => elems.clone(),
            _ => Vec::new(),
        }
    }

    /// Layout visibility of a struct. Tuples are always inspectable.
    pub fn layout(&self, idx: Idx) -> Layout {
        match self.data(idx) {
            Some(TypeData::Struct { layout, .. }) => *layout,
            _ => Layout::Inspectable,
        }
    }

    /// Element type of an array, `Idx::NONE` otherwise.
    pub fn array_elem(&self, idx: Idx) -> Idx {
        match self.data(idx) {
            Some(TypeData::Array { elem }) => *elem,
            _ => Idx::NONE,
        }
    }

    /// Declared name of a nominal type, `Name::EMPTY` otherwise.
    pub fn name(&self, idx: Idx) -> Name {
        match self.data(idx) {
            Some(
                TypeData::Class { name }
                | TypeData::Struct { name, .. }
                | TypeData::TypeParam { name },
            ) => *name,
            _ => Name::EMPTY,
        }
    }

    /// Representation key with cosmetic annotations erased.
    pub fn erasure_key(&self, idx: Idx) -> TypeKey {
        if idx == Idx::DYNAMIC {
            return TypeKey::Nominal(Idx::OBJECT);
        }
        match self.data(idx) {
            Some(TypeData::Array { elem }) => TypeKey::Array(Box::new(self.erasure_key(*elem))),
            Some(TypeData::Tuple { elems, .. }) => {
                TypeKey::Tuple(elems.iter().map(|&e| self.erasure_key(e)).collect())
            }
            _ => TypeKey::Nominal(idx),
        }
    }

    /// Structural equality modulo cosmetic annotations.
    pub fn equivalent(&self, a: Idx, b: Idx) -> bool {
        a == b || self.erasure_key(a) == self.erasure_key(b)
    }
}
