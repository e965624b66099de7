//! Durable storage slots.
//!
//! A slot is a field of the state machine instance. The caller creates the
//! slots it needs before lowering (persisted state, captured parameters,
//! the current element of an iterator); lowering appends hoisted locals and
//! spill slots and hands the complete table back for layout.
//!
//! # Naming
//!
//! Generated slot names follow a fixed scheme so debuggers and incremental
//! recompilation can recognize them:
//!
//! | Kind | Name |
//! |------|------|
//! | hoisted user local `x` | `<x>5__N` |
//! | reusable temporary | `<>7__wrapN` |
//! | by-reference spill (unoptimized builds) | `<>8__spillN` |
//!
//! `N` is the slot index: either a fresh index or, for stable slots, the
//! index a previous compilation used for the same variable.

use coro_ir::{Idx, Name, SlotId, StringInterner};
use coro_types::TypeKey;
use rustc_hash::FxHashMap;

/// What a slot stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// The persisted state.
    State,
    /// A parameter, the current instance, or a closure-captured local,
    /// copied in when the machine is created.
    Captured,
    /// The element most recently published by an iterator.
    Current,
    /// A user local with a stable, user-visible name.
    HoistedUser,
    /// A temporary or user local eligible for reuse across scopes.
    Reusable,
    /// Stable storage for a by-reference spill in an unoptimized build.
    RefSpill,
}

/// A declared slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotDecl {
    pub name: Name,
    pub ty: Idx,
    pub kind: SlotKind,
    /// Index encoded in the name, for generated slots.
    pub slot_index: Option<u32>,
}

/// Dense table of slots, indexed by [`SlotId`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotTable {
    slots: Vec<SlotDecl>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, decl: SlotDecl) -> SlotId {
        debug_assert!(u32::try_from(self.slots.len()).is_ok(), "slot count exceeds u32::MAX");
        let id = SlotId::new(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        tracing::trace!(?id, kind = ?decl.kind, ty = ?decl.ty, "declared slot");
        self.slots.push(decl);
        id
    }

    /// # Panics
    /// Panics if `id` was not declared in this table.
    #[inline]
    pub fn get(&self, id: SlotId) -> &SlotDecl {
        &self.slots[id.index()]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &SlotDecl)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, decl)| (SlotId::new(u32::try_from(i).unwrap_or(u32::MAX)), decl))
    }

    /// Slots of one kind, in declaration order.
    pub fn of_kind(&self, kind: SlotKind) -> impl Iterator<Item = SlotId> + '_ {
        self.iter()
            .filter(move |(_, decl)| decl.kind == kind)
            .map(|(id, _)| id)
    }
}

// Names

pub fn hoisted_user_name(interner: &StringInterner, local: Name, index: u32) -> Name {
    interner.intern(&format!("<{}>5__{index}", interner.lookup(local)))
}

pub fn reusable_name(interner: &StringInterner, index: u32) -> Name {
    interner.intern(&format!("<>7__wrap{index}"))
}

pub fn spill_name(interner: &StringInterner, index: u32) -> Name {
    interner.intern(&format!("<>8__spill{index}"))
}

// Previous-generation identity

/// Identity of a stable slot across compilations: what it stores, its
/// representation, where its variable is declared (offset from the start of
/// the method body), and which spill at that site it is.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub kind: SlotKind,
    pub ty: TypeKey,
    pub offset: i32,
    pub ordinal: u32,
}

/// Slot indices chosen by a previous compilation of the same method.
///
/// Consulted only for stable (unoptimized-build) slots. Returning an index
/// keeps the slot's generated name unchanged, so a debugger session or an
/// edit-and-continue update can keep addressing it.
pub trait PreviousSlots {
    fn lookup(&self, key: &SlotKey) -> Option<u32>;
}

impl PreviousSlots for FxHashMap<SlotKey, u32> {
    fn lookup(&self, key: &SlotKey) -> Option<u32> {
        self.get(key).copied()
    }
}

// Reuse

/// Free reusable slots, keyed by representation.
///
/// LIFO per key: the slot released most recently is handed out first, which
/// keeps a hot slot hot and makes reuse deterministic.
#[derive(Debug, Default)]
pub struct ReusePool {
    free: FxHashMap<TypeKey, Vec<SlotId>>,
}

impl ReusePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the most recently released slot for `key`.
    pub fn take(&mut self, key: &TypeKey) -> Option<SlotId> {
        self.free.get_mut(key).and_then(Vec::pop)
    }

    /// Return `slot` to the pool.
    pub fn release(&mut self, key: TypeKey, slot: SlotId) {
        let bucket = self.free.entry(key).or_default();
        debug_assert!(!bucket.contains(&slot), "{slot:?} released twice");
        bucket.push(slot);
    }

    /// Whether `slot` is currently free.
    pub fn contains(&self, slot: SlotId) -> bool {
        self.free.values().any(|bucket| bucket.contains(&slot))
    }

    pub fn is_empty(&self) -> bool {
        self.free.values().all(Vec::is_empty)
    }
}
