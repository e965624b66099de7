//! Hoisting: moving variables that live across suspension points into
//! durable slots.
//!
//! Proxies are assigned when the scope declaring a variable is entered and
//! the variable's slot is released when the scope is left. In optimized
//! builds released slots return to a [`ReusePool`] and later scopes draw
//! from it, so two variables whose lifetimes never overlap can share one
//! slot. Leaving a scope also resets every slot that might retain a
//! reference, so a suspended machine never keeps dead objects alive.

mod expr;

use coro_ir::{
    Expr, Idx, LocalDecl, LocalId, LocalTable, Name, OriginalMethod, RefKind, SlotId, Stmt,
    StringInterner, Variable,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::classify::RetentionClassifier;
use crate::frame::Proxy;
use crate::output::DebugScope;
use crate::slots::{
    hoisted_user_name, reusable_name, spill_name, PreviousSlots, ReusePool, SlotDecl, SlotKey,
    SlotKind, SlotTable,
};

use self::expr::SpillSite;

/// Result of entering a scope; consumed by [`Hoisting::leave_scope`].
#[must_use]
pub(crate) struct EnteredScope {
    debug_slots: Vec<SlotId>,
}

/// Proxy and slot bookkeeping for one lowering invocation.
pub(crate) struct Hoisting<'a> {
    classifier: RetentionClassifier<'a>,
    interner: &'a StringInterner,
    method: &'a OriginalMethod,
    previous: Option<&'a dyn PreviousSlots>,
    optimized: bool,
    slots: SlotTable,
    proxies: FxHashMap<Variable, Proxy>,
    hoisted: FxHashSet<Variable>,
    reuse: ReusePool,
    next_slot_index: u32,
    /// Slot indices already handed out, fresh or carried over.
    used_indices: FxHashSet<u32>,
    /// Next spill ordinal per declaration offset.
    spill_ordinals: FxHashMap<i32, u32>,
    debug_scopes: Vec<DebugScope>,
    marker_depth: u32,
    /// Local holding the current instance during an activation.
    this_cache: Option<LocalId>,
}

/// Construction inputs for [`Hoisting`].
pub(crate) struct HoistingConfig<'a> {
    pub classifier: RetentionClassifier<'a>,
    pub interner: &'a StringInterner,
    pub method: &'a OriginalMethod,
    pub previous: Option<&'a dyn PreviousSlots>,
    pub optimized: bool,
    pub slots: SlotTable,
    pub proxies: FxHashMap<Variable, Proxy>,
    pub hoisted: FxHashSet<Variable>,
    pub first_slot_index: u32,
}

impl<'a> Hoisting<'a> {
    pub(crate) fn new(config: HoistingConfig<'a>) -> Self {
        let used_indices = config
            .slots
            .iter()
            .filter_map(|(_, decl)| decl.slot_index)
            .collect();
        Self {
            classifier: config.classifier,
            interner: config.interner,
            method: config.method,
            previous: config.previous,
            optimized: config.optimized,
            slots: config.slots,
            proxies: config.proxies,
            hoisted: config.hoisted,
            reuse: ReusePool::new(),
            next_slot_index: config.first_slot_index,
            used_indices,
            spill_ordinals: FxHashMap::default(),
            debug_scopes: Vec::new(),
            marker_depth: 0,
            this_cache: None,
        }
    }

    pub(crate) fn set_this_cache(&mut self, cache: LocalId) {
        self.this_cache = Some(cache);
    }

    /// Whether `var` must live in a slot.
    #[inline]
    pub(crate) fn needs_proxy(&self, var: Variable) -> bool {
        self.hoisted.contains(&var)
    }

    pub(crate) fn proxy(&self, var: Variable) -> Option<&Proxy> {
        self.proxies.get(&var)
    }

    pub(crate) fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub(crate) fn is_reference_type(&self, ty: Idx) -> bool {
        self.classifier.pool().is_reference_type(ty)
    }

    pub(crate) fn finish(self) -> (SlotTable, Vec<DebugScope>) {
        (self.slots, self.debug_scopes)
    }

    fn fresh_index(&mut self) -> u32 {
        while self.used_indices.contains(&self.next_slot_index) {
            self.next_slot_index += 1;
        }
        let index = self.next_slot_index;
        self.next_slot_index += 1;
        self.used_indices.insert(index);
        index
    }

    fn declare(&mut self, name: Name, ty: Idx, kind: SlotKind, slot_index: u32) -> SlotId {
        self.slots.declare(SlotDecl {
            name,
            ty,
            kind,
            slot_index: Some(slot_index),
        })
    }

    /// Index for a stable slot: the previous compilation's unless another
    /// slot already holds it, else fresh.
    fn stable_index(&mut self, key: &SlotKey) -> u32 {
        match self.previous.and_then(|previous| previous.lookup(key)) {
            Some(index) if self.used_indices.insert(index) => index,
            Some(index) => {
                tracing::trace!(index, ?key, "previous slot index already taken");
                self.fresh_index()
            }
            None => self.fresh_index(),
        }
    }

    /// A slot for `ty`, drawn from the reuse pool when possible.
    fn reusable_slot(&mut self, ty: Idx, local: Option<&LocalDecl>) -> SlotId {
        let pool = self.classifier.pool();
        if self.optimized {
            if let Some(slot) = self.reuse.take(&pool.erasure_key(ty)) {
                tracing::trace!(?slot, ?ty, "reused slot");
                return slot;
            }
        }

        match local {
            Some(decl) if decl.kind.is_user_visible() => {
                let index = if self.optimized {
                    self.fresh_index()
                } else {
                    let key = SlotKey {
                        kind: SlotKind::HoistedUser,
                        ty: pool.erasure_key(ty),
                        offset: self.method.local_offset(decl.span),
                        ordinal: 0,
                    };
                    self.stable_index(&key)
                };
                let name = hoisted_user_name(self.interner, decl.name, index);
                self.declare(name, ty, SlotKind::HoistedUser, index)
            }
            _ => {
                let index = self.fresh_index();
                let name = reusable_name(self.interner, index);
                self.declare(name, ty, SlotKind::Reusable, index)
            }
        }
    }

    /// Storage for one spilled part of a by-reference local's access path.
    fn spill_slot(&mut self, ty: Idx, site: &SpillSite) -> SlotId {
        if self.optimized {
            return self.reusable_slot(ty, None);
        }
        let ordinal = self.spill_ordinals.entry(site.offset).or_insert(0);
        let key = SlotKey {
            kind: SlotKind::RefSpill,
            ty: self.classifier.pool().erasure_key(ty),
            offset: site.offset,
            ordinal: *ordinal,
        };
        *ordinal += 1;
        let index = self.stable_index(&key);
        let name = spill_name(self.interner, index);
        self.declare(name, ty, SlotKind::RefSpill, index)
    }

    /// Assign proxies to the hoisted by-value locals declared in a scope.
    ///
    /// By-reference locals get theirs from their initializer (see
    /// [`Hoisting::hoist_ref_initialization`]). `debug_visible` is false for
    /// scopes the debugger does not track separately (switch sections).
    pub(crate) fn enter_scope(
        &mut self,
        locals: &[LocalId],
        table: &LocalTable,
        debug_visible: bool,
    ) -> EnteredScope {
        let mut debug_slots = Vec::new();
        for &local in locals {
            let var = Variable::Local(local);
            if !self.needs_proxy(var) {
                continue;
            }
            let decl = table.get(local);
            if decl.ref_kind == RefKind::Ref {
                continue;
            }

            let slot = match self.proxies.get(&var) {
                Some(proxy) => proxy.slots().first().copied(),
                None => {
                    let slot = self.reusable_slot(decl.ty, Some(decl));
                    self.proxies.insert(
                        var,
                        Proxy::Slot {
                            slot,
                            ty: decl.ty,
                            reusable: true,
                        },
                    );
                    Some(slot)
                }
            };

            if let Some(slot) = slot {
                if debug_visible && decl.kind.is_user_visible() {
                    debug_slots.push(slot);
                }
            }
        }

        if !debug_slots.is_empty() {
            self.debug_scopes.push(DebugScope {
                slots: debug_slots.clone(),
                depth: self.marker_depth,
            });
            self.marker_depth += 1;
        }
        EnteredScope { debug_slots }
    }

    /// Clear and release the slots of a scope's locals and wrap the scope's
    /// translated body with the cleanup and debug marker.
    pub(crate) fn leave_scope(
        &mut self,
        locals: &[LocalId],
        entered: EnteredScope,
        translated: Stmt,
    ) -> Stmt {
        let mut cleanup = Vec::new();
        let mut released = Vec::new();
        for &local in locals {
            let Some(proxy) = self.proxies.get(&Variable::Local(local)) else {
                continue;
            };
            for &slot in proxy.slots() {
                let ty = self.slots.get(slot).ty;
                if self.classifier.might_retain_references(ty) {
                    cleanup.push(Stmt::expr(Expr::assign(Expr::slot(slot, ty), Expr::Default(ty))));
                }
                if proxy.is_reusable() && self.optimized {
                    released.push((slot, ty));
                }
            }
        }

        for (slot, ty) in released {
            let key = self.classifier.pool().erasure_key(ty);
            self.reuse.release(key, slot);
        }

        let mut result = translated;
        if !cleanup.is_empty() {
            result = Stmt::block(vec![result, Stmt::block(cleanup)]);
        }
        if !entered.debug_slots.is_empty() {
            self.marker_depth -= 1;
            result = Stmt::Scope {
                slots: entered.debug_slots,
                body: Box::new(result),
            };
        }
        result
    }
}
