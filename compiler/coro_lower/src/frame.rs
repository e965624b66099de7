//! The state machine's storage frame, as handed to lowering.

use coro_ir::{Expr, Idx, Name, OriginalMethod, ParamId, SlotId, StringInterner, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::slots::{SlotDecl, SlotKind, SlotTable};

/// Where a hoisted variable lives now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proxy {
    /// A single slot holding the variable's value.
    Slot {
        slot: SlotId,
        /// Type of the variable (may differ from the slot's declared type
        /// by cosmetic annotations when the slot was reused).
        ty: Idx,
        /// Whether the slot returns to the reuse pool when the variable's
        /// scope ends.
        reusable: bool,
    },
    /// A by-reference local: an access path rebuilt from spilled parts on
    /// every use.
    Expr {
        replacement: Expr,
        slots: SmallVec<[SlotId; 2]>,
        reusable: bool,
    },
}

impl Proxy {
    /// Expression to substitute for each use of the variable.
    pub fn replacement(&self) -> Expr {
        match self {
            Proxy::Slot { slot, ty, .. } => Expr::slot(*slot, *ty),
            Proxy::Expr { replacement, .. } => replacement.clone(),
        }
    }

    /// Every slot the proxy occupies.
    pub fn slots(&self) -> &[SlotId] {
        match self {
            Proxy::Slot { slot, .. } => std::slice::from_ref(slot),
            Proxy::Expr { slots, .. } => slots.as_slice(),
        }
    }

    #[inline]
    pub fn is_reusable(&self) -> bool {
        match self {
            Proxy::Slot { reusable, .. } | Proxy::Expr { reusable, .. } => *reusable,
        }
    }
}

/// Slots and proxies that exist before lowering starts.
///
/// Always holds the persisted-state slot. Parameters and the current
/// instance that must survive suspension are captured into slots of their
/// own here, as are locals already moved to the instance by closure
/// conversion.
#[derive(Clone, Debug)]
pub struct StateMachineFrame {
    slots: SlotTable,
    state: SlotId,
    proxies: FxHashMap<Variable, Proxy>,
}

impl StateMachineFrame {
    pub fn new(interner: &StringInterner) -> Self {
        let mut slots = SlotTable::new();
        let state = slots.declare(SlotDecl {
            name: interner.intern("<>1__state"),
            ty: Idx::INT,
            kind: SlotKind::State,
            slot_index: None,
        });
        Self {
            slots,
            state,
            proxies: FxHashMap::default(),
        }
    }

    /// Frame for `method` with every parameter in `hoisted`, and the
    /// current instance if it is in `hoisted`, already captured.
    pub fn for_method(
        method: &OriginalMethod,
        hoisted: &FxHashSet<Variable>,
        interner: &StringInterner,
    ) -> Self {
        let mut frame = Self::new(interner);
        if let Some(this_ty) = method.this_ty {
            if hoisted.contains(&Variable::This) {
                frame.capture(Variable::This, interner.intern("<>4__this"), this_ty);
            }
        }
        for (i, param) in method.params.iter().enumerate() {
            let id = ParamId::new(u32::try_from(i).unwrap_or(u32::MAX));
            if hoisted.contains(&Variable::Param(id)) {
                frame.capture(Variable::Param(id), param.name, param.ty);
            }
        }
        frame
    }

    #[inline]
    pub fn state_slot(&self) -> SlotId {
        self.state
    }

    /// Declare the slot an iterator publishes its elements through.
    pub fn declare_current(&mut self, interner: &StringInterner, ty: Idx) -> SlotId {
        self.slots.declare(SlotDecl {
            name: interner.intern("<>2__current"),
            ty,
            kind: SlotKind::Current,
            slot_index: None,
        })
    }

    /// Give `var` a dedicated slot named `name`.
    pub fn capture(&mut self, var: Variable, name: Name, ty: Idx) -> SlotId {
        let slot = self.slots.declare(SlotDecl {
            name,
            ty,
            kind: SlotKind::Captured,
            slot_index: None,
        });
        self.proxies.insert(
            var,
            Proxy::Slot {
                slot,
                ty,
                reusable: false,
            },
        );
        slot
    }

    pub fn proxy(&self, var: Variable) -> Option<&Proxy> {
        self.proxies.get(&var)
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub(crate) fn into_parts(self) -> (SlotTable, SlotId, FxHashMap<Variable, Proxy>) {
        (self.slots, self.state, self.proxies)
    }
}
