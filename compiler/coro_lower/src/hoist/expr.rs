//! Hoisting by-reference locals.
//!
//! A by-reference local cannot itself live in a slot: a slot holds values,
//! not addresses of stack storage. Instead its initializer is split into an
//! access path (array element, field of a field, ...) whose variable parts
//! are evaluated once into slots, and every later use of the local rebuilds
//! the path from those slots.

use coro_ir::{Expr, LocalDecl, LocalId, LocalKind, LocalTable, RefKind, SlotId, Variable};
use smallvec::SmallVec;

use super::Hoisting;
use crate::frame::Proxy;
use crate::LowerError;

/// Declaration site of the by-reference local being hoisted; part of the
/// stable identity of its spill slots.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SpillSite {
    pub offset: i32,
}

/// Parts produced while hoisting one initializer.
#[derive(Debug, Default)]
struct Hoisted {
    /// Assignments that fill the spill slots, in evaluation order.
    effects: Vec<Expr>,
    slots: SmallVec<[SlotId; 2]>,
    /// The access path can fail (array bounds, null receiver). It must be
    /// evaluated once at the initialization point so the failure happens
    /// there and not at the first use.
    needs_sacrificial: bool,
}

impl Hoisting<'_> {
    /// Rewrite the initialization `local = ref value` of a hoisted
    /// by-reference local. `value` is already rewritten.
    ///
    /// Registers the local's proxy and returns the expression to evaluate
    /// in place of the initialization, or `None` if nothing needs to run.
    pub(crate) fn hoist_ref_initialization(
        &mut self,
        local: LocalId,
        value: Expr,
        locals: &mut LocalTable,
    ) -> Result<Option<Expr>, LowerError> {
        let decl = locals.get(local).clone();
        debug_assert_eq!(decl.ref_kind, RefKind::Ref);
        let site = SpillSite {
            offset: self.method.local_offset(decl.span),
        };

        let mut hoisted = Hoisted::default();
        let replacement = self.hoist_expression(value, decl.ref_kind, site, &mut hoisted)?;
        tracing::debug!(
            ?local,
            spilled = hoisted.slots.len(),
            sacrificial = hoisted.needs_sacrificial,
            "hoisted by-reference local"
        );

        self.proxies.insert(
            Variable::Local(local),
            Proxy::Expr {
                replacement: replacement.clone(),
                slots: hoisted.slots,
                reusable: true,
            },
        );

        let mut effects = hoisted.effects;
        if hoisted.needs_sacrificial {
            let temp = locals.declare(LocalDecl::temp(LocalKind::Temp, decl.ty, RefKind::Ref));
            return Ok(Some(Expr::Sequence {
                locals: vec![temp],
                effects,
                value: Box::new(Expr::assign_ref(Expr::local(temp, decl.ty), replacement)),
            }));
        }

        match effects.pop() {
            None => Ok(None),
            Some(last) => Ok(Some(Expr::Sequence {
                locals: Vec::new(),
                effects,
                value: Box::new(last),
            })),
        }
    }

    /// Split `expr` into spilled parts and an access path over them.
    fn hoist_expression(
        &mut self,
        expr: Expr,
        ref_kind: RefKind,
        site: SpillSite,
        out: &mut Hoisted,
    ) -> Result<Expr, LowerError> {
        coro_stack::ensure_sufficient_stack(|| match expr {
            Expr::Index {
                array,
                indices,
                ty,
            } => {
                let array = self.hoist_expression(*array, RefKind::Value, site, out)?;
                let indices = indices
                    .into_iter()
                    .map(|index| self.hoist_expression(index, RefKind::Value, site, out))
                    .collect::<Result<Vec<_>, _>>()?;
                out.needs_sacrificial = true;
                Ok(Expr::index(array, indices, ty))
            }

            Expr::Field {
                receiver: None,
                field,
            } => {
                if ref_kind == RefKind::Ref || field.is_readonly {
                    return Ok(Expr::field(None, field));
                }
                self.spill(Expr::field(None, field), ref_kind, site, out)
            }

            Expr::Field {
                receiver: Some(receiver),
                field,
            } if ref_kind == RefKind::Ref => {
                let is_field_of_struct = !self.classifier.pool().is_reference_type(field.owner);
                let receiver_ref_kind = if is_field_of_struct {
                    ref_kind
                } else {
                    RefKind::Value
                };
                let receiver_is_this = self.is_current_instance(&receiver);
                let receiver = self.hoist_expression(*receiver, receiver_ref_kind, site, out)?;
                if !receiver_is_this && !is_field_of_struct {
                    out.needs_sacrificial = true;
                }
                Ok(Expr::field(Some(receiver), field))
            }

            this if self.is_current_instance(&this) => Ok(this),

            // Slots live as long as the machine; their address is stable.
            slot @ Expr::Slot { .. } if ref_kind == RefKind::Ref => Ok(slot),

            default @ Expr::Default(_) => Ok(default),

            other => self.spill(other, ref_kind, site, out),
        })
    }

    /// `this`, `base`, or what stands for them once the body is rewritten:
    /// the current instance's proxy slot or the local caching it. The
    /// current instance never changes during a machine's life.
    fn is_current_instance(&self, expr: &Expr) -> bool {
        match expr {
            Expr::This { .. } | Expr::Base { .. } => true,
            Expr::Local { local, .. } => self.this_cache == Some(*local),
            Expr::Slot { slot, .. } => matches!(
                self.proxies.get(&Variable::This),
                Some(Proxy::Slot { slot: this, .. }) if this == slot
            ),
            _ => false,
        }
    }

    /// Evaluate `expr` once into a fresh slot and read the slot instead.
    fn spill(
        &mut self,
        expr: Expr,
        ref_kind: RefKind,
        site: SpillSite,
        out: &mut Hoisted,
    ) -> Result<Expr, LowerError> {
        if expr.is_constant() {
            return Ok(expr);
        }
        if ref_kind == RefKind::Ref {
            return Err(LowerError::UnsupportedRefHoist {
                kind: expr.kind_name(),
            });
        }

        let ty = expr.ty();
        let slot = self.spill_slot(ty, &site);
        out.effects.push(Expr::assign(Expr::slot(slot, ty), expr));
        out.slots.push(slot);
        Ok(Expr::slot(slot, ty))
    }
}
