//! Capture analysis: which variables must live in durable slots.
//!
//! The body is walked once in source order, numbering every variable
//! access, suspension point, label and jump. A variable needs a slot when
//! some suspension point separates two of its accesses inside the scope
//! that declares it, or when a backward jump inside that scope forms a loop
//! containing both a suspension point and an access (a value written late
//! in one iteration and read early in the next).
//!
//! A hoisted by-reference local keeps pointing into the storage it was
//! bound to, so the struct local owning that storage is hoisted with it.
//! This repeats until no new local is added.
//!
//! Parameters and the current instance are always captured when read.
//! Unoptimized builds additionally keep every user-declared local whose
//! scope contains a suspension point, and every parameter, so the debugger
//! can show them after any resumption.

use coro_ir::visitor::{walk_block, walk_expr, walk_stmt, Visitor};
use coro_ir::{
    Block, Expr, LabelId, LocalId, LocalTable, OriginalMethod, ParamId, Stmt, Variable,
};
use coro_types::Pool;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::LowerOptions;

/// Decide which variables of `body` need proxies.
pub fn analyze_hoisted_variables(
    method: &OriginalMethod,
    locals: &LocalTable,
    body: &Stmt,
    pool: &Pool,
    options: &LowerOptions,
) -> FxHashSet<Variable> {
    let mut walk = Positions::default();
    walk.visit_stmt(body);

    let loops: Vec<(u32, u32)> = walk
        .gotos
        .iter()
        .filter_map(|&(at, label)| {
            let target = *walk.labels.get(&label)?;
            (target < at).then_some((target, at))
        })
        .collect();

    let mut hoisted = FxHashSet::default();

    // The re-entrant body has no parameters of its own: every parameter it
    // reads, and the current instance, lives in a slot. Unoptimized builds
    // keep all of them for the debugger.
    for i in 0..method.params.len() {
        let var = Variable::Param(ParamId::new(u32::try_from(i).unwrap_or(u32::MAX)));
        if !options.is_optimized() || walk.accesses.contains_key(&var) {
            hoisted.insert(var);
        }
    }
    if !method.is_static() && (!options.is_optimized() || walk.accesses.contains_key(&Variable::This)) {
        hoisted.insert(Variable::This);
    }

    for (&local, &range) in &walk.scopes {
        let var = Variable::Local(local);
        let needed = if !options.is_optimized() && locals.get(local).kind.is_user_visible() {
            walk.suspends.iter().any(|&p| inside(range, p))
        } else {
            let accesses = walk.accesses.get(&var).map_or(&[][..], Vec::as_slice);
            live_across_suspension(&walk.suspends, &loops, accesses, range)
        };
        if needed {
            hoisted.insert(var);
        }
    }

    loop {
        let roots: Vec<LocalId> = walk
            .ref_initializers
            .iter()
            .filter(|(local, _)| hoisted.contains(&Variable::Local(*local)))
            .filter_map(|(_, initializer)| storage_root(initializer, pool))
            .filter(|root| walk.scopes.contains_key(root))
            .filter(|root| !hoisted.contains(&Variable::Local(*root)))
            .collect();
        if roots.is_empty() {
            break;
        }
        tracing::trace!(?roots, "hoisting storage behind hoisted references");
        hoisted.extend(roots.into_iter().map(Variable::Local));
    }

    tracing::debug!(count = hoisted.len(), "capture analysis");
    hoisted
}

#[inline]
fn inside((start, end): (u32, u32), at: u32) -> bool {
    start < at && at < end
}

/// The local whose own storage a by-reference initializer points into.
/// Fields of structs live inside their receiver; anything else is either a
/// heap location or not storage at all.
fn storage_root(expr: &Expr, pool: &Pool) -> Option<LocalId> {
    match expr {
        Expr::Local { local, .. } => Some(*local),
        Expr::Field {
            receiver: Some(receiver),
            field,
        } if !pool.is_reference_type(field.owner) => storage_root(receiver, pool),
        _ => None,
    }
}

fn live_across_suspension(
    suspends: &[u32],
    loops: &[(u32, u32)],
    accesses: &[u32],
    range: (u32, u32),
) -> bool {
    let split = suspends.iter().any(|&p| {
        inside(range, p)
            && accesses.iter().any(|&a| a < p)
            && accesses.iter().any(|&a| a > p)
    });
    if split {
        return true;
    }
    loops.iter().any(|&(top, back)| {
        let within = |at: u32| top <= at && at <= back;
        range.0 <= top
            && back <= range.1
            && suspends.iter().any(|&p| within(p))
            && accesses.iter().any(|&a| within(a))
    })
}

/// Source-order numbering of the events capture analysis cares about.
#[derive(Default)]
struct Positions<'a> {
    next: u32,
    accesses: FxHashMap<Variable, Vec<u32>>,
    suspends: Vec<u32>,
    labels: FxHashMap<LabelId, u32>,
    gotos: Vec<(u32, LabelId)>,
    /// Declaring-scope range of each local, exclusive at both ends.
    scopes: FxHashMap<LocalId, (u32, u32)>,
    /// `ref local = ref initializer` bindings, in source order.
    ref_initializers: Vec<(LocalId, &'a Expr)>,
}

impl Positions<'_> {
    fn tick(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    fn access(&mut self, var: Variable) {
        let at = self.tick();
        self.accesses.entry(var).or_default().push(at);
    }

    fn scoped(&mut self, locals: &[LocalId], f: impl FnOnce(&mut Self)) {
        let start = self.tick();
        f(self);
        let end = self.tick();
        for &local in locals {
            self.scopes.insert(local, (start, end));
        }
    }
}

impl<'a> Visitor<'a> for Positions<'a> {
    fn visit_block(&mut self, block: &'a Block) {
        coro_stack::ensure_sufficient_stack(|| {
            self.scoped(&block.locals, |this| walk_block(this, block));
        });
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        coro_stack::ensure_sufficient_stack(|| match stmt {
            Stmt::Switch {
                scrutinee,
                sections,
            } => {
                self.visit_expr(scrutinee);
                for section in sections {
                    self.scoped(&section.locals, |this| {
                        for stmt in &section.body {
                            this.visit_stmt(stmt);
                        }
                    });
                }
            }
            Stmt::Try(try_stmt) => {
                self.visit_block(&try_stmt.body);
                for catch in &try_stmt.catches {
                    let bound: Vec<LocalId> = catch.local.into_iter().collect();
                    self.scoped(&bound, |this| {
                        if let Some(local) = catch.local {
                            this.access(Variable::Local(local));
                        }
                        this.visit_block(&catch.body);
                    });
                }
                if let Some(finally) = &try_stmt.finally {
                    self.visit_block(finally);
                }
            }
            Stmt::Label(label) => {
                let at = self.tick();
                self.labels.insert(*label, at);
            }
            Stmt::Goto(label) => {
                let at = self.tick();
                self.gotos.push((at, *label));
            }
            Stmt::GotoIf { cond, target } => {
                self.visit_expr(cond);
                let at = self.tick();
                self.gotos.push((at, *target));
            }
            Stmt::Suspend(point) => {
                if let Some(operand) = &point.operand {
                    self.visit_expr(operand);
                }
                let at = self.tick();
                self.suspends.push(at);
                if let Some(result) = &point.result {
                    self.visit_expr(result);
                }
            }
            _ => walk_stmt(self, stmt),
        });
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Local { local, .. } => self.access(Variable::Local(*local)),
            Expr::Param { param, .. } => self.access(Variable::Param(*param)),
            Expr::This { .. } | Expr::Base { .. } => self.access(Variable::This),
            Expr::Assign {
                target,
                value,
                by_ref: true,
            } => {
                if let Expr::Local { local, .. } = **target {
                    self.ref_initializers.push((local, &**value));
                }
                walk_expr(self, expr);
            }
            _ => walk_expr(self, expr),
        }
    }
}
