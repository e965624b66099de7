//! The rewrite driver.
//!
//! Walks the input tree top-down and rebuilds it:
//!
//! - variable references become reads of their proxies;
//! - scopes ask [`Hoisting`] for proxies on entry and for cleanup on exit;
//! - suspension points become "record state, return, resume label";
//! - `try` statements get dispatch headers (see `try_stmt`);
//! - `return` and `yield break` are delegated to the strategy.
//!
//! The prologue that copies the persisted state, dispatches on it and
//! marks the machine as running is assembled last, once every state is
//! known.

mod try_stmt;

use coro_ir::{
    BinaryOp, Block, Dispatch, Expr, Idx, LocalDecl, LocalId, LocalKind, LocalTable,
    OriginalMethod, RefKind, SlotId, Span, Stmt, SuspendPoint, SwitchSection, Variable,
};

use crate::hoist::Hoisting;
use crate::output::LoweredBody;
use crate::state::{StateAllocator, NOT_STARTED_OR_RUNNING};
use crate::strategy::ResumeStrategy;
use crate::LowerError;

pub(crate) struct Rewriter<'a> {
    method: &'a OriginalMethod,
    strategy: &'a dyn ResumeStrategy,
    locals: LocalTable,
    states: StateAllocator,
    hoisting: Hoisting<'a>,
    state_slot: SlotId,
    cached_state: LocalId,
    this_cache: Option<LocalId>,
    /// Number of enclosing `catch`/`finally` clauses.
    handler_depth: u32,
}

impl<'a> Rewriter<'a> {
    pub(crate) fn new(
        method: &'a OriginalMethod,
        strategy: &'a dyn ResumeStrategy,
        mut locals: LocalTable,
        states: StateAllocator,
        mut hoisting: Hoisting<'a>,
        state_slot: SlotId,
    ) -> Self {
        let cached_state = locals.declare(LocalDecl::temp(
            LocalKind::CachedState,
            Idx::INT,
            RefKind::Value,
        ));

        let this_cache = match method.this_ty {
            Some(this_ty)
                if hoisting.is_optimized()
                    && hoisting.proxy(Variable::This).is_some()
                    && hoisting.is_reference_type(this_ty) =>
            {
                Some(locals.declare(LocalDecl::temp(LocalKind::ThisCache, this_ty, RefKind::Value)))
            }
            _ => None,
        };
        if let Some(cache) = this_cache {
            hoisting.set_this_cache(cache);
        }

        Self {
            method,
            strategy,
            locals,
            states,
            hoisting,
            state_slot,
            cached_state,
            this_cache,
            handler_depth: 0,
        }
    }

    /// Rewrite `body` and assemble the re-entrant method body.
    pub(crate) fn lower(mut self, body: &Stmt) -> Result<LoweredBody, LowerError> {
        let body = self.rewrite_stmt(body)?;
        let cached = self.cached();
        let running = self.set_both_states(NOT_STARTED_OR_RUNNING);

        let mut stmts = vec![Stmt::expr(Expr::assign(
            cached.clone(),
            Expr::slot(self.state_slot, Idx::INT),
        ))];

        if let (Some(cache), Some(this_ty)) = (self.this_cache, self.method.this_ty) {
            if let Some(proxy) = self.hoisting.proxy(Variable::This) {
                stmts.push(Stmt::expr(Expr::assign(
                    Expr::local(cache, this_ty),
                    proxy.replacement(),
                )));
            }
        }

        let state_count = self.states.state_count();
        let first_state = self.states.first_state();
        let (table, finalizer_map) = self.states.finish();
        if !table.is_empty() {
            stmts.push(Stmt::Dispatch(table.build(cached.clone())));
        }

        if let Some(initial) = self.strategy.initial_state() {
            stmts.push(Stmt::if_then(
                Expr::binary(BinaryOp::NotEq, cached, Expr::int(initial)),
                self.strategy.generate_return(true),
            ));
        }

        stmts.push(running);
        stmts.push(body);
        stmts.extend(self.strategy.lower_return(None));

        let (slots, debug_scopes) = self.hoisting.finish();
        Ok(LoweredBody {
            body: Stmt::block(stmts),
            locals: self.locals,
            slots,
            finalizer_map,
            debug_scopes,
            state_count,
            first_state,
            cached_state: self.cached_state,
            this_cache: self.this_cache,
        })
    }

    // Helpers

    #[inline]
    fn cached(&self) -> Expr {
        Expr::local(self.cached_state, Idx::INT)
    }

    /// `state := cached := value`
    fn set_both_states(&self, value: i64) -> Stmt {
        Stmt::expr(Expr::assign(
            Expr::slot(self.state_slot, Idx::INT),
            Expr::assign(self.cached(), Expr::int(value)),
        ))
    }

    /// Replacement for a variable reference.
    fn variable(&self, var: Variable, original: &Expr) -> Result<Expr, LowerError> {
        if let Some(proxy) = self.hoisting.proxy(var) {
            return Ok(proxy.replacement());
        }
        if self.hoisting.needs_proxy(var) {
            return Err(LowerError::MissingProxy { variable: var });
        }
        Ok(original.clone())
    }

    fn rewrite_block(&mut self, block: &Block) -> Result<Stmt, LowerError> {
        let entered = self.hoisting.enter_scope(&block.locals, &self.locals, true);
        let stmts = self.rewrite_stmts(&block.stmts)?;
        let locals = self.stack_locals(&block.locals);
        let translated = Stmt::Block(Block::with_locals(locals, stmts));
        Ok(self.hoisting.leave_scope(&block.locals, entered, translated))
    }

    /// Locals that stay on the stack (have no proxy).
    fn stack_locals(&self, locals: &[LocalId]) -> Vec<LocalId> {
        locals
            .iter()
            .copied()
            .filter(|&local| self.hoisting.proxy(Variable::Local(local)).is_none())
            .collect()
    }

    fn rewrite_stmts(&mut self, stmts: &[Stmt]) -> Result<Vec<Stmt>, LowerError> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match self.rewrite_stmt(stmt)? {
                Stmt::Nop => {}
                rewritten => out.push(rewritten),
            }
        }
        Ok(out)
    }

    // Statements

    fn rewrite_stmt(&mut self, stmt: &Stmt) -> Result<Stmt, LowerError> {
        coro_stack::ensure_sufficient_stack(|| self.rewrite_stmt_inner(stmt))
    }

    fn rewrite_stmt_inner(&mut self, stmt: &Stmt) -> Result<Stmt, LowerError> {
        Ok(match stmt {
            Stmt::Block(block) => self.rewrite_block(block)?,
            Stmt::Expr(expr) => self.rewrite_effect(expr)?.map_or(Stmt::Nop, Stmt::Expr),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => Stmt::If {
                cond: self.rewrite_expr(cond)?,
                then_branch: Box::new(self.rewrite_stmt(then_branch)?),
                else_branch: match else_branch {
                    Some(branch) => Some(Box::new(self.rewrite_stmt(branch)?)),
                    None => None,
                },
            },
            Stmt::Switch {
                scrutinee,
                sections,
            } => Stmt::Switch {
                scrutinee: self.rewrite_expr(scrutinee)?,
                sections: sections
                    .iter()
                    .map(|section| self.rewrite_section(section))
                    .collect::<Result<_, _>>()?,
            },
            Stmt::Dispatch(dispatch) => Stmt::Dispatch(Dispatch {
                scrutinee: self.rewrite_expr(&dispatch.scrutinee)?,
                arms: dispatch.arms.clone(),
            }),
            Stmt::Label(label) => Stmt::Label(*label),
            Stmt::Goto(label) => Stmt::Goto(*label),
            Stmt::GotoIf { cond, target } => Stmt::GotoIf {
                cond: self.rewrite_expr(cond)?,
                target: *target,
            },
            Stmt::Try(try_stmt) => self.rewrite_try(try_stmt)?,
            Stmt::Return(value) => {
                let value = value.as_ref().map(|v| self.rewrite_expr(v)).transpose()?;
                Stmt::block(self.strategy.lower_return(value))
            }
            Stmt::YieldBreak(_) => Stmt::block(self.strategy.lower_return(None)),
            Stmt::Throw(value) => Stmt::Throw(self.rewrite_expr(value)?),
            Stmt::Suspend(point) => self.rewrite_suspend(point)?,
            Stmt::Scope { slots, body } => Stmt::Scope {
                slots: slots.clone(),
                body: Box::new(self.rewrite_stmt(body)?),
            },
            Stmt::For { span, .. } | Stmt::Using { span, .. } => {
                return Err(LowerError::UnloweredConstruct {
                    kind: stmt.kind_name(),
                    span: *span,
                });
            }
            Stmt::Nop => Stmt::Nop,
        })
    }

    /// Switch sections are scopes, but not separate debugger scopes.
    fn rewrite_section(&mut self, section: &SwitchSection) -> Result<SwitchSection, LowerError> {
        let entered = self.hoisting.enter_scope(&section.locals, &self.locals, false);
        let body = self.rewrite_stmts(&section.body)?;
        let body = self
            .hoisting
            .leave_scope(&section.locals, entered, Stmt::block(body));
        Ok(SwitchSection {
            values: section.values.clone(),
            is_default: section.is_default,
            locals: self.stack_locals(&section.locals),
            body: vec![body],
        })
    }

    fn rewrite_suspend(&mut self, point: &SuspendPoint) -> Result<Stmt, LowerError> {
        if self.handler_depth > 0 {
            return Err(LowerError::SuspensionInHandler { span: point.span });
        }
        let operand = point
            .operand
            .as_ref()
            .map(|e| self.rewrite_expr(e))
            .transpose()?;
        let result = point
            .result
            .as_ref()
            .map(|e| self.rewrite_expr(e))
            .transpose()?;

        let (state, resume) = self.states.add_state()?;

        let mut stmts = self.strategy.before_suspend(point.kind, operand);
        stmts.push(self.set_both_states(state.value()));
        stmts.push(self.strategy.generate_return(false));
        stmts.push(Stmt::Label(resume));
        stmts.push(self.set_both_states(NOT_STARTED_OR_RUNNING));
        stmts.extend(self.strategy.after_resume(point.kind, result));
        Ok(Stmt::block(stmts))
    }

    // Expressions

    /// Rewrite an expression evaluated for its effect. `None` when nothing
    /// is left to evaluate.
    fn rewrite_effect(&mut self, expr: &Expr) -> Result<Option<Expr>, LowerError> {
        if let Expr::Assign {
            target,
            value,
            by_ref: true,
        } = expr
        {
            if let Expr::Local { local, .. } = **target {
                let var = Variable::Local(local);
                if self.hoisting.needs_proxy(var)
                    && self.hoisting.proxy(var).is_none()
                    && self.locals.get(local).ref_kind == RefKind::Ref
                {
                    let value = self.rewrite_expr(value)?;
                    return self
                        .hoisting
                        .hoist_ref_initialization(local, value, &mut self.locals);
                }
            }
        }
        self.rewrite_expr(expr).map(Some)
    }

    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr, LowerError> {
        coro_stack::ensure_sufficient_stack(|| self.rewrite_expr_inner(expr))
    }

    fn rewrite_expr_inner(&mut self, expr: &Expr) -> Result<Expr, LowerError> {
        Ok(match expr {
            Expr::Literal(_) | Expr::Default(_) | Expr::Slot { .. } => expr.clone(),
            Expr::Local { local, .. } => self.variable(Variable::Local(*local), expr)?,
            Expr::Param { param, .. } => self.variable(Variable::Param(*param), expr)?,
            Expr::This { ty, span } | Expr::Base { ty, span } => {
                self.current_instance(expr, *ty, *span)?
            }
            Expr::Field { receiver, field } => Expr::Field {
                receiver: match receiver {
                    Some(receiver) => Some(Box::new(self.rewrite_expr(receiver)?)),
                    None => None,
                },
                field: *field,
            },
            Expr::Index {
                array,
                indices,
                ty,
            } => Expr::Index {
                array: Box::new(self.rewrite_expr(array)?),
                indices: self.rewrite_exprs(indices)?,
                ty: *ty,
            },
            Expr::Call { func, args, ty } => Expr::Call {
                func: *func,
                args: self.rewrite_exprs(args)?,
                ty: *ty,
            },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(self.rewrite_expr(lhs)?),
                rhs: Box::new(self.rewrite_expr(rhs)?),
            },
            Expr::Assign {
                target,
                value,
                by_ref,
            } => Expr::Assign {
                target: Box::new(self.rewrite_expr(target)?),
                value: Box::new(self.rewrite_expr(value)?),
                by_ref: *by_ref,
            },
            Expr::Sequence {
                locals,
                effects,
                value,
            } => {
                let mut rewritten = Vec::with_capacity(effects.len());
                for effect in effects {
                    if let Some(effect) = self.rewrite_effect(effect)? {
                        rewritten.push(effect);
                    }
                }
                Expr::Sequence {
                    locals: self.stack_locals(locals),
                    effects: rewritten,
                    value: Box::new(self.rewrite_expr(value)?),
                }
            }
        })
    }

    fn rewrite_exprs(&mut self, exprs: &[Expr]) -> Result<Vec<Expr>, LowerError> {
        exprs.iter().map(|e| self.rewrite_expr(e)).collect()
    }

    /// `this` / `base`: the per-activation cache, else the proxy.
    fn current_instance(&self, original: &Expr, ty: Idx, span: Span) -> Result<Expr, LowerError> {
        if let Some(cache) = self.this_cache {
            return Ok(Expr::local(cache, ty));
        }
        if self.method.is_static() {
            return Err(LowerError::ThisInStaticMethod { span });
        }
        match self.hoisting.proxy(Variable::This).map(|p| p.replacement()) {
            Some(Expr::Slot { slot, .. }) => Ok(Expr::slot(slot, ty)),
            Some(other) => Ok(other),
            None if self.hoisting.needs_proxy(Variable::This) => Err(LowerError::MissingProxy {
                variable: Variable::This,
            }),
            None => Ok(original.clone()),
        }
    }
}
