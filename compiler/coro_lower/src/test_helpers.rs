//! Shared test utilities: a fixture that declares locals and lowers bodies,
//! and a reference interpreter (see [`interp`]) that runs original and
//! lowered bodies side by side. Only compiled in test builds.

#![allow(clippy::unwrap_used, clippy::panic)]

pub(crate) mod interp;

use coro_ir::{
    Expr, Idx, LocalDecl, LocalId, LocalKind, LocalTable, Name, OriginalMethod, ParamDecl,
    ParamId, RefKind, SlotId, Span, Stmt, StringInterner, Variable,
};
use coro_types::Pool;
use rustc_hash::FxHashSet;

use crate::{
    analyze_hoisted_variables, lower_state_machine, AsyncIntrinsics, AsyncStrategy,
    IteratorStrategy, LowerError, LowerInput, LowerOptions, LoweredBody, PreviousSlots,
    ResumeStrategy, StateMachineFrame,
};

/// Which kind of machine to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flavor {
    Async,
    Iterator { first_state: u32 },
}

/// A method under construction.
pub(crate) struct Fixture {
    pub interner: StringInterner,
    pub pool: Pool,
    pub locals: LocalTable,
    pub method: OriginalMethod,
    next_offset: u32,
}

/// Result of lowering through a [`Fixture`].
#[derive(Debug)]
pub(crate) struct Lowered {
    pub out: LoweredBody,
    pub flavor: Flavor,
    pub state_slot: SlotId,
    pub current: Option<SlotId>,
    pub intrinsics: AsyncIntrinsics,
    /// Frame slots holding captured parameters and the current instance.
    pub captured: Vec<(Variable, SlotId)>,
}

impl Fixture {
    /// A static method with no parameters.
    pub fn new() -> Self {
        let interner = StringInterner::new();
        let method = OriginalMethod {
            name: interner.intern("run"),
            params: Vec::new(),
            this_ty: None,
            body_span: Span::new(100, 10_000),
        };
        Self {
            interner,
            pool: Pool::new(),
            locals: LocalTable::new(),
            method,
            next_offset: 110,
        }
    }

    /// An instance method of a fresh class.
    pub fn instance() -> Self {
        let mut fx = Self::new();
        let class = fx.pool.class(fx.interner.intern("Owner"));
        fx.method.this_ty = Some(class);
        fx
    }

    pub fn name(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    pub fn param(&mut self, name: &str, ty: Idx) -> ParamId {
        let id = ParamId::new(u32::try_from(self.method.params.len()).unwrap());
        self.method.params.push(ParamDecl {
            name: self.name(name),
            ty,
        });
        id
    }

    fn next_span(&mut self) -> Span {
        let start = self.next_offset;
        self.next_offset += 10;
        Span::new(start, start + 1)
    }

    /// A user-declared local.
    pub fn user(&mut self, name: &str, ty: Idx) -> LocalId {
        let span = self.next_span();
        let name = self.name(name);
        self.locals.declare(LocalDecl::user(name, ty, span))
    }

    /// A user-declared by-reference local.
    pub fn user_ref(&mut self, name: &str, ty: Idx) -> LocalId {
        let span = self.next_span();
        let decl = LocalDecl {
            ref_kind: RefKind::Ref,
            ..LocalDecl::user(self.name(name), ty, span)
        };
        self.locals.declare(decl)
    }

    /// A compiler temporary.
    pub fn temp(&mut self, ty: Idx, ref_kind: RefKind) -> LocalId {
        let span = self.next_span();
        self.locals.declare(LocalDecl {
            span,
            ..LocalDecl::temp(LocalKind::Spill, ty, ref_kind)
        })
    }

    pub fn local(&self, local: LocalId) -> Expr {
        Expr::local(local, self.locals.get(local).ty)
    }

    /// `local = value` as a statement.
    pub fn set(&self, local: LocalId, value: Expr) -> Stmt {
        Stmt::expr(Expr::assign(self.local(local), value))
    }

    /// Call of a user function returning `unit`.
    pub fn call(&self, name: &str, args: Vec<Expr>) -> Stmt {
        Stmt::expr(Expr::call(self.name(name), args, Idx::UNIT))
    }

    /// Call of a user function returning `int`.
    pub fn call_int(&self, name: &str, args: Vec<Expr>) -> Expr {
        Expr::call(self.name(name), args, Idx::INT)
    }

    /// `await name()`, discarding the result.
    pub fn await_call(&self, name: &str) -> Stmt {
        Stmt::await_(Expr::call(self.name(name), Vec::new(), Idx::OBJECT), None, Span::DUMMY)
    }

    pub fn yield_int(&self, value: Expr) -> Stmt {
        Stmt::yield_(value, Span::DUMMY)
    }

    pub fn lower(
        &self,
        body: &Stmt,
        flavor: Flavor,
        options: &LowerOptions,
    ) -> Result<Lowered, LowerError> {
        self.lower_with(body, flavor, options, None, None)
    }

    pub fn lower_with(
        &self,
        body: &Stmt,
        flavor: Flavor,
        options: &LowerOptions,
        hoisted: Option<FxHashSet<Variable>>,
        previous_slots: Option<&dyn PreviousSlots>,
    ) -> Result<Lowered, LowerError> {
        let hoisted = hoisted.unwrap_or_else(|| {
            analyze_hoisted_variables(&self.method, &self.locals, body, &self.pool, options)
        });
        let mut frame = StateMachineFrame::for_method(&self.method, &hoisted, &self.interner);
        let state_slot = frame.state_slot();
        let intrinsics = AsyncIntrinsics::intern(&self.interner);

        let mut captured = Vec::new();
        if let Some(proxy) = frame.proxy(Variable::This) {
            captured.push((Variable::This, proxy.slots()[0]));
        }
        for i in 0..self.method.params.len() {
            let var = Variable::Param(ParamId::new(u32::try_from(i).unwrap()));
            if let Some(proxy) = frame.proxy(var) {
                captured.push((var, proxy.slots()[0]));
            }
        }

        let (strategy, current): (Box<dyn ResumeStrategy>, Option<SlotId>) = match flavor {
            Flavor::Async => (Box::new(AsyncStrategy::new(state_slot, intrinsics)), None),
            Flavor::Iterator { first_state } => {
                let current = frame.declare_current(&self.interner, Idx::INT);
                (
                    Box::new(IteratorStrategy::new(current).with_first_state(first_state)),
                    Some(current),
                )
            }
        };

        let input = LowerInput {
            method: &self.method,
            locals: self.locals.clone(),
            body,
            frame,
            hoisted,
            previous_slots,
        };
        let out = lower_state_machine(input, &self.pool, &self.interner, strategy.as_ref(), options)?;
        Ok(Lowered {
            out,
            flavor,
            state_slot,
            current,
            intrinsics,
            captured,
        })
    }
}

/// Every statement of a tree, in pre-order.
pub(crate) fn flatten(stmt: &Stmt) -> Vec<&Stmt> {
    let mut out = Vec::new();
    collect(stmt, &mut out);
    out
}

fn collect<'a>(stmt: &'a Stmt, out: &mut Vec<&'a Stmt>) {
    out.push(stmt);
    match stmt {
        Stmt::Block(block) => block.stmts.iter().for_each(|s| collect(s, out)),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect(then_branch, out);
            if let Some(else_branch) = else_branch {
                collect(else_branch, out);
            }
        }
        Stmt::Switch { sections, .. } => {
            for section in sections {
                section.body.iter().for_each(|s| collect(s, out));
            }
        }
        Stmt::Try(try_stmt) => {
            try_stmt.body.stmts.iter().for_each(|s| collect(s, out));
            for catch in &try_stmt.catches {
                catch.body.stmts.iter().for_each(|s| collect(s, out));
            }
            if let Some(finally) = &try_stmt.finally {
                finally.stmts.iter().for_each(|s| collect(s, out));
            }
        }
        Stmt::Scope { body, .. } | Stmt::For { body, .. } | Stmt::Using { body, .. } => {
            collect(body, out);
        }
        _ => {}
    }
}
