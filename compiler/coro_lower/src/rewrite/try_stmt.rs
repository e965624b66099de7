//! `try` statement lowering.
//!
//! A `try` body containing suspension points gets its own dispatch table.
//! Resumption enters the body at its top, through a *try-dispatch header*
//! that branches on the cached state to the right resume label inside; the
//! enclosing table only knows that all of the body's states go to the
//! label placed right before the `try`.
//!
//! ```text
//! tryDispatch:
//! try {
//!     dispatch cached { s0 => resume0, s1 => resume1, fin => finalizer }
//!     goto skip                      // only with a finalizer state
//! finalizer:
//!     state := cached := -1
//!     return (not finished)          // unwinds through the finally below
//! skip:
//!     ...body...
//! } finally {
//!     if cached < 0 { ...finally... }
//! }
//! ```
//!
//! The `finally` guard keeps a suspension (which leaves the body through a
//! `return` with a non-negative cached state) from running user cleanup.

use coro_ir::{BinaryOp, Block, CatchClause, Expr, LocalId, Stmt, TryStmt, Variable};

use super::Rewriter;
use crate::state::{FIRST_UNUSED, NOT_STARTED_OR_RUNNING};
use crate::LowerError;

impl Rewriter<'_> {
    pub(super) fn rewrite_try(&mut self, try_stmt: &TryStmt) -> Result<Stmt, LowerError> {
        self.states.push_scope();
        let body = self.rewrite_block(&try_stmt.body);
        let closed = self.states.pop_scope();
        let mut body = body?;
        let closed = closed?;

        let mut try_dispatch = None;
        if !closed.dispatch.is_empty() {
            let label = self.states.fresh_label();
            let mut table = closed.dispatch;

            let finalizer_labels = closed.finalizer.map(|finalizer| {
                let finalizer_label = self.states.fresh_label();
                table.add(finalizer_label, &[finalizer]);
                (finalizer_label, self.states.fresh_label())
            });

            let mut header = vec![Stmt::Dispatch(table.build(self.cached()))];
            if let Some((finalizer_label, skip)) = finalizer_labels {
                header.push(Stmt::Goto(skip));
                header.push(Stmt::Label(finalizer_label));
                header.push(self.set_both_states(NOT_STARTED_OR_RUNNING));
                header.push(self.strategy.generate_return(false));
                header.push(Stmt::Label(skip));
            }
            header.push(body);
            body = Stmt::block(header);

            let states = table.all_states();
            tracing::trace!(?label, ?states, finalizer = ?closed.finalizer, "try dispatch header");
            self.states.add_dispatch(label, &states);
            try_dispatch = Some(label);
        }

        self.handler_depth += 1;
        let handlers = self.rewrite_handlers(try_stmt);
        self.handler_depth -= 1;
        let (catches, finally) = handlers?;

        let lowered = Stmt::Try(TryStmt {
            body: Block::new(vec![body]),
            catches,
            finally,
        });
        Ok(match try_dispatch {
            Some(label) => Stmt::block(vec![Stmt::Label(label), lowered]),
            None => lowered,
        })
    }

    fn rewrite_handlers(
        &mut self,
        try_stmt: &TryStmt,
    ) -> Result<(Vec<CatchClause>, Option<Block>), LowerError> {
        let catches = try_stmt
            .catches
            .iter()
            .map(|catch| self.rewrite_catch(catch))
            .collect::<Result<Vec<_>, _>>()?;

        let finally = match &try_stmt.finally {
            Some(finally) => {
                let guarded = Stmt::if_then(
                    Expr::binary(BinaryOp::Lt, self.cached(), Expr::int(FIRST_UNUSED)),
                    self.rewrite_block(finally)?,
                );
                Some(Block::new(vec![guarded]))
            }
            None => None,
        };
        Ok((catches, finally))
    }

    /// The exception local is bound on the stack by the handler, then
    /// copied into its proxy if it has one.
    fn rewrite_catch(&mut self, catch: &CatchClause) -> Result<CatchClause, LowerError> {
        let bound: Vec<LocalId> = catch.local.into_iter().collect();
        let entered = self.hoisting.enter_scope(&bound, &self.locals, true);

        let mut stmts = Vec::with_capacity(2);
        if let Some(local) = catch.local {
            if let Some(proxy) = self.hoisting.proxy(Variable::Local(local)) {
                let ty = self.locals.get(local).ty;
                stmts.push(Stmt::expr(Expr::assign(
                    proxy.replacement(),
                    Expr::local(local, ty),
                )));
            }
        }
        stmts.push(self.rewrite_block(&catch.body)?);

        let body = self.hoisting.leave_scope(&bound, entered, Stmt::block(stmts));
        Ok(CatchClause {
            ty: catch.ty,
            local: catch.local,
            body: Block::new(vec![body]),
        })
    }
}
