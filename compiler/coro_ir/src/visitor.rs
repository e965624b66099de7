//! Read-only tree visitor.
//!
//! Default implementations call the `walk_*` functions, which visit every
//! child in source order. Override `visit_*` to observe specific nodes and
//! call the matching `walk_*` to keep descending.
//!
//! # Example
//!
//! ```text
//! struct CountSuspends(usize);
//!
//! impl<'a> Visitor<'a> for CountSuspends {
//!     fn visit_stmt(&mut self, stmt: &'a Stmt) {
//!         if matches!(stmt, Stmt::Suspend(_)) {
//!             self.0 += 1;
//!         }
//!         walk_stmt(self, stmt);
//!     }
//! }
//! ```

use crate::tree::{Block, Expr, Stmt};

pub trait Visitor<'a> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        walk_expr(self, expr);
    }

    fn visit_block(&mut self, block: &'a Block) {
        walk_block(self, block);
    }
}

pub fn walk_block<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, block: &'a Block) {
    for stmt in &block.stmts {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, stmt: &'a Stmt) {
    match stmt {
        Stmt::Block(block) => visitor.visit_block(block),
        Stmt::Expr(expr) | Stmt::Throw(expr) => visitor.visit_expr(expr),
        Stmt::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(cond);
            visitor.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        Stmt::Switch {
            scrutinee,
            sections,
        } => {
            visitor.visit_expr(scrutinee);
            for section in sections {
                for stmt in &section.body {
                    visitor.visit_stmt(stmt);
                }
            }
        }
        Stmt::Dispatch(dispatch) => visitor.visit_expr(&dispatch.scrutinee),
        Stmt::GotoIf { cond, .. } => visitor.visit_expr(cond),
        Stmt::Try(try_stmt) => {
            visitor.visit_block(&try_stmt.body);
            for catch in &try_stmt.catches {
                visitor.visit_block(&catch.body);
            }
            if let Some(finally) = &try_stmt.finally {
                visitor.visit_block(finally);
            }
        }
        Stmt::Suspend(point) => {
            if let Some(operand) = &point.operand {
                visitor.visit_expr(operand);
            }
            if let Some(result) = &point.result {
                visitor.visit_expr(result);
            }
        }
        Stmt::Scope { body, .. } | Stmt::For { body, .. } => visitor.visit_stmt(body),
        Stmt::Using { resource, body, .. } => {
            visitor.visit_expr(resource);
            visitor.visit_stmt(body);
        }
        Stmt::Label(_) | Stmt::Goto(_) | Stmt::YieldBreak(_) | Stmt::Nop => {}
    }
}

pub fn walk_expr<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, expr: &'a Expr) {
    match expr {
        Expr::Field { receiver, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
        }
        Expr::Index { array, indices, .. } => {
            visitor.visit_expr(array);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        Expr::Assign { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        Expr::Sequence { effects, value, .. } => {
            for effect in effects {
                visitor.visit_expr(effect);
            }
            visitor.visit_expr(value);
        }
        Expr::Literal(_)
        | Expr::Default(_)
        | Expr::Local { .. }
        | Expr::Param { .. }
        | Expr::This { .. }
        | Expr::Base { .. }
        | Expr::Slot { .. } => {}
    }
}
