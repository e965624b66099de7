//! Statement/expression tree.
//!
//! The input to state machine lowering is a validated, already-spilled tree:
//! every suspension point is a statement ([`Stmt::Suspend`]), structured
//! loops have been lowered to labels and jumps, and no multi-effect
//! expression spans a suspension point.
//!
//! The output uses the same tree, plus the nodes only lowering produces:
//! [`Expr::Slot`] reads of durable storage, [`Stmt::Dispatch`] state
//! branches and [`Stmt::Scope`] debug-scope markers.
//!
//! Nodes are owned (`Box`/`Vec`) and never mutated in place: a pass consumes
//! a borrowed tree and builds a new one.

use crate::{Idx, LabelId, LocalId, Name, ParamId, SlotId, Span, StateId};

// ── Expressions ─────────────────────────────────────────────────────

/// Compile-time constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Str(Name),
    Null,
}

impl Literal {
    /// Type of the constant.
    pub fn ty(self) -> Idx {
        match self {
            Literal::Int(_) => Idx::INT,
            Literal::Bool(_) => Idx::BOOL,
            Literal::Str(_) => Idx::STR,
            Literal::Null => Idx::OBJECT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Eq,
    NotEq,
    Lt,
}

impl BinaryOp {
    /// Whether the operator produces `bool`.
    #[inline]
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt)
    }
}

/// A field symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub name: Name,
    /// Type that declares the field.
    pub owner: Idx,
    /// Type of the field's value.
    pub ty: Idx,
    pub is_static: bool,
    pub is_readonly: bool,
}

/// An expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Literal(Literal),
    /// The default value of a type (`0`, `false`, null, zeroed struct).
    Default(Idx),
    Local {
        local: LocalId,
        ty: Idx,
    },
    Param {
        param: ParamId,
        ty: Idx,
    },
    /// The current instance.
    This {
        ty: Idx,
        span: Span,
    },
    /// The current instance viewed as its base type.
    Base {
        ty: Idx,
        span: Span,
    },
    /// Read of durable per-instance storage. Produced by lowering.
    Slot {
        slot: SlotId,
        ty: Idx,
    },
    /// Field access. `receiver` is `None` for static fields.
    Field {
        receiver: Option<Box<Expr>>,
        field: FieldRef,
    },
    /// Array element access.
    Index {
        array: Box<Expr>,
        indices: Vec<Expr>,
        ty: Idx,
    },
    /// Call of a named function or intrinsic.
    Call {
        func: Name,
        args: Vec<Expr>,
        ty: Idx,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value`, or `target = ref value` when `by_ref`.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        by_ref: bool,
    },
    /// Evaluate `effects` in order, then `value`, with `locals` in scope.
    Sequence {
        locals: Vec<LocalId>,
        effects: Vec<Expr>,
        value: Box<Expr>,
    },
}

impl Expr {
    // Constructors

    #[inline]
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    #[inline]
    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    #[inline]
    pub fn local(local: LocalId, ty: Idx) -> Self {
        Expr::Local { local, ty }
    }

    #[inline]
    pub fn slot(slot: SlotId, ty: Idx) -> Self {
        Expr::Slot { slot, ty }
    }

    pub fn call(func: Name, args: Vec<Expr>, ty: Idx) -> Self {
        Expr::Call { func, args, ty }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
            by_ref: false,
        }
    }

    pub fn assign_ref(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
            by_ref: true,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn field(receiver: Option<Expr>, field: FieldRef) -> Self {
        Expr::Field {
            receiver: receiver.map(Box::new),
            field,
        }
    }

    pub fn index(array: Expr, indices: Vec<Expr>, ty: Idx) -> Self {
        Expr::Index {
            array: Box::new(array),
            indices,
            ty,
        }
    }

    // Queries

    /// The static type of this expression.
    pub fn ty(&self) -> Idx {
        match self {
            Expr::Literal(lit) => lit.ty(),
            Expr::Default(ty)
            | Expr::Local { ty, .. }
            | Expr::Param { ty, .. }
            | Expr::This { ty, .. }
            | Expr::Base { ty, .. }
            | Expr::Slot { ty, .. }
            | Expr::Index { ty, .. }
            | Expr::Call { ty, .. } => *ty,
            Expr::Field { field, .. } => field.ty,
            Expr::Binary { op, lhs, .. } => {
                if op.is_comparison() {
                    Idx::BOOL
                } else {
                    lhs.ty()
                }
            }
            Expr::Assign { value, .. } => value.ty(),
            Expr::Sequence { value, .. } => value.ty(),
        }
    }

    /// Whether this expression is a compile-time constant.
    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Literal(_) => "literal",
            Expr::Default(_) => "default",
            Expr::Local { .. } => "local",
            Expr::Param { .. } => "parameter",
            Expr::This { .. } => "this",
            Expr::Base { .. } => "base",
            Expr::Slot { .. } => "slot",
            Expr::Field { .. } => "field access",
            Expr::Index { .. } => "array access",
            Expr::Call { .. } => "call",
            Expr::Binary { .. } => "binary operation",
            Expr::Assign { .. } => "assignment",
            Expr::Sequence { .. } => "sequence",
        }
    }
}

// ── Statements ──────────────────────────────────────────────────────

/// A statement list that owns the locals declared directly in it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Block {
    pub locals: Vec<LocalId>,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            locals: Vec::new(),
            stmts,
        }
    }

    pub fn with_locals(locals: Vec<LocalId>, stmts: Vec<Stmt>) -> Self {
        Self { locals, stmts }
    }
}

/// One `case` group of a user-level switch. Each section is its own scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SwitchSection {
    /// Matched constants. Empty together with `is_default` for `default:`.
    pub values: Vec<i64>,
    pub is_default: bool,
    pub locals: Vec<LocalId>,
    pub body: Vec<Stmt>,
}

/// Generated multi-way branch on a state value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dispatch {
    pub scrutinee: Expr,
    /// Arms in ascending order of their smallest state.
    pub arms: Vec<DispatchArm>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DispatchArm {
    /// Sorted ascending.
    pub states: Vec<StateId>,
    pub target: LabelId,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TryStmt {
    pub body: Block,
    pub catches: Vec<CatchClause>,
    pub finally: Option<Block>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CatchClause {
    /// Exception type caught.
    pub ty: Idx,
    /// Local bound to the caught exception; declared in the catch's scope.
    pub local: Option<LocalId>,
    pub body: Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SuspendKind {
    /// Await an asynchronous operation.
    Await,
    /// Produce the next element of a pausable iteration.
    Yield,
}

/// A suspension point.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SuspendPoint {
    pub kind: SuspendKind,
    /// The awaited operation or yielded element.
    pub operand: Option<Expr>,
    /// Where an await's result is stored after resumption.
    pub result: Option<Expr>,
    pub span: Span,
}

/// A statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stmt {
    Block(Block),
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// User-level switch on an integer.
    Switch {
        scrutinee: Expr,
        sections: Vec<SwitchSection>,
    },
    /// Generated state branch. Falls through when no arm matches.
    Dispatch(Dispatch),
    Label(LabelId),
    Goto(LabelId),
    /// Jump to `target` when `cond` is true.
    GotoIf {
        cond: Expr,
        target: LabelId,
    },
    Try(TryStmt),
    Return(Option<Expr>),
    Throw(Expr),
    Suspend(SuspendPoint),
    /// End of a pausable iteration.
    YieldBreak(Span),
    /// Debug-scope marker: `slots` hold user variables live within `body`.
    Scope {
        slots: Vec<SlotId>,
        body: Box<Stmt>,
    },
    /// Structured loop. Must be lowered before state machine lowering.
    For {
        body: Box<Stmt>,
        span: Span,
    },
    /// Structured resource scope. Must be lowered before state machine lowering.
    Using {
        resource: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    Nop,
}

impl Stmt {
    // Constructors

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Stmt::Block(Block::new(stmts))
    }

    pub fn scoped(locals: Vec<LocalId>, stmts: Vec<Stmt>) -> Self {
        Stmt::Block(Block::with_locals(locals, stmts))
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }

    pub fn if_then(cond: Expr, then_branch: Stmt) -> Self {
        Stmt::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: None,
        }
    }

    pub fn try_finally(body: Block, finally: Block) -> Self {
        Stmt::Try(TryStmt {
            body,
            catches: Vec::new(),
            finally: Some(finally),
        })
    }

    pub fn await_(operand: Expr, result: Option<Expr>, span: Span) -> Self {
        Stmt::Suspend(SuspendPoint {
            kind: SuspendKind::Await,
            operand: Some(operand),
            result,
            span,
        })
    }

    pub fn yield_(value: Expr, span: Span) -> Self {
        Stmt::Suspend(SuspendPoint {
            kind: SuspendKind::Yield,
            operand: Some(value),
            result: None,
            span,
        })
    }

    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Block(_) => "block",
            Stmt::Expr(_) => "expression",
            Stmt::If { .. } => "if",
            Stmt::Switch { .. } => "switch",
            Stmt::Dispatch(_) => "dispatch",
            Stmt::Label(_) => "label",
            Stmt::Goto(_) => "goto",
            Stmt::GotoIf { .. } => "conditional goto",
            Stmt::Try(_) => "try",
            Stmt::Return(_) => "return",
            Stmt::Throw(_) => "throw",
            Stmt::Suspend(_) => "suspension",
            Stmt::YieldBreak(_) => "yield break",
            Stmt::Scope { .. } => "scope",
            Stmt::For { .. } => "for",
            Stmt::Using { .. } => "using",
            Stmt::Nop => "nop",
        }
    }
}
