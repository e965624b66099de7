//! Resume strategies.
//!
//! The shared lowering engine knows how to number states, dispatch on them
//! and keep variables alive across suspensions. What a suspension *does*
//! (schedule a continuation, publish an element) and how a machine returns
//! control to its caller depends on the kind of machine; that is a
//! [`ResumeStrategy`].

use coro_ir::{Expr, Idx, Name, SlotId, Stmt, StringInterner, SuspendKind};

use crate::state::FINISHED;

/// Kind-specific hooks consulted by the shared lowering engine.
pub trait ResumeStrategy {
    /// Whether states are recorded in the finalizer map and `try` bodies get
    /// a finalizer state. Needed by machines that can be disposed while
    /// suspended.
    fn uses_finalizer_bookkeeping(&self) -> bool;

    /// First state number handed out by the allocator.
    fn first_state(&self) -> u32;

    /// Value the persisted state holds before the first activation, if the
    /// machine must refuse activations from any other non-resumable value.
    fn initial_state(&self) -> Option<i64> {
        None
    }

    /// Statement returning control to the caller. `finished` is true when
    /// the body ran to completion.
    fn generate_return(&self, finished: bool) -> Stmt;

    /// Statements run before the state is recorded at a suspension point.
    fn before_suspend(&self, kind: SuspendKind, operand: Option<Expr>) -> Vec<Stmt>;

    /// Statements run right after the machine resumes at a suspension point.
    fn after_resume(&self, kind: SuspendKind, result: Option<Expr>) -> Vec<Stmt>;

    /// Lowering of a `return` (or `yield break`, where `value` is `None`).
    fn lower_return(&self, value: Option<Expr>) -> Vec<Stmt>;
}

/// Names of the runtime intrinsics an async machine calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsyncIntrinsics {
    /// `await_on_completed(operation)`: schedule the machine's next
    /// activation for when `operation` completes.
    pub schedule: Name,
    /// `get_result() -> T`: result of the operation just awaited.
    pub get_result: Name,
    /// `set_result(value)`: publish the method's result.
    pub set_result: Name,
}

impl AsyncIntrinsics {
    pub fn intern(interner: &StringInterner) -> Self {
        Self {
            schedule: interner.intern("await_on_completed"),
            get_result: interner.intern("get_result"),
            set_result: interner.intern("set_result"),
        }
    }
}

/// Asynchronous methods: no finalizer bookkeeping, states from 0.
#[derive(Clone, Copy, Debug)]
pub struct AsyncStrategy {
    state: SlotId,
    intrinsics: AsyncIntrinsics,
}

impl AsyncStrategy {
    pub fn new(state: SlotId, intrinsics: AsyncIntrinsics) -> Self {
        Self { state, intrinsics }
    }
}

impl ResumeStrategy for AsyncStrategy {
    fn uses_finalizer_bookkeeping(&self) -> bool {
        false
    }

    fn first_state(&self) -> u32 {
        0
    }

    fn generate_return(&self, finished: bool) -> Stmt {
        if finished {
            Stmt::block(vec![
                Stmt::expr(Expr::assign(
                    Expr::slot(self.state, Idx::INT),
                    Expr::int(FINISHED),
                )),
                Stmt::Return(None),
            ])
        } else {
            Stmt::Return(None)
        }
    }

    fn before_suspend(&self, _kind: SuspendKind, operand: Option<Expr>) -> Vec<Stmt> {
        operand
            .map(|op| Stmt::expr(Expr::call(self.intrinsics.schedule, vec![op], Idx::UNIT)))
            .into_iter()
            .collect()
    }

    fn after_resume(&self, _kind: SuspendKind, result: Option<Expr>) -> Vec<Stmt> {
        result
            .map(|target| {
                let ty = target.ty();
                Stmt::expr(Expr::assign(
                    target,
                    Expr::call(self.intrinsics.get_result, Vec::new(), ty),
                ))
            })
            .into_iter()
            .collect()
    }

    fn lower_return(&self, value: Option<Expr>) -> Vec<Stmt> {
        vec![
            Stmt::expr(Expr::call(
                self.intrinsics.set_result,
                value.into_iter().collect(),
                Idx::UNIT,
            )),
            self.generate_return(true),
        ]
    }
}

/// Pausable iterations: finalizer bookkeeping on, states from 1, state 0
/// reserved for "created, never started".
///
/// Returning `true` from an activation means an element was published to
/// the `current` slot; `false` means the iteration is over.
#[derive(Clone, Copy, Debug)]
pub struct IteratorStrategy {
    current: SlotId,
    first_state: u32,
}

impl IteratorStrategy {
    pub fn new(current: SlotId) -> Self {
        Self {
            current,
            first_state: 1,
        }
    }

    #[must_use]
    pub fn with_first_state(mut self, first_state: u32) -> Self {
        self.first_state = first_state;
        self
    }
}

impl ResumeStrategy for IteratorStrategy {
    fn uses_finalizer_bookkeeping(&self) -> bool {
        true
    }

    fn first_state(&self) -> u32 {
        self.first_state
    }

    fn initial_state(&self) -> Option<i64> {
        Some(0)
    }

    fn generate_return(&self, finished: bool) -> Stmt {
        Stmt::Return(Some(Expr::bool(!finished)))
    }

    fn before_suspend(&self, _kind: SuspendKind, operand: Option<Expr>) -> Vec<Stmt> {
        operand
            .map(|value| {
                let ty = value.ty();
                Stmt::expr(Expr::assign(Expr::slot(self.current, ty), value))
            })
            .into_iter()
            .collect()
    }

    fn after_resume(&self, _kind: SuspendKind, _result: Option<Expr>) -> Vec<Stmt> {
        Vec::new()
    }

    fn lower_return(&self, _value: Option<Expr>) -> Vec<Stmt> {
        vec![self.generate_return(true)]
    }
}
