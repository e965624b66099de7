//! Reference interpreter for original and lowered bodies.
//!
//! Runs a body and records the observable events: user calls (with
//! argument values), suspensions (with the awaited operation or yielded
//! element) and returns. The original body runs straight through, treating
//! each suspension as "record and continue"; the lowered body is
//! re-entered until it reports completion. Equal traces mean the lowering
//! preserved behavior.
//!
//! Locals are per activation in the lowered run, so a variable that lives
//! across a suspension without a slot reads as uninitialized and panics.
//!
//! Structs are values stored inline in their local, parameter or slot.
//! Reading a class field through `null` throws `null` from the statement
//! being executed.

#![allow(clippy::unwrap_used, clippy::panic)]

use coro_ir::{
    BinaryOp, Block, Expr, Idx, LabelId, Literal, LocalId, Name, ParamId, SlotId, StateId,
    Stmt, StringInterner, Variable,
};
use coro_types::{Pool, Tag};
use rustc_hash::FxHashMap;

use super::{Fixture, Flavor, Lowered};
use crate::FINISHED;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Value {
    Int(i64),
    Bool(bool),
    Str(Name),
    Null,
    Unit,
    Obj(u32),
    Arr(u32),
    Struct(Vec<(Name, Value)>),
    Ref(Place),
}

/// Storage a struct value lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Root {
    Local(LocalId),
    Param(ParamId),
    Slot(SlotId),
}

impl From<Root> for Place {
    fn from(root: Root) -> Self {
        match root {
            Root::Local(local) => Place::Local(local),
            Root::Param(param) => Place::Param(param),
            Root::Slot(slot) => Place::Slot(slot),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Place {
    Local(LocalId),
    Param(ParamId),
    Slot(SlotId),
    Elem(u32, usize),
    Field(u32, Name),
    /// Field of a struct value.
    Member(Root, Name),
    Static(Name),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Call(&'static str, Vec<Value>),
    Suspend(Value),
    Return(Option<Value>),
    Threw(Value),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Flow {
    Normal,
    Jump(LabelId),
    Return(Option<Value>),
    Throw(Value),
    /// Forced termination of the original body: unwinds through `finally`.
    Dispose,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Original,
    Lowered,
}

struct Interp<'a> {
    interner: &'a StringInterner,
    pool: &'a Pool,
    mode: Mode,
    flavor: Flavor,
    intrinsics: Option<crate::AsyncIntrinsics>,
    locals: FxHashMap<LocalId, Value>,
    params: FxHashMap<ParamId, Value>,
    slots: FxHashMap<SlotId, Value>,
    fields: FxHashMap<(u32, Name), Value>,
    statics: FxHashMap<Name, Value>,
    arrays: Vec<Vec<Value>>,
    trace: Vec<Event>,
    user_calls: i64,
    suspends: u32,
    dispose_after: Option<u32>,
    /// Exception raised while evaluating the current statement.
    fault: Option<Value>,
}

/// Whether `label` is defined anywhere inside `stmt`.
pub(crate) fn contains_label(stmt: &Stmt, label: LabelId) -> bool {
    match stmt {
        Stmt::Label(l) => *l == label,
        Stmt::Block(block) => block.stmts.iter().any(|s| contains_label(s, label)),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            contains_label(then_branch, label)
                || else_branch
                    .as_ref()
                    .is_some_and(|e| contains_label(e, label))
        }
        Stmt::Switch { sections, .. } => sections
            .iter()
            .any(|sec| sec.body.iter().any(|s| contains_label(s, label))),
        Stmt::Try(try_stmt) => {
            try_stmt.body.stmts.iter().any(|s| contains_label(s, label))
                || try_stmt
                    .catches
                    .iter()
                    .any(|c| c.body.stmts.iter().any(|s| contains_label(s, label)))
                || try_stmt
                    .finally
                    .as_ref()
                    .is_some_and(|f| f.stmts.iter().any(|s| contains_label(s, label)))
        }
        Stmt::Scope { body, .. } => contains_label(body, label),
        _ => false,
    }
}

impl<'a> Interp<'a> {
    fn new(fx: &'a Fixture, mode: Mode, flavor: Flavor) -> Self {
        Self {
            interner: &fx.interner,
            pool: &fx.pool,
            mode,
            flavor,
            intrinsics: None,
            locals: FxHashMap::default(),
            params: FxHashMap::default(),
            slots: FxHashMap::default(),
            fields: FxHashMap::default(),
            statics: FxHashMap::default(),
            arrays: Vec::new(),
            trace: Vec::new(),
            user_calls: 0,
            suspends: 0,
            dispose_after: None,
            fault: None,
        }
    }

    fn default_of(&self, ty: Idx) -> Value {
        match ty {
            Idx::INT | Idx::BYTE | Idx::CHAR => Value::Int(0),
            Idx::BOOL => Value::Bool(false),
            Idx::UNIT => Value::Unit,
            _ if self.pool.tag(ty) == Tag::Struct => Value::Struct(Vec::new()),
            _ => Value::Null,
        }
    }

    // Storage

    fn read(&self, place: Place) -> Value {
        match place {
            Place::Local(local) => match self.locals.get(&local) {
                Some(Value::Ref(target)) => self.read(*target),
                Some(value) => value.clone(),
                None => panic!("read of uninitialized {local:?}"),
            },
            Place::Param(param) => self
                .params
                .get(&param)
                .cloned()
                .unwrap_or_else(|| panic!("{param:?} is not available here")),
            Place::Slot(slot) => self
                .slots
                .get(&slot)
                .cloned()
                .unwrap_or_else(|| panic!("read of unassigned {slot:?}")),
            Place::Elem(array, index) => self.arrays[array as usize][index].clone(),
            Place::Field(obj, name) => self.fields.get(&(obj, name)).cloned().unwrap_or(Value::Int(0)),
            Place::Member(root, name) => match self.read(root.into()) {
                Value::Struct(fields) => fields
                    .into_iter()
                    .find(|(field, _)| *field == name)
                    .map_or(Value::Int(0), |(_, value)| value),
                other => panic!("member read on {other:?}"),
            },
            Place::Static(name) => self.statics.get(&name).cloned().unwrap_or(Value::Int(0)),
        }
    }

    fn write(&mut self, place: Place, value: Value) {
        match place {
            Place::Local(local) => {
                if let Some(Value::Ref(target)) = self.locals.get(&local) {
                    let target = *target;
                    self.write(target, value);
                } else {
                    self.locals.insert(local, value);
                }
            }
            Place::Param(param) => {
                self.params.insert(param, value);
            }
            Place::Slot(slot) => {
                self.slots.insert(slot, value);
            }
            Place::Elem(array, index) => self.arrays[array as usize][index] = value,
            Place::Field(obj, name) => {
                self.fields.insert((obj, name), value);
            }
            Place::Member(root, name) => {
                let Value::Struct(mut fields) = self.read(root.into()) else {
                    panic!("member write on a non-struct")
                };
                match fields.iter_mut().find(|(field, _)| *field == name) {
                    Some((_, slot)) => *slot = value,
                    None => fields.push((name, value)),
                }
                self.write(root.into(), Value::Struct(fields));
            }
            Place::Static(name) => {
                self.statics.insert(name, value);
            }
        }
    }

    fn place(&mut self, expr: &Expr) -> Place {
        match expr {
            Expr::Local { local, .. } => match self.locals.get(local) {
                Some(Value::Ref(target)) => *target,
                _ => Place::Local(*local),
            },
            Expr::Param { param, .. } => Place::Param(*param),
            Expr::Slot { slot, .. } => Place::Slot(*slot),
            Expr::Index { array, indices, .. } => {
                let Value::Arr(id) = self.eval(array) else {
                    panic!("indexing a non-array")
                };
                let Value::Int(index) = self.eval(&indices[0]) else {
                    panic!("non-integer index")
                };
                Place::Elem(id, usize::try_from(index).unwrap())
            }
            Expr::Field { receiver, field } => match receiver {
                Some(receiver) if !self.pool.is_reference_type(field.owner) => {
                    let root = match self.place(receiver) {
                        Place::Local(local) => Root::Local(local),
                        Place::Param(param) => Root::Param(param),
                        Place::Slot(slot) => Root::Slot(slot),
                        other => panic!("struct field of {other:?}"),
                    };
                    Place::Member(root, field.name)
                }
                Some(receiver) => match self.eval(receiver) {
                    Value::Obj(id) => Place::Field(id, field.name),
                    Value::Null => {
                        self.fault.get_or_insert(Value::Null);
                        Place::Static(field.name)
                    }
                    other => panic!("field access on {other:?}"),
                },
                None => Place::Static(field.name),
            },
            Expr::Sequence { effects, value, .. } => {
                for effect in effects {
                    self.eval(effect);
                }
                self.place(value)
            }
            other => panic!("not a place: {other:?}"),
        }
    }

    // Expressions

    fn eval(&mut self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(Literal::Int(v)) => Value::Int(*v),
            Expr::Literal(Literal::Bool(b)) => Value::Bool(*b),
            Expr::Literal(Literal::Str(s)) => Value::Str(*s),
            Expr::Literal(Literal::Null) => Value::Null,
            Expr::Default(ty) => self.default_of(*ty),
            Expr::This { .. } | Expr::Base { .. } => match self.mode {
                Mode::Original => Value::Obj(0),
                Mode::Lowered => panic!("current instance read without a proxy"),
            },
            Expr::Local { .. }
            | Expr::Param { .. }
            | Expr::Slot { .. }
            | Expr::Index { .. }
            | Expr::Field { .. } => {
                let place = self.place(expr);
                self.read(place)
            }
            Expr::Call { func, args, ty } => {
                let args: Vec<Value> = args.iter().map(|a| self.eval(a)).collect();
                self.call(*func, args, *ty)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs);
                let rhs = self.eval(rhs);
                match (op, lhs, rhs) {
                    (BinaryOp::Add, Value::Int(a), Value::Int(b)) => Value::Int(a + b),
                    (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => Value::Int(a - b),
                    (BinaryOp::Lt, Value::Int(a), Value::Int(b)) => Value::Bool(a < b),
                    (BinaryOp::Eq, a, b) => Value::Bool(a == b),
                    (BinaryOp::NotEq, a, b) => Value::Bool(a != b),
                    (op, a, b) => panic!("bad operands for {op:?}: {a:?}, {b:?}"),
                }
            }
            Expr::Assign {
                target,
                value,
                by_ref: false,
            } => {
                let place = self.place(target);
                let value = self.eval(value);
                self.write(place, value.clone());
                value
            }
            Expr::Assign {
                target,
                value,
                by_ref: true,
            } => {
                let Expr::Local { local, .. } = **target else {
                    panic!("by-reference assignment to a non-local")
                };
                let place = self.place(value);
                self.locals.insert(local, Value::Ref(place));
                Value::Unit
            }
            Expr::Sequence { effects, value, .. } => {
                for effect in effects {
                    self.eval(effect);
                }
                self.eval(value)
            }
        }
    }

    fn call(&mut self, func: Name, args: Vec<Value>, ty: Idx) -> Value {
        if let Some(intrinsics) = self.intrinsics {
            if func == intrinsics.schedule {
                self.suspends += 1;
                self.trace.push(Event::Suspend(args.into_iter().next().unwrap_or(Value::Unit)));
                return Value::Unit;
            }
            if func == intrinsics.get_result {
                return Value::Int(i64::from(self.suspends) * 10);
            }
            if func == intrinsics.set_result {
                self.trace.push(Event::Return(args.into_iter().next()));
                return Value::Unit;
            }
        }
        let name = self.interner.lookup(func);
        if name == "new_array" {
            let Some(Value::Int(len)) = args.first() else {
                panic!("new_array takes a length")
            };
            self.arrays.push(vec![Value::Int(0); usize::try_from(*len).unwrap()]);
            return Value::Arr(u32::try_from(self.arrays.len() - 1).unwrap());
        }
        self.trace.push(Event::Call(name, args));
        self.user_calls += 1;
        match ty {
            Idx::INT => Value::Int(self.user_calls),
            other => self.default_of(other),
        }
    }

    // Statements

    fn run_block(&mut self, block: &Block) -> Flow {
        self.run_list(&block.stmts, None)
    }

    fn run_list(&mut self, stmts: &[Stmt], mut seek: Option<LabelId>) -> Flow {
        let mut next = 0;
        loop {
            if let Some(label) = seek.take() {
                let Some(at) = stmts.iter().position(|s| contains_label(s, label)) else {
                    return Flow::Jump(label);
                };
                next = at + 1;
                match self.seek(&stmts[at], label) {
                    Flow::Normal => {}
                    Flow::Jump(label) => {
                        seek = Some(label);
                        continue;
                    }
                    other => return other,
                }
            }
            let Some(stmt) = stmts.get(next) else {
                return Flow::Normal;
            };
            next += 1;
            match self.exec(stmt) {
                Flow::Normal => {}
                Flow::Jump(label) => seek = Some(label),
                other => return other,
            }
        }
    }

    /// Enter `stmt` at `label` and run to the end of `stmt`.
    fn seek(&mut self, stmt: &Stmt, label: LabelId) -> Flow {
        match stmt {
            Stmt::Label(l) if *l == label => Flow::Normal,
            Stmt::Block(block) => self.run_list(&block.stmts, Some(label)),
            Stmt::Scope { body, .. } => self.seek(body, label),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                if contains_label(then_branch, label) {
                    self.seek(then_branch, label)
                } else {
                    match else_branch {
                        Some(else_branch) => self.seek(else_branch, label),
                        None => panic!("{label:?} not found"),
                    }
                }
            }
            Stmt::Switch { sections, .. } => {
                let section = sections
                    .iter()
                    .find(|sec| sec.body.iter().any(|s| contains_label(s, label)))
                    .unwrap_or_else(|| panic!("{label:?} not found"));
                self.run_list(&section.body, Some(label))
            }
            Stmt::Try(_) => panic!("jump to {label:?} enters a try statement from outside"),
            other => panic!("{label:?} not found in {other:?}"),
        }
    }

    fn exec(&mut self, stmt: &Stmt) -> Flow {
        let flow = self.step(stmt);
        match self.fault.take() {
            Some(exception) => Flow::Throw(exception),
            None => flow,
        }
    }

    fn step(&mut self, stmt: &Stmt) -> Flow {
        match stmt {
            Stmt::Block(block) => self.run_block(block),
            Stmt::Expr(expr) => {
                self.eval(expr);
                Flow::Normal
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond) {
                Value::Bool(true) => self.exec(then_branch),
                Value::Bool(false) => match else_branch {
                    Some(else_branch) => self.exec(else_branch),
                    None => Flow::Normal,
                },
                other => panic!("non-boolean condition {other:?}"),
            },
            Stmt::Switch {
                scrutinee,
                sections,
            } => {
                let Value::Int(value) = self.eval(scrutinee) else {
                    panic!("non-integer switch")
                };
                let section = sections
                    .iter()
                    .find(|sec| sec.values.contains(&value))
                    .or_else(|| sections.iter().find(|sec| sec.is_default));
                match section {
                    Some(section) => self.run_list(&section.body, None),
                    None => Flow::Normal,
                }
            }
            Stmt::Dispatch(dispatch) => {
                let Value::Int(value) = self.eval(&dispatch.scrutinee) else {
                    panic!("non-integer dispatch")
                };
                let target = u32::try_from(value).ok().and_then(|state| {
                    dispatch
                        .arms
                        .iter()
                        .find(|arm| arm.states.contains(&StateId::new(state)))
                });
                match target {
                    Some(arm) => Flow::Jump(arm.target),
                    None => Flow::Normal,
                }
            }
            Stmt::Label(_) | Stmt::Nop => Flow::Normal,
            Stmt::Goto(label) => Flow::Jump(*label),
            Stmt::GotoIf { cond, target } => match self.eval(cond) {
                Value::Bool(true) => Flow::Jump(*target),
                _ => Flow::Normal,
            },
            Stmt::Try(try_stmt) => {
                let mut flow = self.run_block(&try_stmt.body);
                if let (Flow::Throw(exception), Some(catch)) = (flow.clone(), try_stmt.catches.first()) {
                    if let Some(local) = catch.local {
                        self.locals.insert(local, exception);
                    }
                    flow = self.run_block(&catch.body);
                }
                if let Some(finally) = &try_stmt.finally {
                    match self.run_block(finally) {
                        Flow::Normal => {}
                        overriding => flow = overriding,
                    }
                }
                flow
            }
            Stmt::Return(value) => {
                let value = value.as_ref().map(|v| self.eval(v));
                if self.mode == Mode::Original && self.flavor == Flavor::Async {
                    self.trace.push(Event::Return(value.clone()));
                }
                Flow::Return(value)
            }
            Stmt::YieldBreak(_) => Flow::Return(None),
            Stmt::Throw(value) => Flow::Throw(self.eval(value)),
            Stmt::Suspend(point) => {
                assert!(self.mode == Mode::Original, "suspension point survived lowering");
                let operand = point
                    .operand
                    .as_ref()
                    .map_or(Value::Unit, |operand| self.eval(operand));
                self.trace.push(Event::Suspend(operand));
                self.suspends += 1;
                if self.dispose_after == Some(self.suspends) {
                    return Flow::Dispose;
                }
                if let Some(result) = &point.result {
                    let place = self.place(result);
                    self.write(place, Value::Int(i64::from(self.suspends) * 10));
                }
                Flow::Normal
            }
            Stmt::Scope { body, .. } => self.exec(body),
            Stmt::For { .. } | Stmt::Using { .. } => panic!("structured statement in interpreter"),
        }
    }
}

fn finish_trace(interp: &mut Interp<'_>, flow: Flow) {
    match flow {
        Flow::Throw(exception) => interp.trace.push(Event::Threw(exception)),
        Flow::Jump(label) => panic!("unresolved jump to {label:?}"),
        Flow::Normal | Flow::Return(_) | Flow::Dispose => {}
    }
}

/// Run the original body. `dispose_after` stops it at that many
/// suspensions, unwinding through the enclosing `finally` blocks.
pub(crate) fn run_original(
    fx: &Fixture,
    body: &Stmt,
    flavor: Flavor,
    params: &[Value],
    dispose_after: Option<u32>,
) -> Vec<Event> {
    let mut interp = Interp::new(fx, Mode::Original, flavor);
    interp.dispose_after = dispose_after;
    for (i, value) in params.iter().enumerate() {
        interp
            .params
            .insert(ParamId::new(u32::try_from(i).unwrap()), value.clone());
    }
    let flow = interp.exec(body);
    if flavor == Flavor::Async && flow == Flow::Normal {
        interp.trace.push(Event::Return(None));
    }
    finish_trace(&mut interp, flow);
    interp.trace
}

/// Run the lowered body to completion, re-entering it after every
/// suspension. `dispose_after` disposes the machine after that many
/// published elements (iterators only).
pub(crate) fn run_lowered(
    fx: &Fixture,
    lowered: &Lowered,
    params: &[Value],
    dispose_after: Option<u32>,
) -> Vec<Event> {
    let mut interp = Interp::new(fx, Mode::Lowered, lowered.flavor);
    if lowered.flavor == Flavor::Async {
        interp.intrinsics = Some(lowered.intrinsics);
    }
    for &(var, slot) in &lowered.captured {
        let value = match var {
            Variable::This => Value::Obj(0),
            Variable::Param(param) => params[param.index()].clone(),
            Variable::Local(_) => continue,
        };
        interp.slots.insert(slot, value);
    }
    let initial = match lowered.flavor {
        Flavor::Async => -1,
        Flavor::Iterator { .. } => 0,
    };
    interp.slots.insert(lowered.state_slot, Value::Int(initial));

    let mut published = 0;
    for _ in 0..10_000 {
        interp.locals.clear();
        let flow = interp.exec(&lowered.out.body);
        match (lowered.flavor, flow) {
            (Flavor::Async, Flow::Return(_)) => {
                if interp.slots.get(&lowered.state_slot) == Some(&Value::Int(FINISHED)) {
                    return interp.trace;
                }
            }
            (Flavor::Iterator { .. }, Flow::Return(Some(Value::Bool(more)))) => {
                if !more {
                    return interp.trace;
                }
                let current = lowered.current.map_or(Value::Unit, |slot| interp.read(Place::Slot(slot)));
                interp.trace.push(Event::Suspend(current));
                published += 1;
                if dispose_after == Some(published) {
                    dispose(&mut interp, lowered);
                    return interp.trace;
                }
            }
            (_, flow @ Flow::Throw(_)) => {
                finish_trace(&mut interp, flow);
                return interp.trace;
            }
            (_, other) => panic!("activation ended with {other:?}"),
        }
    }
    panic!("machine did not finish")
}

/// Forced termination: jump to the suspended state's finalizer, if any.
fn dispose(interp: &mut Interp<'_>, lowered: &Lowered) {
    let Some(Value::Int(state)) = interp.slots.get(&lowered.state_slot).cloned() else {
        panic!("state slot not an integer")
    };
    let finalizer = u32::try_from(state)
        .ok()
        .and_then(|state| lowered.out.finalizer_map.finalizer_value(StateId::new(state)));
    if let Some(finalizer) = finalizer.filter(|&fin| fin >= 0) {
        interp.slots.insert(lowered.state_slot, Value::Int(finalizer));
        interp.locals.clear();
        let flow = interp.exec(&lowered.out.body);
        assert_eq!(flow, Flow::Return(Some(Value::Bool(true))), "finalizer run must not finish");
    }
    interp.slots.insert(lowered.state_slot, Value::Int(FINISHED));
}
