//! State allocation, dispatch tables and the finalizer-state map.
//!
//! Every suspension point gets a fresh state number and a fresh resume
//! label. States are grouped into dispatch tables, one per nesting level of
//! `try` bodies: the innermost table routes a state to its resume label,
//! and when a `try` is closed its table collapses into a single entry of
//! the enclosing table that routes *all* of its states to the `try`'s
//! header. Resuming therefore always enters protected regions through
//! their front door.
//!
//! # Finalizer states
//!
//! When the strategy keeps finalizer bookkeeping, each `try` body gets one
//! extra state, allocated lazily the first time a suspension is seen inside
//! it. Dispatching to the finalizer state runs the protected region's
//! `finally` blocks without resuming the body; the finalizer map records,
//! for every state, which finalizer state to run to dispose a machine
//! suspended there. A finalizer state is itself recorded against the
//! finalizer of the enclosing `try` body, or against none at the method
//! level, so every chain in the map ends within the `try` nesting depth.

use std::collections::BTreeMap;

use coro_ir::{Dispatch, DispatchArm, Expr, LabelId, StateId};
use smallvec::SmallVec;

use crate::LowerError;

/// Persisted-state value: not started, or currently running.
pub const NOT_STARTED_OR_RUNNING: i64 = -1;

/// Persisted-state value: ran to completion.
pub const FINISHED: i64 = -2;

/// States below this value are sentinels. `finally` blocks only run their
/// user code when the cached state is below it.
pub const FIRST_UNUSED: i64 = 0;

/// Label → states that dispatch to it. Insertion order is kept; arms are
/// sorted when the table is turned into a [`Dispatch`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchTable {
    entries: Vec<(LabelId, SmallVec<[StateId; 1]>)>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Route `states` to `label`. Adding to an existing label extends it.
    pub fn add(&mut self, label: LabelId, states: &[StateId]) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(l, _)| *l == label) {
            existing.extend_from_slice(states);
        } else {
            self.entries.push((label, SmallVec::from_slice(states)));
        }
    }

    /// States routed to `label`, in insertion order.
    pub fn states_for(&self, label: LabelId) -> Option<&[StateId]> {
        self.entries
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, states)| states.as_slice())
    }

    /// Every state in the table, sorted ascending.
    pub fn all_states(&self) -> Vec<StateId> {
        let mut states: Vec<StateId> = self
            .entries
            .iter()
            .flat_map(|(_, states)| states.iter().copied())
            .collect();
        states.sort_unstable();
        states
    }

    /// Build the multi-way branch on `scrutinee`.
    ///
    /// Each arm's states are sorted, and arms are ordered by their smallest
    /// state, so the output does not depend on insertion order.
    pub fn build(&self, scrutinee: Expr) -> Dispatch {
        let mut arms: Vec<DispatchArm> = self
            .entries
            .iter()
            .map(|(target, states)| {
                let mut states = states.to_vec();
                states.sort_unstable();
                DispatchArm {
                    states,
                    target: *target,
                }
            })
            .collect();
        arms.sort_by_key(|arm| arm.states.first().copied());
        Dispatch { scrutinee, arms }
    }
}

/// State → finalizer state to run when disposing a machine suspended in
/// that state. `None` means no `finally` encloses the state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FinalizerMap {
    map: BTreeMap<StateId, Option<StateId>>,
}

impl FinalizerMap {
    /// Finalizer of `state`. `None` if the state is unknown.
    pub fn get(&self, state: StateId) -> Option<Option<StateId>> {
        self.map.get(&state).copied()
    }

    /// Finalizer as the persisted-state value to store, with the
    /// not-started sentinel standing for "no finalizer".
    pub fn finalizer_value(&self, state: StateId) -> Option<i64> {
        self.get(state)
            .map(|fin| fin.map_or(NOT_STARTED_OR_RUNNING, StateId::value))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries in ascending state order.
    pub fn iter(&self) -> impl Iterator<Item = (StateId, Option<StateId>)> + '_ {
        self.map.iter().map(|(&state, &fin)| (state, fin))
    }

    /// Finalizer states visited when iterating the map from `state` until
    /// it reaches "no finalizer" (or a state with no entry): the innermost
    /// enclosing finalizer first, then each enclosing `try`'s in turn.
    /// The walk stops at a repeated state.
    pub fn chain(&self, state: StateId) -> Vec<StateId> {
        let mut chain = Vec::new();
        let mut current = state;
        while let Some(Some(fin)) = self.get(current) {
            if chain.contains(&fin) || fin == state {
                break;
            }
            chain.push(fin);
            current = fin;
        }
        chain
    }

    fn insert(&mut self, state: StateId, finalizer: Option<StateId>) {
        let previous = self.map.insert(state, finalizer);
        debug_assert!(previous.is_none(), "{state:?} recorded twice");
    }
}

/// Per-`try`-body bookkeeping.
#[derive(Debug, Default)]
struct ScopeFrame {
    dispatch: DispatchTable,
    finalizer: Option<StateId>,
    /// Whether `finalizer` has been decided for this scope.
    has_finalizer_state: bool,
}

/// What a closed `try` body contributed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClosedScope {
    pub dispatch: DispatchTable,
    /// The body's finalizer state, if it had any suspension and the strategy
    /// keeps finalizer bookkeeping.
    pub finalizer: Option<StateId>,
}

/// Hands out states and labels, and tracks the dispatch table of every
/// open `try` body.
pub struct StateAllocator {
    first_state: u32,
    next_state: u32,
    next_label: u32,
    finalizer_bookkeeping: bool,
    /// `scopes[0]` is the method body; never empty.
    scopes: Vec<ScopeFrame>,
    finalizer_map: FinalizerMap,
}

impl StateAllocator {
    pub fn new(first_state: u32, finalizer_bookkeeping: bool) -> Self {
        Self {
            first_state,
            next_state: first_state,
            next_label: 0,
            finalizer_bookkeeping,
            scopes: vec![ScopeFrame {
                // The method body never runs a finalizer of its own.
                has_finalizer_state: true,
                ..ScopeFrame::default()
            }],
            finalizer_map: FinalizerMap::default(),
        }
    }

    fn bump_state(&mut self) -> Result<StateId, LowerError> {
        let state = StateId::new(self.next_state);
        self.next_state = self
            .next_state
            .checked_add(1)
            .ok_or(LowerError::StatesExhausted {
                first_state: self.first_state,
            })?;
        Ok(state)
    }

    fn current(&mut self) -> &mut ScopeFrame {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// A label unique within the method.
    pub fn fresh_label(&mut self) -> LabelId {
        let label = LabelId::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// The current scope's finalizer state, allocated on first use.
    fn current_finalizer(&mut self) -> Result<Option<StateId>, LowerError> {
        if !self.current().has_finalizer_state {
            let finalizer = self.bump_state()?;
            let scope = self.current();
            scope.finalizer = Some(finalizer);
            scope.has_finalizer_state = true;
            tracing::trace!(?finalizer, "allocated finalizer state");
        }
        Ok(self.current().finalizer)
    }

    /// Allocate a state and its resume label, and route the state to the
    /// label in the current scope's dispatch table.
    ///
    /// # Errors
    /// [`LowerError::StatesExhausted`] when the state number would not fit
    /// the persisted state value.
    pub fn add_state(&mut self) -> Result<(StateId, LabelId), LowerError> {
        let state = self.bump_state()?;
        let resume = self.fresh_label();
        self.current().dispatch.add(resume, &[state]);

        if self.finalizer_bookkeeping {
            let finalizer = self.current_finalizer()?;
            self.finalizer_map.insert(state, finalizer);
        }

        tracing::trace!(?state, ?resume, depth = self.scopes.len() - 1, "allocated state");
        Ok((state, resume))
    }

    /// Route `states` to `label` in the current scope's table.
    pub fn add_dispatch(&mut self, label: LabelId, states: &[StateId]) {
        self.current().dispatch.add(label, states);
    }

    /// Open a `try` body: fresh table, finalizer state not yet decided.
    pub fn push_scope(&mut self) {
        self.scopes.push(ScopeFrame::default());
    }

    /// Close the innermost `try` body and restore the enclosing scope.
    ///
    /// A finalizer state of the closed body is recorded against the
    /// enclosing body's finalizer, which is allocated here if the enclosing
    /// body had no suspension of its own yet.
    ///
    /// # Errors
    /// [`LowerError::StatesExhausted`] when that allocation runs out of
    /// state numbers.
    pub fn pop_scope(&mut self) -> Result<ClosedScope, LowerError> {
        debug_assert!(self.scopes.len() > 1, "pop_scope without push_scope");
        let frame = self.scopes.pop().unwrap_or_default();
        if let Some(finalizer) = frame.finalizer {
            let enclosing = self.current_finalizer()?;
            self.finalizer_map.insert(finalizer, enclosing);
        }
        Ok(ClosedScope {
            dispatch: frame.dispatch,
            finalizer: frame.finalizer,
        })
    }

    #[inline]
    pub fn first_state(&self) -> u32 {
        self.first_state
    }

    /// Depth of open `try` bodies.
    #[inline]
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Number of state values handed out, finalizer states included.
    #[inline]
    pub fn state_count(&self) -> u32 {
        self.next_state - self.first_state
    }

    /// Finish allocation: the method-level table and the finalizer map.
    pub fn finish(mut self) -> (DispatchTable, FinalizerMap) {
        debug_assert_eq!(self.scopes.len(), 1, "unbalanced try scopes");
        let root = self.scopes.swap_remove(0);
        (root.dispatch, self.finalizer_map)
    }
}
