//! Stack-based state machine.
//!
//! The machine owns every registered state and keeps a stack of kinds:
//! - The top of the stack is the current state and the only one updated
//! - Queued transitions share one slot, the last request wins, and at most
//!   one is applied per frame
//! - `_now` variants apply synchronously
//! - Every applied transition is recorded and announced as `StateChanged`

use std::collections::VecDeque;
use std::fmt;

use ahash::AHashMap;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{payload, EventKind, Publisher};
use crate::input::InputEvent;
use crate::state::{GameState, StateContext, StateData, StateKind, TransitionRequest};
use crate::surface::Surface;

/// Default number of transitions kept in history.
pub const DEFAULT_TRANSITION_HISTORY: usize = 50;

const SOURCE: &str = "state_machine";

/// Reasons a transition request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Target kind was never registered
    #[error("state {0} is not registered")]
    NotRegistered(StateKind),
    /// Pop requested with a single state on the stack
    #[error("cannot pop the last state on the stack")]
    SingletonStack,
    /// Target kind is not on the stack
    #[error("state {0} is not on the stack")]
    NotOnStack(StateKind),
    /// Target kind is already on the stack
    #[error("state {0} is already on the stack")]
    AlreadyStacked(StateKind),
    /// Registration would replace a stacked state
    #[error("cannot replace state {0} while it is on the stack")]
    ReplacingStacked(StateKind),
}

/// Kind of an applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Stack replaced
    Change,
    /// State pushed
    Push,
    /// State popped
    Pop,
}

impl TransitionKind {
    /// Lowercase name used in payloads.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Push => "push",
            Self::Pop => "pop",
        }
    }
}

/// An applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
    /// What happened
    pub transition: TransitionKind,
    /// Top of the stack before
    pub from: Option<StateKind>,
    /// Top of the stack after
    pub to: Option<StateKind>,
}

struct StateEntry {
    state: Box<dyn GameState>,
    active: bool,
    initialized: bool,
    data: StateData,
}

/// Owns registered states and drives transitions between them.
pub struct StateMachine {
    states: AHashMap<StateKind, StateEntry>,
    stack: Vec<StateKind>,
    pending: Option<TransitionRequest>,
    history: VecDeque<TransitionRecord>,
    history_capacity: usize,
    publisher: Publisher,
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("registered", &self.states.len())
            .field("stack", &self.stack)
            .field("pending", &self.pending)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

fn report(operation: &str, result: Result<(), TransitionError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err @ TransitionError::NotRegistered(_)) => {
            error!(operation, %err, "transition rejected");
            false
        },
        Err(err) => {
            warn!(operation, %err, "transition rejected");
            false
        },
    }
}

fn kind_value(kind: Option<StateKind>) -> Value {
    kind.map_or(Value::Null, |k| json!(k.name()))
}

impl StateMachine {
    /// Create an empty state machine.
    #[must_use]
    pub fn new(publisher: Publisher) -> Self {
        Self::with_history_capacity(publisher, DEFAULT_TRANSITION_HISTORY)
    }

    /// Create an empty state machine keeping `capacity` transitions.
    #[must_use]
    pub fn with_history_capacity(publisher: Publisher, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            states: AHashMap::new(),
            stack: Vec::new(),
            pending: None,
            history: VecDeque::with_capacity(capacity),
            history_capacity: capacity,
            publisher,
        }
    }

    // === Registry ===

    /// Registers a state and runs its one-time initialization.
    ///
    /// Replacing a registered state is allowed unless it is on the stack.
    pub fn register<S: GameState + 'static>(&mut self, state: S) -> bool {
        self.register_boxed(Box::new(state))
    }

    /// Registers a boxed state.
    pub fn register_boxed(&mut self, mut state: Box<dyn GameState>) -> bool {
        let kind = state.kind();
        if self.stack.contains(&kind) {
            return report("register", Err(TransitionError::ReplacingStacked(kind)));
        }
        if let Some(mut old) = self.states.remove(&kind) {
            warn!(state = %kind, "replacing registered state");
            old.state.cleanup();
        }

        state.on_initialize();
        self.states.insert(
            kind,
            StateEntry {
                state,
                active: false,
                initialized: true,
                data: StateData::new(),
            },
        );
        debug!(state = %kind, "registered state");
        true
    }

    /// Removes a state, taking it off the stack first if needed.
    ///
    /// Returns `false` if the kind was not registered.
    pub fn unregister(&mut self, kind: StateKind) -> bool {
        if !self.states.contains_key(&kind) {
            return false;
        }

        if let Some(position) = self.stack.iter().position(|&k| k == kind) {
            warn!(state = %kind, "unregistering a state that is on the stack");
            let was_top = position + 1 == self.stack.len();
            self.stack.remove(position);
            self.exit_state(kind, None);
            if was_top {
                if let Some(top) = self.current() {
                    self.resume_state(top);
                }
            }
        }

        if let Some(mut entry) = self.states.remove(&kind) {
            entry.state.cleanup();
        }
        debug!(state = %kind, "unregistered state");
        true
    }

    /// Check if a kind is registered.
    #[must_use]
    pub fn is_registered(&self, kind: StateKind) -> bool {
        self.states.contains_key(&kind)
    }

    /// Check if a registered state has run its one-time initialization.
    #[must_use]
    pub fn is_initialized(&self, kind: StateKind) -> bool {
        self.states.get(&kind).is_some_and(|entry| entry.initialized)
    }

    // === Queued transitions ===

    /// Queues replacing the stack with `target`.
    pub fn change_state(&mut self, target: StateKind, data: StateData) -> bool {
        report("change", self.queue(TransitionRequest::Change { target, data }))
    }

    /// Queues pushing `target` over the current state.
    pub fn push_state(&mut self, target: StateKind, data: StateData) -> bool {
        report("push", self.queue(TransitionRequest::Push { target, data }))
    }

    /// Queues popping the current state.
    pub fn pop_state(&mut self) -> bool {
        report("pop", self.queue(TransitionRequest::Pop))
    }

    /// Check if a queued transition is waiting.
    #[must_use]
    pub fn has_pending_transition(&self) -> bool {
        self.pending.is_some()
    }

    fn queue(&mut self, request: TransitionRequest) -> Result<(), TransitionError> {
        match &request {
            TransitionRequest::Change { target, .. } => self.ensure_registered(*target)?,
            TransitionRequest::Push { target, .. } => {
                self.ensure_registered(*target)?;
                self.ensure_not_stacked(*target)?;
            },
            TransitionRequest::Pop => self.ensure_poppable()?,
        }

        if let Some(previous) = self.pending.replace(request) {
            debug!(overwritten = previous.name(), "pending transition replaced");
        }
        Ok(())
    }

    fn absorb(&mut self, request: Option<TransitionRequest>) {
        if let Some(request) = request {
            let operation = request.name();
            report(operation, self.queue(request));
        }
    }

    // === Immediate transitions ===

    /// Replaces the stack with `target` now.
    pub fn change_state_now(&mut self, target: StateKind, data: StateData) -> bool {
        report("change", self.perform_change(target, data))
    }

    /// Pushes `target` now.
    pub fn push_state_now(&mut self, target: StateKind, data: StateData) -> bool {
        report("push", self.perform_push(target, data))
    }

    /// Pops the current state now.
    pub fn pop_state_now(&mut self) -> bool {
        report("pop", self.perform_pop())
    }

    /// Pops until `target` is on top, then merges `data` into it.
    pub fn back_to_state(&mut self, target: StateKind, data: StateData) -> bool {
        report("back_to", self.perform_back_to(target, data))
    }

    /// Exits every stacked state, then makes `target` the only one.
    pub fn clear_to_state(&mut self, target: StateKind, data: StateData) -> bool {
        report("clear_to", self.perform_clear_to(target, data))
    }

    fn ensure_registered(&self, kind: StateKind) -> Result<(), TransitionError> {
        if self.states.contains_key(&kind) {
            Ok(())
        } else {
            Err(TransitionError::NotRegistered(kind))
        }
    }

    fn ensure_not_stacked(&self, kind: StateKind) -> Result<(), TransitionError> {
        if self.stack.contains(&kind) {
            Err(TransitionError::AlreadyStacked(kind))
        } else {
            Ok(())
        }
    }

    fn ensure_poppable(&self) -> Result<(), TransitionError> {
        if self.stack.len() > 1 {
            Ok(())
        } else {
            Err(TransitionError::SingletonStack)
        }
    }

    fn apply(&mut self, request: TransitionRequest) -> Result<(), TransitionError> {
        match request {
            TransitionRequest::Change { target, data } => self.perform_change(target, data),
            TransitionRequest::Push { target, data } => self.perform_push(target, data),
            TransitionRequest::Pop => self.perform_pop(),
        }
    }

    fn perform_change(&mut self, target: StateKind, data: StateData) -> Result<(), TransitionError> {
        self.ensure_registered(target)?;
        let from = self.current();

        while let Some(kind) = self.stack.pop() {
            self.exit_state(kind, Some(target));
        }
        self.stack.push(target);
        self.enter_state(target, from, data);

        self.record(TransitionKind::Change, from, Some(target));
        Ok(())
    }

    fn perform_push(&mut self, target: StateKind, data: StateData) -> Result<(), TransitionError> {
        self.ensure_registered(target)?;
        self.ensure_not_stacked(target)?;
        let from = self.current();

        if let Some(entry) = from.and_then(|kind| self.states.get_mut(&kind)) {
            if entry.state.flags().can_pause {
                entry.state.pause();
            }
        }
        self.stack.push(target);
        self.enter_state(target, from, data);

        self.record(TransitionKind::Push, from, Some(target));
        Ok(())
    }

    fn perform_pop(&mut self) -> Result<(), TransitionError> {
        self.ensure_poppable()?;
        let Some(top) = self.stack.pop() else {
            return Err(TransitionError::SingletonStack);
        };
        let next = self.current();

        self.exit_state(top, next);
        if let Some(next) = next {
            self.resume_state(next);
        }

        self.record(TransitionKind::Pop, Some(top), next);
        Ok(())
    }

    fn perform_back_to(&mut self, target: StateKind, data: StateData) -> Result<(), TransitionError> {
        let Some(position) = self.stack.iter().position(|&k| k == target) else {
            return Err(TransitionError::NotOnStack(target));
        };

        while self.stack.len() > position + 1 {
            self.perform_pop()?;
        }
        if let Some(entry) = self.states.get_mut(&target) {
            entry.data.extend(data);
        }
        Ok(())
    }

    fn perform_clear_to(&mut self, target: StateKind, data: StateData) -> Result<(), TransitionError> {
        self.ensure_registered(target)?;
        while let Some(kind) = self.stack.pop() {
            self.exit_state(kind, None);
        }
        self.perform_change(target, data)
    }

    // === Lifecycle calls ===

    fn enter_state(&mut self, kind: StateKind, previous: Option<StateKind>, data: StateData) {
        let request = {
            let Some(entry) = self.states.get_mut(&kind) else {
                return;
            };
            entry.data.extend(data);
            entry.active = true;
            let mut ctx = StateContext::new(kind, &self.publisher, &mut entry.data);
            entry.state.enter(previous, &mut ctx);
            ctx.into_request()
        };
        info!(state = %kind, "entered state");
        self.absorb(request);
    }

    fn exit_state(&mut self, kind: StateKind, next: Option<StateKind>) {
        let request = {
            let Some(entry) = self.states.get_mut(&kind) else {
                return;
            };
            entry.active = false;
            let mut ctx = StateContext::new(kind, &self.publisher, &mut entry.data);
            entry.state.exit(next, &mut ctx);
            ctx.into_request()
        };
        info!(state = %kind, "exited state");
        self.absorb(request);
    }

    fn resume_state(&mut self, kind: StateKind) {
        if let Some(entry) = self.states.get_mut(&kind) {
            entry.state.resume();
        }
    }

    fn record(&mut self, transition: TransitionKind, from: Option<StateKind>, to: Option<StateKind>) {
        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TransitionRecord { transition, from, to });

        info!(transition = transition.name(), ?from, ?to, "state transition");
        self.publisher.publish(
            EventKind::StateChanged,
            payload([
                ("transition", json!(transition.name())),
                ("from", kind_value(from)),
                ("to", kind_value(to)),
            ]),
            Some(SOURCE),
        );
    }

    // === Frame ===

    /// Applies at most one queued transition, then updates the current state.
    pub fn update(&mut self, dt: f64) {
        if let Some(request) = self.pending.take() {
            let operation = request.name();
            report(operation, self.apply(request));
        }

        let Some(kind) = self.current() else {
            return;
        };
        let request = {
            let Some(entry) = self.states.get_mut(&kind) else {
                return;
            };
            if !entry.active {
                return;
            }
            let mut ctx = StateContext::new(kind, &self.publisher, &mut entry.data);
            entry.state.update(dt, &mut ctx);
            ctx.into_request()
        };
        self.absorb(request);
    }

    /// Draws from the topmost non-overlay state upward.
    pub fn render(&self, surface: &mut dyn Surface) {
        let is_overlay = |kind: &StateKind| {
            self.states
                .get(kind)
                .is_some_and(|entry| entry.state.flags().overlay)
        };
        let start = self
            .stack
            .iter()
            .rposition(|kind| !is_overlay(kind))
            .unwrap_or(0);

        for kind in &self.stack[start..] {
            if let Some(entry) = self.states.get(kind) {
                if entry.active {
                    entry.state.render(&entry.data, surface);
                }
            }
        }
    }

    /// Offers input to active states from the top down.
    ///
    /// Returns `true` if a state consumed the event.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        let order: Vec<StateKind> = self.stack.iter().rev().copied().collect();
        for kind in order {
            let (consumed, blocks, request) = {
                let Some(entry) = self.states.get_mut(&kind) else {
                    continue;
                };
                if !entry.active {
                    continue;
                }
                let blocks = entry.state.flags().blocks_input;
                let mut ctx = StateContext::new(kind, &self.publisher, &mut entry.data);
                let consumed = entry.state.handle_input(event, &mut ctx);
                (consumed, blocks, ctx.into_request())
            };
            self.absorb(request);

            if consumed || blocks {
                return consumed;
            }
        }
        false
    }

    /// Exits stacked states, cleans up every state, and empties the machine.
    pub fn cleanup_all(&mut self) {
        while let Some(kind) = self.stack.pop() {
            self.exit_state(kind, None);
        }
        for (_, mut entry) in self.states.drain() {
            entry.state.cleanup();
        }
        self.pending = None;
        info!("state machine cleaned up");
    }

    // === Queries ===

    /// Get the current state kind.
    #[must_use]
    pub fn current(&self) -> Option<StateKind> {
        self.stack.last().copied()
    }

    /// Get the stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[StateKind] {
        &self.stack
    }

    /// Check if a kind is on the stack and active.
    #[must_use]
    pub fn is_state_active(&self, kind: StateKind) -> bool {
        self.stack.contains(&kind) && self.states.get(&kind).is_some_and(|entry| entry.active)
    }

    /// Get a registered state's data.
    #[must_use]
    pub fn state_data(&self, kind: StateKind) -> Option<&StateData> {
        self.states.get(&kind).map(|entry| &entry.data)
    }

    /// Iterates over applied transitions, oldest first.
    pub fn transition_history(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.history.iter()
    }
}
