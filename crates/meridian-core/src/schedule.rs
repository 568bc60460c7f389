//! Callbacks scheduled against world time.

use std::collections::VecDeque;
use std::fmt;

use meridian_common::{HandlerFault, TimerId};
use serde::Serialize;
use tracing::{debug, error};

use crate::time::GameTime;

/// Number of fired one-shot callbacks kept for inspection.
pub const COMPLETED_CAPACITY: usize = 100;

/// Zero-argument action run when a scheduled time is reached.
pub type Callback = Box<dyn FnMut() -> Result<(), HandlerFault>>;

/// A callback waiting for its world time.
pub struct ScheduledCallback {
    id: TimerId,
    name: String,
    target: GameTime,
    repeating: bool,
    repeat_interval: u64,
    /// Total minutes of the next firing; `None` once exhausted.
    next_execution: Option<u64>,
    callback: Callback,
}

impl fmt::Debug for ScheduledCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledCallback")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("target", &self.target)
            .field("repeating", &self.repeating)
            .field("repeat_interval", &self.repeat_interval)
            .field("next_execution", &self.next_execution)
            .finish_non_exhaustive()
    }
}

impl ScheduledCallback {
    /// Get the callback id.
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Get the callback name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the originally requested time.
    #[must_use]
    pub fn target(&self) -> GameTime {
        self.target
    }

    /// Check if the callback re-arms after firing.
    #[must_use]
    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    /// Total minutes of the next firing, `None` once exhausted.
    #[must_use]
    pub fn next_execution(&self) -> Option<u64> {
        self.next_execution
    }

    fn is_due(&self, now_total: u64) -> bool {
        self.next_execution.is_some_and(|next| now_total >= next)
    }

    /// Runs the callback and moves the schedule forward.
    fn fire(&mut self, now_total: u64) -> Result<(), HandlerFault> {
        let result = (self.callback)();
        self.next_execution = if self.repeating {
            Some(now_total.saturating_add(self.repeat_interval))
        } else {
            None
        };
        result
    }
}

/// Record of a one-shot callback that has fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedCallback {
    /// Callback id
    pub id: TimerId,
    /// Callback name
    pub name: String,
    /// Requested time
    pub target: GameTime,
    /// World time when it fired
    pub fired_at: GameTime,
    /// Whether the callback reported a fault
    pub faulted: bool,
}

/// Time-ordered store of pending callbacks.
#[derive(Debug)]
pub struct Scheduler {
    last_id: TimerId,
    pending: Vec<ScheduledCallback>,
    completed: VecDeque<CompletedCallback>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_id: TimerId::from_raw(0),
            pending: Vec::new(),
            completed: VecDeque::with_capacity(COMPLETED_CAPACITY),
        }
    }

    /// Schedules a callback at an absolute world time.
    ///
    /// A repeating callback with a zero interval fires once.
    pub fn schedule(
        &mut self,
        target: GameTime,
        name: impl Into<String>,
        repeating: bool,
        repeat_interval: u64,
        callback: Callback,
    ) -> TimerId {
        self.last_id = self.last_id.next();
        let id = self.last_id;
        let name = name.into();
        debug!(%id, name = %name, at = %target, repeating, "scheduled callback");

        self.pending.push(ScheduledCallback {
            id,
            name,
            target,
            repeating: repeating && repeat_interval > 0,
            repeat_interval,
            next_execution: Some(target.total_minutes()),
            callback,
        });
        id
    }

    /// Removes a pending callback. Returns `false` if it was not pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let Some(index) = self.pending.iter().position(|c| c.id == id) else {
            return false;
        };
        let cancelled = self.pending.remove(index);
        debug!(%id, name = %cancelled.name, "cancelled callback");
        true
    }

    /// Fires every callback whose time has been reached.
    ///
    /// Faults are logged; a faulting callback still counts as fired. Returns
    /// the number of callbacks run.
    pub fn run_due(&mut self, now: &GameTime) -> usize {
        let now_total = now.total_minutes();
        let mut fired = 0;
        let mut index = 0;

        while index < self.pending.len() {
            let entry = &mut self.pending[index];
            if !entry.is_due(now_total) {
                index += 1;
                continue;
            }

            fired += 1;
            let faulted = match entry.fire(now_total) {
                Ok(()) => false,
                Err(fault) => {
                    error!(id = %entry.id, name = %entry.name, %fault, "scheduled callback failed");
                    true
                },
            };

            if entry.next_execution.is_some() {
                index += 1;
                continue;
            }

            let done = self.pending.remove(index);
            if self.completed.len() >= COMPLETED_CAPACITY {
                self.completed.pop_front();
            }
            self.completed.push_back(CompletedCallback {
                id: done.id,
                name: done.name,
                target: done.target,
                fired_at: *now,
                faulted,
            });
        }

        fired
    }

    /// Iterates over pending callbacks in scheduling order.
    pub fn pending(&self) -> impl Iterator<Item = &ScheduledCallback> {
        self.pending.iter()
    }

    /// Number of pending callbacks.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Iterates over fired one-shot callbacks, oldest first.
    pub fn completed(&self) -> impl Iterator<Item = &CompletedCallback> {
        self.completed.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let inner = Rc::clone(&count);
        let callback: Callback = Box::new(move || {
            inner.set(inner.get() + 1);
            Ok(())
        });
        (count, callback)
    }

    #[test]
    fn test_one_shot_fires_once() {
        let mut scheduler = Scheduler::new();
        let start = GameTime::default();
        let (count, callback) = counter();
        let id = scheduler.schedule(start.plus_minutes(10), "bell", false, 0, callback);

        assert_eq!(scheduler.run_due(&start.plus_minutes(9)), 0);
        assert_eq!(scheduler.run_due(&start.plus_minutes(10)), 1);
        assert_eq!(scheduler.run_due(&start.plus_minutes(30)), 0);
        assert_eq!(count.get(), 1);

        assert_eq!(scheduler.pending_len(), 0);
        let done: Vec<_> = scheduler.completed().collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, id);
        assert_eq!(done[0].name, "bell");
    }

    #[test]
    fn test_repeating_rearms_from_now() {
        let mut scheduler = Scheduler::new();
        let start = GameTime::default();
        let (count, callback) = counter();
        scheduler.schedule(start, "tick", true, 15, callback);

        scheduler.run_due(&start);
        // Late by 5 minutes: next firing is measured from when it ran.
        scheduler.run_due(&start.plus_minutes(20));
        let next = scheduler.pending().next().and_then(ScheduledCallback::next_execution);
        assert_eq!(next, Some(start.plus_minutes(35).total_minutes()));
        assert_eq!(count.get(), 2);
        assert_eq!(scheduler.completed().count(), 0);
    }

    #[test]
    fn test_huge_repeat_interval_never_rearms_due() {
        let mut scheduler = Scheduler::new();
        let start = GameTime::default();
        let (count, callback) = counter();
        scheduler.schedule(start.plus_minutes(5), "distant", true, u64::MAX, callback);

        assert_eq!(scheduler.run_due(&start.plus_minutes(5)), 1);
        let next = scheduler.pending().next().and_then(ScheduledCallback::next_execution);
        assert_eq!(next, Some(u64::MAX));
        assert_eq!(scheduler.run_due(&start.plus_minutes(10_000)), 0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_zero_interval_repeat_is_one_shot() {
        let mut scheduler = Scheduler::new();
        let (count, callback) = counter();
        scheduler.schedule(GameTime::default(), "once", true, 0, callback);

        scheduler.run_due(&GameTime::default());
        scheduler.run_due(&GameTime::default().plus_minutes(1));
        assert_eq!(count.get(), 1);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn test_fault_still_counts_as_fired() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(
            GameTime::default(),
            "broken",
            false,
            0,
            Box::new(|| Err(HandlerFault::from("no bell"))),
        );
        let (count, callback) = counter();
        scheduler.schedule(GameTime::default(), "after", false, 0, callback);

        assert_eq!(scheduler.run_due(&GameTime::default()), 2);
        assert_eq!(count.get(), 1);
        let faulted: Vec<_> = scheduler.completed().map(|c| c.faulted).collect();
        assert_eq!(faulted, vec![true, false]);
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::new();
        let (count, callback) = counter();
        let id = scheduler.schedule(GameTime::default(), "cancelled", false, 0, callback);

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        scheduler.run_due(&GameTime::default());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.schedule(GameTime::default(), "a", false, 0, Box::new(|| Ok(())));
        let b = scheduler.schedule(GameTime::default(), "b", false, 0, Box::new(|| Ok(())));
        assert_ne!(a, b);
    }

    #[test]
    fn test_completed_is_bounded() {
        let mut scheduler = Scheduler::new();
        for n in 0..(COMPLETED_CAPACITY + 5) {
            scheduler.schedule(GameTime::default(), format!("job-{n}"), false, 0, Box::new(|| Ok(())));
        }
        scheduler.run_due(&GameTime::default());

        assert_eq!(scheduler.completed().count(), COMPLETED_CAPACITY);
        assert_eq!(scheduler.completed().next().map(|c| c.name.as_str()), Some("job-5"));
    }
}
