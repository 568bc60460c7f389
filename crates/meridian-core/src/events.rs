//! Event bus for inter-system communication.
//!
//! The bus routes [`Event`]s to handlers stored in generation-checked slots:
//! - Global subscribers see every event before kind subscribers do
//! - Each subscriber list is ordered by descending priority, ties keep
//!   registration order
//! - A handler can consume an event, which stops all later handlers
//! - Queued events wait in a FIFO channel until [`EventBus::drain`]
//! - Dispatched events are kept in a bounded history

use std::cmp::Reverse;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use ahash::AHashMap;
use crossbeam_channel::{unbounded, Receiver, Sender};
use meridian_common::{HandlerFault, HandlerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

/// Open key/value payload carried by an event.
pub type Payload = Map<String, Value>;

/// Default number of dispatched events kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Builds a payload from a fixed list of entries.
#[must_use]
pub fn payload<const N: usize>(entries: [(&str, Value); N]) -> Payload {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

/// Event kinds that can be sent through the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Player gained a level
    PlayerLevelUp,
    /// Player died
    PlayerDied,
    /// Player moved
    PlayerMoved,
    /// Player health changed
    PlayerHealthChanged,
    /// Player mana changed
    PlayerManaChanged,
    /// Combat started
    CombatStarted,
    /// Combat ended
    CombatEnded,
    /// An attack was performed
    AttackPerformed,
    /// Damage was dealt
    DamageDealt,
    /// A skill was used
    SkillUsed,
    /// A status effect was applied
    StatusEffectApplied,
    /// A status effect was removed
    StatusEffectRemoved,
    /// Quest started
    QuestStarted,
    /// Quest completed
    QuestCompleted,
    /// Quest failed
    QuestFailed,
    /// Quest objective progressed
    QuestObjectiveUpdated,
    /// Time-of-day bucket changed (sunrise, sunset, midnight)
    DayNightChanged,
    /// Weather changed
    WeatherChanged,
    /// A location was entered
    LocationEntered,
    /// A location was left
    LocationExited,
    /// Interaction with an NPC
    NpcInteraction,
    /// Item acquired
    ItemAcquired,
    /// Item used
    ItemUsed,
    /// Item equipped
    ItemEquipped,
    /// Item unequipped
    ItemUnequipped,
    /// Item sold
    ItemSold,
    /// Item crafted
    ItemCrafted,
    /// Menu opened
    MenuOpened,
    /// Menu closed
    MenuClosed,
    /// Dialogue started
    DialogueStarted,
    /// Dialogue ended
    DialogueEnded,
    /// Game paused
    GamePaused,
    /// Game resumed
    GameResumed,
    /// Save requested
    SaveGame,
    /// Load requested
    LoadGame,
    /// Settings changed
    SettingsChanged,
    /// Simulated time advanced by a batch of minutes
    TimeAdvanced,
    /// Season changed
    SeasonChanged,
    /// The state stack changed
    StateChanged,
}

impl EventKind {
    /// Returns every event kind.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::PlayerLevelUp,
            Self::PlayerDied,
            Self::PlayerMoved,
            Self::PlayerHealthChanged,
            Self::PlayerManaChanged,
            Self::CombatStarted,
            Self::CombatEnded,
            Self::AttackPerformed,
            Self::DamageDealt,
            Self::SkillUsed,
            Self::StatusEffectApplied,
            Self::StatusEffectRemoved,
            Self::QuestStarted,
            Self::QuestCompleted,
            Self::QuestFailed,
            Self::QuestObjectiveUpdated,
            Self::DayNightChanged,
            Self::WeatherChanged,
            Self::LocationEntered,
            Self::LocationExited,
            Self::NpcInteraction,
            Self::ItemAcquired,
            Self::ItemUsed,
            Self::ItemEquipped,
            Self::ItemUnequipped,
            Self::ItemSold,
            Self::ItemCrafted,
            Self::MenuOpened,
            Self::MenuClosed,
            Self::DialogueStarted,
            Self::DialogueEnded,
            Self::GamePaused,
            Self::GameResumed,
            Self::SaveGame,
            Self::LoadGame,
            Self::SettingsChanged,
            Self::TimeAdvanced,
            Self::SeasonChanged,
            Self::StateChanged,
        ]
    }

    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PlayerLevelUp => "player_level_up",
            Self::PlayerDied => "player_died",
            Self::PlayerMoved => "player_moved",
            Self::PlayerHealthChanged => "player_health_changed",
            Self::PlayerManaChanged => "player_mana_changed",
            Self::CombatStarted => "combat_started",
            Self::CombatEnded => "combat_ended",
            Self::AttackPerformed => "attack_performed",
            Self::DamageDealt => "damage_dealt",
            Self::SkillUsed => "skill_used",
            Self::StatusEffectApplied => "status_effect_applied",
            Self::StatusEffectRemoved => "status_effect_removed",
            Self::QuestStarted => "quest_started",
            Self::QuestCompleted => "quest_completed",
            Self::QuestFailed => "quest_failed",
            Self::QuestObjectiveUpdated => "quest_objective_updated",
            Self::DayNightChanged => "day_night_changed",
            Self::WeatherChanged => "weather_changed",
            Self::LocationEntered => "location_entered",
            Self::LocationExited => "location_exited",
            Self::NpcInteraction => "npc_interaction",
            Self::ItemAcquired => "item_acquired",
            Self::ItemUsed => "item_used",
            Self::ItemEquipped => "item_equipped",
            Self::ItemUnequipped => "item_unequipped",
            Self::ItemSold => "item_sold",
            Self::ItemCrafted => "item_crafted",
            Self::MenuOpened => "menu_opened",
            Self::MenuClosed => "menu_closed",
            Self::DialogueStarted => "dialogue_started",
            Self::DialogueEnded => "dialogue_ended",
            Self::GamePaused => "game_paused",
            Self::GameResumed => "game_resumed",
            Self::SaveGame => "save_game",
            Self::LoadGame => "load_game",
            Self::SettingsChanged => "settings_changed",
            Self::TimeAdvanced => "time_advanced",
            Self::SeasonChanged => "season_changed",
            Self::StateChanged => "state_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable message routed by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    kind: EventKind,
    payload: Payload,
    /// Seconds since the bus was created.
    timestamp: f64,
    source: Option<String>,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub fn new(kind: EventKind, payload: Payload, timestamp: f64, source: Option<String>) -> Self {
        Self {
            kind,
            payload,
            timestamp,
            source,
        }
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns a single payload entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Returns the monotonic timestamp in seconds.
    #[must_use]
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Returns the producer name, if one was given.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// Whether dispatch continues after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Later handlers receive the event.
    #[default]
    Continue,
    /// No later handler receives the event.
    Consumed,
}

impl From<bool> for Propagation {
    fn from(consumed: bool) -> Self {
        if consumed {
            Self::Consumed
        } else {
            Self::Continue
        }
    }
}

/// Result returned by event handlers.
pub type HandlerResult = Result<Propagation, HandlerFault>;

/// Receives events from the bus.
///
/// Handlers get mutable access to the bus so they can publish, subscribe, or
/// unsubscribe while handling. A handler that is already running is skipped by
/// nested immediate dispatches.
pub trait EventHandler {
    /// Handles an event.
    fn handle_event(&mut self, event: &Event, bus: &mut EventBus) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: FnMut(&Event, &mut EventBus) -> HandlerResult,
{
    fn handle_event(&mut self, event: &Event, bus: &mut EventBus) -> HandlerResult {
        self(event, bus)
    }
}

/// Cloneable handle that queues events on a bus.
///
/// This is the deferred, order-preserving entry point of the bus and the only
/// part of it that may be sent to other threads.
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: Sender<Event>,
    epoch: Instant,
}

impl Publisher {
    /// Queues an event for the next drain.
    pub fn publish(&self, kind: EventKind, payload: Payload, source: Option<&str>) {
        let event = Event::new(
            kind,
            payload,
            self.epoch.elapsed().as_secs_f64(),
            source.map(str::to_owned),
        );
        if self.sender.send(event).is_err() {
            debug!(%kind, "event bus dropped, event discarded");
        }
    }
}

enum SlotState {
    Vacant,
    Occupied(Box<dyn EventHandler>),
    /// Handler is taken out of its slot while it runs.
    Running,
}

struct HandlerSlot {
    generation: u32,
    enabled: bool,
    state: SlotState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Subscription {
    handler: HandlerId,
    priority: i32,
}

fn insert_sorted(list: &mut Vec<Subscription>, subscription: Subscription) {
    list.push(subscription);
    list.sort_by_key(|s| Reverse(s.priority));
}

/// Event bus for routing events to subscribed handlers.
pub struct EventBus {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    epoch: Instant,
    slots: Vec<HandlerSlot>,
    free_slots: Vec<u32>,
    subscribers: AHashMap<EventKind, Vec<Subscription>>,
    global: Vec<Subscription>,
    history: VecDeque<Event>,
    history_capacity: usize,
    draining: bool,
    /// Nesting depth of running dispatches.
    dispatch_depth: usize,
    saw_stale: bool,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.receiver.len())
            .field("handlers", &self.handler_count())
            .field("global_subscribers", &self.global.len())
            .field("history", &self.history.len())
            .field("history_capacity", &self.history_capacity)
            .field("draining", &self.draining)
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a new event bus with the default history capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates a new event bus keeping at most `capacity` dispatched events.
    #[must_use]
    pub fn with_history_capacity(capacity: usize) -> Self {
        let (sender, receiver) = unbounded();
        let capacity = capacity.max(1);
        Self {
            sender,
            receiver,
            epoch: Instant::now(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            subscribers: AHashMap::new(),
            global: Vec::new(),
            history: VecDeque::with_capacity(capacity),
            history_capacity: capacity,
            draining: false,
            dispatch_depth: 0,
            saw_stale: false,
        }
    }

    /// Creates a new publisher handle for queueing events.
    #[must_use]
    pub fn publisher(&self) -> Publisher {
        Publisher {
            sender: self.sender.clone(),
            epoch: self.epoch,
        }
    }

    // === Handler registry ===

    /// Stores a handler and returns its liveness-checked id.
    ///
    /// The handler receives nothing until it is subscribed.
    pub fn add_handler<H: EventHandler + 'static>(&mut self, handler: H) -> HandlerId {
        let boxed: Box<dyn EventHandler> = Box::new(handler);
        if let Some(index) = self.free_slots.pop() {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.enabled = true;
                slot.state = SlotState::Occupied(boxed);
                return HandlerId::from_parts(index, slot.generation);
            }
        }

        let index = self.slots.len() as u32;
        self.slots.push(HandlerSlot {
            generation: 0,
            enabled: true,
            state: SlotState::Occupied(boxed),
        });
        HandlerId::from_parts(index, 0)
    }

    /// Stores a closure handler and returns its id.
    pub fn add_fn<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Event, &mut EventBus) -> HandlerResult + 'static,
    {
        self.add_handler(handler)
    }

    /// Drops a handler. Its subscriptions become inert and are purged lazily.
    ///
    /// Returns `false` if the id was already stale.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let Some(slot) = self.live_slot_mut(id) else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        slot.state = SlotState::Vacant;
        self.free_slots.push(id.index());
        self.saw_stale = true;
        debug!(handler = %id, "removed event handler");
        true
    }

    /// Checks whether the id still refers to a stored handler.
    #[must_use]
    pub fn is_alive(&self, id: HandlerId) -> bool {
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.generation == id.generation() && !matches!(slot.state, SlotState::Vacant))
    }

    /// Enables or disables every subscription of a handler.
    ///
    /// Returns `false` if the id is stale.
    pub fn set_handler_enabled(&mut self, id: HandlerId, enabled: bool) -> bool {
        match self.live_slot_mut(id) {
            Some(slot) => {
                slot.enabled = enabled;
                true
            },
            None => false,
        }
    }

    /// Returns the number of stored handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !matches!(slot.state, SlotState::Vacant))
            .count()
    }

    fn live_slot_mut(&mut self, id: HandlerId) -> Option<&mut HandlerSlot> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation() && !matches!(slot.state, SlotState::Vacant))
    }

    // === Subscriptions ===

    /// Subscribes a handler to one event kind.
    ///
    /// Subscribing the same handler twice delivers each event to it twice.
    pub fn subscribe(&mut self, kind: EventKind, id: HandlerId, priority: i32) {
        if !self.is_alive(id) {
            warn!(%kind, handler = %id, "ignoring subscription for a removed handler");
            return;
        }
        let list = self.subscribers.entry(kind).or_default();
        insert_sorted(
            list,
            Subscription {
                handler: id,
                priority,
            },
        );
        debug!(%kind, handler = %id, priority, "subscribed");
    }

    /// Subscribes a handler to every event.
    pub fn subscribe_global(&mut self, id: HandlerId, priority: i32) {
        if !self.is_alive(id) {
            warn!(handler = %id, "ignoring global subscription for a removed handler");
            return;
        }
        insert_sorted(
            &mut self.global,
            Subscription {
                handler: id,
                priority,
            },
        );
        debug!(handler = %id, priority, "subscribed globally");
    }

    /// Removes every subscription of a handler to one kind.
    pub fn unsubscribe(&mut self, kind: EventKind, id: HandlerId) {
        if let Some(list) = self.subscribers.get_mut(&kind) {
            list.retain(|s| s.handler != id);
            if list.is_empty() {
                self.subscribers.remove(&kind);
            }
        }
    }

    /// Removes every global subscription of a handler.
    pub fn unsubscribe_global(&mut self, id: HandlerId) {
        self.global.retain(|s| s.handler != id);
    }

    /// Returns the number of live subscriptions for a kind.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, |list| {
            list.iter().filter(|s| self.is_subscribed_live(s.handler)).count()
        })
    }

    /// Returns the number of live global subscriptions.
    #[must_use]
    pub fn global_subscriber_count(&self) -> usize {
        self.global
            .iter()
            .filter(|s| self.is_subscribed_live(s.handler))
            .count()
    }

    fn is_subscribed_live(&self, id: HandlerId) -> bool {
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.generation == id.generation())
    }

    // === Publishing ===

    /// Queues an event for the next drain. Never blocks.
    pub fn publish(&self, kind: EventKind, payload: Payload, source: Option<&str>) {
        let event = self.stamp(kind, payload, source);
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.sender.send(event);
    }

    /// Dispatches an event before returning.
    pub fn publish_immediate(&mut self, kind: EventKind, payload: Payload, source: Option<&str>) {
        let event = self.stamp(kind, payload, source);
        self.dispatch(event);
    }

    fn stamp(&self, kind: EventKind, payload: Payload, source: Option<&str>) -> Event {
        Event::new(
            kind,
            payload,
            self.epoch.elapsed().as_secs_f64(),
            source.map(str::to_owned),
        )
    }

    /// Dispatches every event that was pending when the drain began.
    ///
    /// Events queued by handlers during the drain wait for the next call. A
    /// drain requested while one is running does nothing. Returns the number
    /// of events dispatched.
    pub fn drain(&mut self) -> usize {
        if self.draining {
            debug!("drain requested while draining, ignored");
            return 0;
        }

        self.draining = true;
        let pending = self.receiver.len();
        let mut processed = 0;
        for _ in 0..pending {
            let Ok(event) = self.receiver.try_recv() else {
                break;
            };
            self.dispatch(event);
            processed += 1;
        }
        self.draining = false;

        processed
    }

    /// Discards every queued event. Returns how many were dropped.
    pub fn clear_queue(&mut self) -> usize {
        let mut dropped = 0;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "cleared event queue");
        }
        dropped
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Checks whether a drain is in progress.
    #[must_use]
    pub const fn is_draining(&self) -> bool {
        self.draining
    }

    // === History ===

    /// Returns the most recent `limit` dispatched events, oldest first,
    /// optionally restricted to one kind.
    #[must_use]
    pub fn history(&self, kind: Option<EventKind>, limit: usize) -> Vec<&Event> {
        let mut recent: Vec<&Event> = self
            .history
            .iter()
            .rev()
            .filter(|event| kind.map_or(true, |k| event.kind() == k))
            .take(limit)
            .collect();
        recent.reverse();
        recent
    }

    /// Returns the number of events in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Returns the history capacity.
    #[must_use]
    pub const fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    // === Dispatch ===

    fn record(&mut self, event: Event) {
        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    fn dispatch(&mut self, event: Event) {
        self.record(event.clone());
        self.dispatch_depth += 1;

        // Snapshots: handlers may change subscriptions while running.
        let globals = self.global.clone();
        let mut consumed = false;
        for subscription in &globals {
            if self.invoke(*subscription, &event) == Some(Propagation::Consumed) {
                consumed = true;
                break;
            }
        }

        if !consumed {
            if let Some(list) = self.subscribers.get(&event.kind()).cloned() {
                for subscription in &list {
                    if self.invoke(*subscription, &event) == Some(Propagation::Consumed) {
                        break;
                    }
                }
            }
        }

        // Stale entries are only purged by the outermost dispatch
        self.dispatch_depth -= 1;
        if self.saw_stale && self.dispatch_depth == 0 {
            self.purge_stale();
        }
    }

    fn invoke(&mut self, subscription: Subscription, event: &Event) -> Option<Propagation> {
        let id = subscription.handler;
        let index = id.index() as usize;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != id.generation() {
            self.saw_stale = true;
            return None;
        }
        if !slot.enabled {
            return None;
        }

        let mut handler = match std::mem::replace(&mut slot.state, SlotState::Running) {
            SlotState::Occupied(handler) => handler,
            other => {
                slot.state = other;
                return None;
            },
        };

        let result = handler.handle_event(event, self);

        // The handler may have removed itself; drop it in that case.
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.generation == id.generation() && matches!(slot.state, SlotState::Running) {
                slot.state = SlotState::Occupied(handler);
            }
        }

        match result {
            Ok(propagation) => Some(propagation),
            Err(fault) => {
                error!(kind = %event.kind(), handler = %id, %fault, "event handler failed");
                None
            },
        }
    }

    fn purge_stale(&mut self) {
        let slots = &self.slots;
        let live = |s: &Subscription| {
            slots
                .get(s.handler.index() as usize)
                .is_some_and(|slot| slot.generation == s.handler.generation())
        };
        self.global.retain(live);
        self.subscribers.retain(|_, list| {
            list.retain(live);
            !list.is_empty()
        });
        self.saw_stale = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn recorder(
        log: &Log,
        name: &'static str,
        outcome: Propagation,
    ) -> impl FnMut(&Event, &mut EventBus) -> HandlerResult {
        let log = Rc::clone(log);
        move |_event: &Event, _bus: &mut EventBus| {
            log.borrow_mut().push(name);
            Ok(outcome)
        }
    }

    #[test]
    fn test_priority_order_is_stable_descending() {
        let mut bus = EventBus::new();
        let log = Log::default();

        for (name, priority) in [("a5", 5), ("b1", 1), ("c5", 5), ("d-3", -3)] {
            let id = bus.add_fn(recorder(&log, name, Propagation::Continue));
            bus.subscribe(EventKind::ItemUsed, id, priority);
        }

        bus.publish_immediate(EventKind::ItemUsed, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["a5", "c5", "b1", "d-3"]);
    }

    #[test]
    fn test_global_handlers_run_before_kind_handlers() {
        let mut bus = EventBus::new();
        let log = Log::default();

        let specific = bus.add_fn(recorder(&log, "specific", Propagation::Continue));
        bus.subscribe(EventKind::QuestStarted, specific, 100);
        let global = bus.add_fn(recorder(&log, "global", Propagation::Continue));
        bus.subscribe_global(global, -100);

        bus.publish_immediate(EventKind::QuestStarted, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["global", "specific"]);
    }

    #[test]
    fn test_consuming_global_handler_stops_kind_handlers() {
        let mut bus = EventBus::new();
        let log = Log::default();

        let first = bus.add_fn(recorder(&log, "global-consumer", Propagation::Consumed));
        bus.subscribe_global(first, 10);
        let second = bus.add_fn(recorder(&log, "global-late", Propagation::Continue));
        bus.subscribe_global(second, 0);
        let specific = bus.add_fn(recorder(&log, "specific", Propagation::Continue));
        bus.subscribe(EventKind::CombatStarted, specific, 0);

        bus.publish_immediate(EventKind::CombatStarted, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["global-consumer"]);
    }

    #[test]
    fn test_consuming_kind_handler_stops_lower_priorities() {
        let mut bus = EventBus::new();
        let log = Log::default();

        let high = bus.add_fn(recorder(&log, "high", Propagation::Consumed));
        let low = bus.add_fn(recorder(&log, "low", Propagation::Continue));
        bus.subscribe(EventKind::DamageDealt, low, 0);
        bus.subscribe(EventKind::DamageDealt, high, 1);

        bus.publish_immediate(EventKind::DamageDealt, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["high"]);
    }

    #[test]
    fn test_publish_is_queued_until_drain() {
        let mut bus = EventBus::new();
        let log = Log::default();
        let id = bus.add_fn(recorder(&log, "seen", Propagation::Continue));
        bus.subscribe(EventKind::ItemSold, id, 0);

        bus.publish(EventKind::ItemSold, Payload::new(), Some("shop"));
        assert!(log.borrow().is_empty());
        assert_eq!(bus.pending_count(), 1);

        assert_eq!(bus.drain(), 1);
        assert_eq!(*log.borrow(), vec!["seen"]);
        assert_eq!(bus.pending_count(), 0);
        assert_eq!(bus.history(None, 10)[0].source(), Some("shop"));
    }

    #[test]
    fn test_drain_preserves_fifo_order() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = bus.add_fn(move |event: &Event, _bus: &mut EventBus| {
            sink.borrow_mut().push(event.get("seq").cloned());
            Ok(Propagation::Continue)
        });
        bus.subscribe_global(id, 0);

        for seq in 0..5 {
            bus.publish(EventKind::PlayerMoved, payload([("seq", json!(seq))]), None);
        }
        bus.drain();

        let expected: Vec<_> = (0..5).map(|seq| Some(json!(seq))).collect();
        assert_eq!(*seen.borrow(), expected);
    }

    #[test]
    fn test_drain_inside_handler_is_noop() {
        let mut bus = EventBus::new();
        let log = Log::default();
        let inner_drained = Rc::new(RefCell::new(None));

        let chained = Rc::clone(&inner_drained);
        let chain = bus.add_fn(move |_event: &Event, bus: &mut EventBus| {
            bus.publish(EventKind::QuestCompleted, Payload::new(), None);
            *chained.borrow_mut() = Some(bus.drain());
            Ok(Propagation::Continue)
        });
        bus.subscribe(EventKind::QuestObjectiveUpdated, chain, 0);
        let follow_up = bus.add_fn(recorder(&log, "completed", Propagation::Continue));
        bus.subscribe(EventKind::QuestCompleted, follow_up, 0);

        bus.publish(EventKind::QuestObjectiveUpdated, Payload::new(), None);
        assert_eq!(bus.drain(), 1);
        assert_eq!(*inner_drained.borrow(), Some(0));
        assert!(log.borrow().is_empty());
        assert_eq!(bus.pending_count(), 1);

        assert_eq!(bus.drain(), 1);
        assert_eq!(*log.borrow(), vec!["completed"]);
    }

    #[test]
    fn test_handler_fault_does_not_abort_dispatch() {
        let mut bus = EventBus::new();
        let log = Log::default();

        let failing = bus.add_fn(|_event: &Event, _bus: &mut EventBus| Err(HandlerFault::from("boom")));
        bus.subscribe(EventKind::SkillUsed, failing, 10);
        let healthy = bus.add_fn(recorder(&log, "healthy", Propagation::Continue));
        bus.subscribe(EventKind::SkillUsed, healthy, 0);

        bus.publish_immediate(EventKind::SkillUsed, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["healthy"]);
    }

    #[test]
    fn test_duplicate_subscription_dispatches_twice() {
        let mut bus = EventBus::new();
        let log = Log::default();
        let id = bus.add_fn(recorder(&log, "dup", Propagation::Continue));
        bus.subscribe(EventKind::MenuOpened, id, 0);
        bus.subscribe(EventKind::MenuOpened, id, 0);

        bus.publish_immediate(EventKind::MenuOpened, Payload::new(), None);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(bus.subscriber_count(EventKind::MenuOpened), 2);

        bus.unsubscribe(EventKind::MenuOpened, id);
        assert_eq!(bus.subscriber_count(EventKind::MenuOpened), 0);
    }

    #[test]
    fn test_duplicate_global_subscription_dispatches_twice() {
        let mut bus = EventBus::new();
        let log = Log::default();
        let id = bus.add_fn(recorder(&log, "watcher", Propagation::Continue));
        bus.subscribe_global(id, 0);
        bus.subscribe_global(id, 0);

        bus.publish_immediate(EventKind::LocationEntered, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["watcher", "watcher"]);
        assert_eq!(bus.global_subscriber_count(), 2);

        bus.unsubscribe_global(id);
        bus.publish_immediate(EventKind::LocationEntered, Payload::new(), None);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_unsubscribe_drops_empty_kind_entry() {
        let mut bus = EventBus::new();
        let first = bus.add_fn(|_event: &Event, _bus: &mut EventBus| Ok(Propagation::Continue));
        let second = bus.add_fn(|_event: &Event, _bus: &mut EventBus| Ok(Propagation::Continue));
        bus.subscribe(EventKind::QuestStarted, first, 0);
        bus.subscribe(EventKind::QuestStarted, second, 0);

        bus.unsubscribe(EventKind::QuestStarted, first);
        assert!(bus.subscribers.contains_key(&EventKind::QuestStarted));
        bus.unsubscribe(EventKind::QuestStarted, second);
        assert!(!bus.subscribers.contains_key(&EventKind::QuestStarted));
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let mut bus = EventBus::new();
        let id = bus.add_fn(|_event: &Event, _bus: &mut EventBus| Ok(Propagation::Continue));
        bus.unsubscribe(EventKind::LoadGame, id);
        bus.unsubscribe_global(id);
        assert_eq!(bus.subscriber_count(EventKind::LoadGame), 0);
        assert_eq!(bus.global_subscriber_count(), 0);
    }

    #[test]
    fn test_removed_handler_becomes_inert_and_is_purged() {
        let mut bus = EventBus::new();
        let log = Log::default();
        let id = bus.add_fn(recorder(&log, "gone", Propagation::Continue));
        bus.subscribe(EventKind::PlayerDied, id, 0);
        bus.subscribe_global(id, 0);

        assert!(bus.remove_handler(id));
        assert!(!bus.is_alive(id));
        assert!(!bus.remove_handler(id));
        assert_eq!(bus.subscriber_count(EventKind::PlayerDied), 0);

        // Reusing the slot must not revive the old subscriptions.
        let replacement = bus.add_fn(recorder(&log, "new", Propagation::Continue));
        assert_eq!(replacement.index(), id.index());
        assert_ne!(replacement, id);

        bus.publish_immediate(EventKind::PlayerDied, Payload::new(), None);
        assert!(log.borrow().is_empty());
        assert_eq!(bus.global_subscriber_count(), 0);
        assert!(!bus.subscribers.contains_key(&EventKind::PlayerDied));
        assert_eq!(bus.dispatch_depth, 0);
    }

    #[test]
    fn test_disabled_handler_is_skipped() {
        let mut bus = EventBus::new();
        let log = Log::default();
        let id = bus.add_fn(recorder(&log, "toggled", Propagation::Consumed));
        bus.subscribe(EventKind::ItemEquipped, id, 5);
        let other = bus.add_fn(recorder(&log, "other", Propagation::Continue));
        bus.subscribe(EventKind::ItemEquipped, other, 0);

        assert!(bus.set_handler_enabled(id, false));
        bus.publish_immediate(EventKind::ItemEquipped, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["other"]);

        bus.set_handler_enabled(id, true);
        bus.publish_immediate(EventKind::ItemEquipped, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["other", "toggled"]);
    }

    #[test]
    fn test_handler_can_remove_itself() {
        let mut bus = EventBus::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let own_id = Rc::new(RefCell::new(None::<HandlerId>));
        let own = Rc::clone(&own_id);

        let id = bus.add_fn(move |_event: &Event, bus: &mut EventBus| {
            *counter.borrow_mut() += 1;
            if let Some(id) = *own.borrow() {
                bus.remove_handler(id);
            }
            Ok(Propagation::Continue)
        });
        *own_id.borrow_mut() = Some(id);
        bus.subscribe(EventKind::DialogueEnded, id, 0);

        bus.publish_immediate(EventKind::DialogueEnded, Payload::new(), None);
        bus.publish_immediate(EventKind::DialogueEnded, Payload::new(), None);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(bus.handler_count(), 0);
        assert_eq!(bus.subscriber_count(EventKind::DialogueEnded), 0);
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let mut bus = EventBus::new();
        for seq in 0..1001 {
            bus.publish_immediate(EventKind::PlayerMoved, payload([("seq", json!(seq))]), None);
        }

        assert_eq!(bus.history_len(), 1000);
        let history = bus.history(None, usize::MAX);
        assert_eq!(history.first().and_then(|e| e.get("seq")), Some(&json!(1)));
        assert_eq!(history.last().and_then(|e| e.get("seq")), Some(&json!(1000)));
    }

    #[test]
    fn test_history_filter_and_limit() {
        let mut bus = EventBus::with_history_capacity(16);
        bus.publish_immediate(EventKind::ItemAcquired, payload([("n", json!(1))]), None);
        bus.publish_immediate(EventKind::ItemSold, Payload::new(), None);
        bus.publish_immediate(EventKind::ItemAcquired, payload([("n", json!(2))]), None);
        bus.publish_immediate(EventKind::ItemAcquired, payload([("n", json!(3))]), None);

        let acquired = bus.history(Some(EventKind::ItemAcquired), 2);
        let numbers: Vec<_> = acquired.iter().filter_map(|e| e.get("n")).collect();
        assert_eq!(numbers, vec![&json!(2), &json!(3)]);
        assert_eq!(bus.history(None, 100).len(), 4);
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let mut bus = EventBus::new();
        bus.publish_immediate(EventKind::GamePaused, Payload::new(), None);
        bus.publish_immediate(EventKind::GameResumed, Payload::new(), None);
        let history = bus.history(None, 2);
        assert!(history[0].timestamp() <= history[1].timestamp());
    }

    #[test]
    fn test_publisher_from_another_thread() {
        let mut bus = EventBus::new();
        let log = Log::default();
        let id = bus.add_fn(recorder(&log, "remote", Propagation::Continue));
        bus.subscribe(EventKind::NpcInteraction, id, 0);

        let publisher = bus.publisher();
        std::thread::spawn(move || {
            publisher.publish(EventKind::NpcInteraction, Payload::new(), Some("worker"));
        })
        .join()
        .expect("publisher thread panicked");

        assert_eq!(bus.pending_count(), 1);
        bus.drain();
        assert_eq!(*log.borrow(), vec!["remote"]);
    }

    #[test]
    fn test_clear_queue_discards_pending() {
        let mut bus = EventBus::new();
        bus.publish(EventKind::SaveGame, Payload::new(), None);
        bus.publish(EventKind::LoadGame, Payload::new(), None);
        assert_eq!(bus.clear_queue(), 2);
        assert_eq!(bus.drain(), 0);
        assert_eq!(bus.history_len(), 0);
    }

    #[test]
    fn test_immediate_publish_from_handler_dispatches_nested() {
        let mut bus = EventBus::new();
        let log = Log::default();

        let relay = bus.add_fn(|_event: &Event, bus: &mut EventBus| {
            bus.publish_immediate(EventKind::CombatEnded, Payload::new(), Some("relay"));
            Ok(Propagation::Continue)
        });
        bus.subscribe(EventKind::PlayerDied, relay, 0);
        let ended = bus.add_fn(recorder(&log, "ended", Propagation::Continue));
        bus.subscribe(EventKind::CombatEnded, ended, 0);

        bus.publish_immediate(EventKind::PlayerDied, Payload::new(), None);
        assert_eq!(*log.borrow(), vec!["ended"]);
        assert_eq!(bus.history_len(), 2);
        assert_eq!(bus.dispatch_depth, 0);
    }

    #[test]
    fn test_event_kind_names_are_unique() {
        let mut names: Vec<_> = EventKind::all().iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventKind::all().len());
    }

    proptest! {
        #[test]
        fn prop_dispatch_order_matches_stable_sort(priorities in proptest::collection::vec(-10i32..10, 1..24)) {
            let mut bus = EventBus::new();
            let order = Rc::new(RefCell::new(Vec::new()));

            for (position, priority) in priorities.iter().copied().enumerate() {
                let sink = Rc::clone(&order);
                let id = bus.add_fn(move |_event: &Event, _bus: &mut EventBus| {
                    sink.borrow_mut().push(position);
                    Ok(Propagation::Continue)
                });
                bus.subscribe(EventKind::TimeAdvanced, id, priority);
            }
            bus.publish_immediate(EventKind::TimeAdvanced, Payload::new(), None);

            let mut expected: Vec<usize> = (0..priorities.len()).collect();
            expected.sort_by_key(|&i| Reverse(priorities[i]));
            prop_assert_eq!(order.borrow().clone(), expected);
        }
    }
}
