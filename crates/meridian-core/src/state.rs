//! Game state trait and the context states use to talk to the machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::{EventKind, Payload, Publisher};
use crate::input::InputEvent;
use crate::surface::Surface;

/// Per-state key/value data kept by the state machine.
pub type StateData = Map<String, Value>;

/// Every state the game can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// Splash screen
    SplashScreen,
    /// Main menu
    MainMenu,
    /// Character creation
    CharacterCreation,
    /// Loading screen
    Loading,
    /// In-world gameplay
    Gameplay,
    /// Combat encounter
    Combat,
    /// Dialogue with an NPC
    Dialogue,
    /// Inventory screen
    Inventory,
    /// Character sheet
    CharacterSheet,
    /// Quest log
    QuestLog,
    /// World map
    WorldMap,
    /// Shop
    Shop,
    /// Crafting
    Crafting,
    /// Settings
    Settings,
    /// Pause menu
    PauseMenu,
    /// Save/load screen
    SaveLoad,
    /// Game over screen
    GameOver,
    /// Credits
    Credits,
}

impl StateKind {
    /// Get all state kinds.
    #[must_use]
    pub const fn all() -> [Self; 18] {
        [
            Self::SplashScreen,
            Self::MainMenu,
            Self::CharacterCreation,
            Self::Loading,
            Self::Gameplay,
            Self::Combat,
            Self::Dialogue,
            Self::Inventory,
            Self::CharacterSheet,
            Self::QuestLog,
            Self::WorldMap,
            Self::Shop,
            Self::Crafting,
            Self::Settings,
            Self::PauseMenu,
            Self::SaveLoad,
            Self::GameOver,
            Self::Credits,
        ]
    }

    /// Lowercase name used in payloads and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SplashScreen => "splash_screen",
            Self::MainMenu => "main_menu",
            Self::CharacterCreation => "character_creation",
            Self::Loading => "loading",
            Self::Gameplay => "gameplay",
            Self::Combat => "combat",
            Self::Dialogue => "dialogue",
            Self::Inventory => "inventory",
            Self::CharacterSheet => "character_sheet",
            Self::QuestLog => "quest_log",
            Self::WorldMap => "world_map",
            Self::Shop => "shop",
            Self::Crafting => "crafting",
            Self::Settings => "settings",
            Self::PauseMenu => "pause_menu",
            Self::SaveLoad => "save_load",
            Self::GameOver => "game_over",
            Self::Credits => "credits",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static behaviour flags of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateFlags {
    /// Receives `pause` when another state is pushed over it.
    pub can_pause: bool,
    /// Stops input from reaching states below it.
    pub blocks_input: bool,
    /// Renders over the state below instead of replacing it.
    pub overlay: bool,
}

impl Default for StateFlags {
    fn default() -> Self {
        Self {
            can_pause: true,
            blocks_input: false,
            overlay: false,
        }
    }
}

impl StateFlags {
    /// Flags for an overlay that swallows input, such as a pause menu.
    #[must_use]
    pub const fn modal_overlay() -> Self {
        Self {
            can_pause: true,
            blocks_input: true,
            overlay: true,
        }
    }
}

/// A transition waiting in the machine's pending slot.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionRequest {
    /// Replace the whole stack with `target`.
    Change {
        /// State to enter
        target: StateKind,
        /// Data merged into the target
        data: StateData,
    },
    /// Push `target` over the current state.
    Push {
        /// State to enter
        target: StateKind,
        /// Data merged into the target
        data: StateData,
    },
    /// Pop the current state.
    Pop,
}

impl TransitionRequest {
    /// Returns the target state, if any.
    #[must_use]
    pub fn target(&self) -> Option<StateKind> {
        match self {
            Self::Change { target, .. } | Self::Push { target, .. } => Some(*target),
            Self::Pop => None,
        }
    }

    /// Short name of the transition.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Change { .. } => "change",
            Self::Push { .. } => "push",
            Self::Pop => "pop",
        }
    }
}

/// Access handed to a state while the machine calls into it.
///
/// Transition requests made here are queued and applied on a later frame;
/// the last request wins.
pub struct StateContext<'a> {
    kind: StateKind,
    publisher: &'a Publisher,
    data: &'a mut StateData,
    request: Option<TransitionRequest>,
}

impl<'a> StateContext<'a> {
    pub(crate) fn new(kind: StateKind, publisher: &'a Publisher, data: &'a mut StateData) -> Self {
        Self {
            kind,
            publisher,
            data,
            request: None,
        }
    }

    pub(crate) fn into_request(self) -> Option<TransitionRequest> {
        self.request
    }

    /// Kind of the state being called.
    #[must_use]
    pub fn kind(&self) -> StateKind {
        self.kind
    }

    /// This state's data.
    #[must_use]
    pub fn data(&self) -> &StateData {
        self.data
    }

    /// This state's data, mutably.
    pub fn data_mut(&mut self) -> &mut StateData {
        self.data
    }

    /// Queues an event with this state as its source.
    pub fn publish(&self, kind: EventKind, payload: Payload) {
        self.publisher.publish(kind, payload, Some(self.kind.name()));
    }

    /// Requests replacing the stack with `target`.
    pub fn change_state(&mut self, target: StateKind, data: StateData) {
        self.request = Some(TransitionRequest::Change { target, data });
    }

    /// Requests pushing `target`.
    pub fn push_state(&mut self, target: StateKind, data: StateData) {
        self.request = Some(TransitionRequest::Push { target, data });
    }

    /// Requests popping the current state.
    pub fn pop_state(&mut self) {
        self.request = Some(TransitionRequest::Pop);
    }
}

impl fmt::Debug for StateContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("kind", &self.kind)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// A screen or mode the game can be in.
///
/// Only `kind` is required. `enter` and `exit` receive the neighbouring state
/// of the transition; `pause` and `resume` bracket time spent under another
/// pushed state.
#[allow(unused_variables)]
pub trait GameState {
    /// Kind this state is registered under.
    fn kind(&self) -> StateKind;

    /// Behaviour flags.
    fn flags(&self) -> StateFlags {
        StateFlags::default()
    }

    /// One-time setup, run on registration.
    fn on_initialize(&mut self) {}

    /// Called when the state becomes part of the stack.
    fn enter(&mut self, previous: Option<StateKind>, ctx: &mut StateContext<'_>) {}

    /// Called when the state leaves the stack.
    fn exit(&mut self, next: Option<StateKind>, ctx: &mut StateContext<'_>) {}

    /// Per-frame logic. Only the top state is updated.
    fn update(&mut self, dt: f64, ctx: &mut StateContext<'_>) {}

    /// Draws the state.
    fn render(&self, data: &StateData, surface: &mut dyn Surface) {}

    /// Handles input. Returns `true` when the event is consumed.
    fn handle_input(&mut self, event: &InputEvent, ctx: &mut StateContext<'_>) -> bool {
        false
    }

    /// Another state was pushed over this one.
    fn pause(&mut self) {}

    /// This state is on top again.
    fn resume(&mut self) {}

    /// Releases resources before the state is dropped.
    fn cleanup(&mut self) {}
}
