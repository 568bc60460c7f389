//! Placeholder screens registered by the engine at startup.
//!
//! Each screen fills the surface with its colour, draws a title and an
//! instruction line, and reacts to a single key.

use meridian_core::{
    Color, GameState, InputEvent, KeyCode, StateContext, StateData, StateFlags, StateKind, Surface,
};
use serde_json::Value;
use tracing::debug;

/// Approximate glyph width used to centre text.
const GLYPH_WIDTH: f32 = 8.0;

/// What a placeholder does when its key is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Replace the stack with the target
    Change(StateKind),
    /// Push the target over this screen
    Push(StateKind),
    /// Pop this screen
    Pop,
}

/// A simple screen: colour, title, one key.
#[derive(Debug, Clone)]
pub struct PlaceholderState {
    kind: StateKind,
    background: Color,
    title: &'static str,
    hint: Option<&'static str>,
    key: KeyCode,
    action: KeyAction,
    flags: StateFlags,
}

impl PlaceholderState {
    /// Splash screen; SPACE continues to the main menu.
    #[must_use]
    pub fn splash_screen() -> Self {
        Self {
            kind: StateKind::SplashScreen,
            background: Color::rgb(50, 50, 100),
            title: "Meridian",
            hint: Some("Press SPACE to continue"),
            key: KeyCode::Space,
            action: KeyAction::Change(StateKind::MainMenu),
            flags: StateFlags::default(),
        }
    }

    /// Main menu; ENTER starts the game.
    #[must_use]
    pub fn main_menu() -> Self {
        Self {
            kind: StateKind::MainMenu,
            background: Color::rgb(100, 50, 50),
            title: "Main Menu",
            hint: Some("Press ENTER to start game"),
            key: KeyCode::Enter,
            action: KeyAction::Change(StateKind::Gameplay),
            flags: StateFlags::default(),
        }
    }

    /// Gameplay; ESCAPE pushes the pause menu.
    #[must_use]
    pub fn gameplay() -> Self {
        Self {
            kind: StateKind::Gameplay,
            background: Color::rgb(50, 100, 50),
            title: "Gameplay",
            hint: Some("Press ESCAPE to pause"),
            key: KeyCode::Escape,
            action: KeyAction::Push(StateKind::PauseMenu),
            flags: StateFlags::default(),
        }
    }

    /// Pause menu drawn over gameplay; ESCAPE returns.
    #[must_use]
    pub fn pause_menu() -> Self {
        Self {
            kind: StateKind::PauseMenu,
            background: Color::rgba(100, 100, 50, 192),
            title: "Paused",
            hint: Some("Press ESCAPE to resume"),
            key: KeyCode::Escape,
            action: KeyAction::Pop,
            flags: StateFlags::modal_overlay(),
        }
    }

    /// The four screens the engine starts with.
    #[must_use]
    pub fn defaults() -> [Self; 4] {
        [Self::splash_screen(), Self::main_menu(), Self::gameplay(), Self::pause_menu()]
    }

    /// Key this screen reacts to.
    #[must_use]
    pub fn key(&self) -> KeyCode {
        self.key
    }

    /// What the key does.
    #[must_use]
    pub fn action(&self) -> KeyAction {
        self.action
    }
}

fn centered_x(width: u32, text: &str) -> f32 {
    (width as f32 - text.chars().count() as f32 * GLYPH_WIDTH) / 2.0
}

impl GameState for PlaceholderState {
    fn kind(&self) -> StateKind {
        self.kind
    }

    fn flags(&self) -> StateFlags {
        self.flags
    }

    fn enter(&mut self, previous: Option<StateKind>, ctx: &mut StateContext<'_>) {
        debug!(state = %self.kind, previous = ?previous, "Entered placeholder state");
        ctx.data_mut().insert("elapsed".into(), Value::from(0.0));
    }

    fn update(&mut self, dt: f64, ctx: &mut StateContext<'_>) {
        let elapsed = ctx.data().get("elapsed").and_then(Value::as_f64).unwrap_or(0.0);
        ctx.data_mut().insert("elapsed".into(), Value::from(elapsed + dt));
    }

    fn render(&self, _data: &StateData, surface: &mut dyn Surface) {
        let (width, height) = surface.size();
        let mid = height as f32 / 2.0;

        surface.fill(self.background);
        surface.draw_text(self.title, centered_x(width, self.title), mid - 24.0, Color::WHITE);
        if let Some(hint) = self.hint {
            surface.draw_text(hint, centered_x(width, hint), mid + 24.0, Color::rgb(200, 200, 200));
        }
    }

    fn handle_input(&mut self, event: &InputEvent, ctx: &mut StateContext<'_>) -> bool {
        if !event.is_key_down(self.key) {
            return false;
        }

        match self.action {
            KeyAction::Change(target) => ctx.change_state(target, StateData::new()),
            KeyAction::Push(target) => ctx.push_state(target, StateData::new()),
            KeyAction::Pop => ctx.pop_state(),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{DrawCommand, EventBus, RecordingSurface, StateMachine};

    fn machine() -> (EventBus, StateMachine) {
        let bus = EventBus::new();
        let mut states = StateMachine::new(bus.publisher());
        for state in PlaceholderState::defaults() {
            states.register(state);
        }
        (bus, states)
    }

    #[test]
    fn test_menu_flow() {
        let (_bus, mut states) = machine();
        states.change_state_now(StateKind::SplashScreen, StateData::new());

        let presses = [KeyCode::Space, KeyCode::Enter, KeyCode::Escape];
        for key in presses {
            assert!(states.handle_input(&InputEvent::KeyDown(key)));
            states.update(0.016);
        }
        assert_eq!(states.stack(), &[StateKind::Gameplay, StateKind::PauseMenu]);

        assert!(states.handle_input(&InputEvent::KeyDown(KeyCode::Escape)));
        states.update(0.016);
        assert_eq!(states.stack(), &[StateKind::Gameplay]);
    }

    #[test]
    fn test_other_keys_are_not_consumed() {
        let (_bus, mut states) = machine();
        states.change_state_now(StateKind::SplashScreen, StateData::new());

        assert!(!states.handle_input(&InputEvent::KeyDown(KeyCode::Enter)));
        assert!(!states.handle_input(&InputEvent::KeyUp(KeyCode::Space)));
        assert!(!states.has_pending_transition());
    }

    #[test]
    fn test_pause_menu_draws_over_gameplay() {
        let (_bus, mut states) = machine();
        states.change_state_now(StateKind::Gameplay, StateData::new());
        states.push_state_now(StateKind::PauseMenu, StateData::new());

        let mut surface = RecordingSurface::new(800, 600);
        states.render(&mut surface);

        assert_eq!(surface.commands[0], DrawCommand::Fill(Color::rgb(50, 100, 50)));
        assert_eq!(surface.texts(), vec![
            "Gameplay",
            "Press ESCAPE to pause",
            "Paused",
            "Press ESCAPE to resume",
        ]);
    }

    #[test]
    fn test_update_tracks_elapsed_time() {
        let (_bus, mut states) = machine();
        states.change_state_now(StateKind::MainMenu, StateData::new());
        states.update(0.5);
        states.update(0.25);

        let elapsed = states
            .state_data(StateKind::MainMenu)
            .and_then(|data| data.get("elapsed"))
            .and_then(Value::as_f64);
        assert_eq!(elapsed, Some(0.75));
    }

    #[test]
    fn test_title_is_centred() {
        let state = PlaceholderState::main_menu();
        let mut surface = RecordingSurface::new(400, 300);
        state.render(&StateData::new(), &mut surface);

        match &surface.commands[1] {
            DrawCommand::Text { x, y, .. } => {
                assert!((x - (400.0 - 9.0 * GLYPH_WIDTH) / 2.0).abs() < f32::EPSILON);
                assert!((y - 126.0).abs() < f32::EPSILON);
            },
            other => panic!("expected text, got {other:?}"),
        }
    }
}
