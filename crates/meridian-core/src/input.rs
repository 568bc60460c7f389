//! Input events routed through the state stack.
//!
//! The host translates platform input into [`InputEvent`]s; the engine offers
//! each one to global key handling first and then to the active states.

use serde::{Deserialize, Serialize};

/// Key codes for keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    /// Printable character key
    Char(char),
    /// Space bar
    Space,
    /// Enter/Return
    Enter,
    /// Escape
    Escape,
    /// Tab
    Tab,
    /// Backspace
    Backspace,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// F1
    F1,
    /// F2
    F2,
    /// F3
    F3,
    /// F4
    F4,
    /// F5
    F5,
    /// F6
    F6,
    /// F7
    F7,
    /// F8
    F8,
    /// F9
    F9,
    /// F10
    F10,
    /// F11
    F11,
    /// F12
    F12,
}

/// Mouse button codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    /// Left mouse button
    Left,
    /// Right mouse button
    Right,
    /// Middle mouse button (scroll wheel click)
    Middle,
}

/// A single input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Key pressed
    KeyDown(KeyCode),
    /// Key released
    KeyUp(KeyCode),
    /// Cursor moved to a position in surface pixels
    MouseMoved {
        /// X position
        x: f32,
        /// Y position
        y: f32,
    },
    /// Mouse button pressed
    MouseDown {
        /// Button
        button: MouseButton,
        /// X position
        x: f32,
        /// Y position
        y: f32,
    },
    /// Mouse button released
    MouseUp {
        /// Button
        button: MouseButton,
        /// X position
        x: f32,
        /// Y position
        y: f32,
    },
    /// Committed text input
    Text(String),
    /// The host asked the application to close
    Quit,
}

impl InputEvent {
    /// Check if this is a key press of `key`.
    #[must_use]
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        matches!(self, Self::KeyDown(pressed) if *pressed == key)
    }

    /// Returns the pressed key, if this is a key press.
    #[must_use]
    pub fn key_down(&self) -> Option<KeyCode> {
        match self {
            Self::KeyDown(key) => Some(*key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_down_matching() {
        let event = InputEvent::KeyDown(KeyCode::Escape);
        assert!(event.is_key_down(KeyCode::Escape));
        assert!(!event.is_key_down(KeyCode::Enter));
        assert!(!InputEvent::KeyUp(KeyCode::Escape).is_key_down(KeyCode::Escape));
        assert_eq!(InputEvent::Quit.key_down(), None);
    }
}
