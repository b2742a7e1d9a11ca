//! Input events forwarded from the host to the engine.
//!
//! # Wire constants
//!
//! The numeric values match what the engine's input stream expects:
//!
//! ```text
//! MouseButtonAction  Press = 0x07   Release = 0x08
//! MouseButton        Left  = 0x01   Middle  = 0x02   Right = 0x03
//! KeyAction          Down  = 0x03   Up      = 0x04
//! Modifiers          Shift = 0x01   Ctrl    = 0x02   Alt   = 0x04
//! ```
//!
//! Events are forwarded one at a time; nothing here buffers or coalesces.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::LumenError;

/// Mouse wheel delta of one detent.
pub const WHEEL_DELTA: i16 = 120;

// ── Mouse ────────────────────────────────────────────────────────

/// Press or release of a mouse button.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum MouseButtonAction {
    Press = 0x07,
    Release = 0x08,
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum MouseButton {
    Left = 0x01,
    Middle = 0x02,
    Right = 0x03,
}

// ── Keyboard ─────────────────────────────────────────────────────

/// Key action type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyAction {
    Down = 0x03,
    Up = 0x04,
}

bitflags! {
    /// Modifier keys held during a keyboard event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Modifiers: u8 {
        const SHIFT = 0x01;
        const CTRL = 0x02;
        const ALT = 0x04;
    }
}

// ── Controller ───────────────────────────────────────────────────

bitflags! {
    /// Gamepad buttons currently held.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ControllerButtons: u16 {
        const UP = 0x0001;
        const DOWN = 0x0002;
        const LEFT = 0x0004;
        const RIGHT = 0x0008;
        const PLAY = 0x0010;
        const BACK = 0x0020;
        const LEFT_STICK = 0x0040;
        const RIGHT_STICK = 0x0080;
        const LEFT_BUMPER = 0x0100;
        const RIGHT_BUMPER = 0x0200;
        const SPECIAL = 0x0400;
        const A = 0x1000;
        const B = 0x2000;
        const X = 0x4000;
        const Y = 0x8000;
    }
}

/// Snapshot of one gamepad.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ControllerState {
    pub buttons: ControllerButtons,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub left_stick_x: i16,
    pub left_stick_y: i16,
    pub right_stick_x: i16,
    pub right_stick_y: i16,
}

impl ControllerState {
    /// All inputs released, sticks centred. Sent when a pad disconnects.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

// ── InputEvent ───────────────────────────────────────────────────

/// One input event bound for the engine's input stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputEvent {
    /// Relative pointer motion.
    MouseMove { dx: i16, dy: i16 },
    MouseButton {
        action: MouseButtonAction,
        button: MouseButton,
    },
    Keyboard {
        key_code: i16,
        action: KeyAction,
        modifiers: Modifiers,
    },
    /// Single-controller form (controller 0).
    Controller(ControllerState),
    MultiController {
        controller_number: i16,
        state: ControllerState,
    },
    /// Wheel movement in whole detents.
    Scroll { clicks: i16 },
}

impl InputEvent {
    pub fn mouse_move(dx: i16, dy: i16) -> Self {
        Self::MouseMove { dx, dy }
    }

    pub fn press(button: MouseButton) -> Self {
        Self::MouseButton {
            action: MouseButtonAction::Press,
            button,
        }
    }

    pub fn release(button: MouseButton) -> Self {
        Self::MouseButton {
            action: MouseButtonAction::Release,
            button,
        }
    }

    pub fn key_down(key_code: i16, modifiers: Modifiers) -> Self {
        Self::Keyboard {
            key_code,
            action: KeyAction::Down,
            modifiers,
        }
    }

    pub fn key_up(key_code: i16, modifiers: Modifiers) -> Self {
        Self::Keyboard {
            key_code,
            action: KeyAction::Up,
            modifiers,
        }
    }

    /// Convert a raw wheel delta into whole detents.
    pub fn scroll_from_wheel_delta(delta: i16) -> Self {
        Self::Scroll {
            clicks: delta / WHEEL_DELTA,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MouseMove { .. } => "mouse_move",
            Self::MouseButton { .. } => "mouse_button",
            Self::Keyboard { .. } => "keyboard",
            Self::Controller(_) => "controller",
            Self::MultiController { .. } => "multi_controller",
            Self::Scroll { .. } => "scroll",
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LumenError> {
        bincode::serialize(self).map_err(|e| LumenError::Encoding(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LumenError> {
        bincode::deserialize(bytes).map_err(|e| LumenError::Encoding(e.to_string()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
