//! Canonical event model and raw-event normalization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four canonical input event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Key pressed.
    KeyDown,
    /// Key released.
    KeyUp,
    /// Mouse button pressed.
    MouseDown,
    /// Mouse button released.
    MouseUp,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::KeyDown => "KeyDown",
            EventType::KeyUp => "KeyUp",
            EventType::MouseDown => "MouseDown",
            EventType::MouseUp => "MouseUp",
        };
        f.write_str(name)
    }
}

/// A normalized input event as delivered to the consumer callback.
///
/// Immutable once created; `code` is the platform-defined numeric identifier
/// of the key or mouse button, passed through unchanged from the raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// The canonical event category.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Platform-defined key or button code.
    pub code: u32,
}

/// Left mouse button code.
pub const BUTTON_LEFT: u32 = 1;
/// Right mouse button code.
pub const BUTTON_RIGHT: u32 = 2;
/// Middle mouse button code.
pub const BUTTON_MIDDLE: u32 = 3;
/// First extra (back) mouse button code.
pub const BUTTON_X1: u32 = 4;
/// Second extra (forward) mouse button code.
pub const BUTTON_X2: u32 = 5;

/// Raw event categories as produced by a platform hook backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawEvent {
    /// Key pressed, with the platform key code.
    KeyPress { code: u32 },
    /// Key released.
    KeyRelease { code: u32 },
    /// Mouse button pressed (1 = left, 2 = right, 3 = middle, 4/5 = extra).
    ButtonPress { button: u32 },
    /// Mouse button released.
    ButtonRelease { button: u32 },
    /// Mouse moved to position.
    MouseMove { x: f64, y: f64 },
    /// Mouse wheel scrolled.
    Wheel { delta_x: i64, delta_y: i64 },
}

/// Map a raw platform event onto the canonical four-way taxonomy.
///
/// Pure and stateless. Categories outside the canonical set (mouse movement,
/// scrolling) yield `None` and are silently dropped.
pub fn normalize(raw: RawEvent) -> Option<InputEvent> {
    let (event_type, code) = match raw {
        RawEvent::KeyPress { code } => (EventType::KeyDown, code),
        RawEvent::KeyRelease { code } => (EventType::KeyUp, code),
        RawEvent::ButtonPress { button } => (EventType::MouseDown, button),
        RawEvent::ButtonRelease { button } => (EventType::MouseUp, button),
        RawEvent::MouseMove { .. } | RawEvent::Wheel { .. } => return None,
    };
    Some(InputEvent { event_type, code })
}
