//! Observed input events - what the recorder listens to
//!
//! Serialized as compact JSON lines, one event per line.

use keykraken_core::{MouseButton, Point};
use serde::{Deserialize, Serialize};

/// Single observed event - tagged union
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "e")]
pub enum InputEvent {
    /// Pointer button down: x, y, button (0=left, 1=right, 2=middle)
    #[serde(rename = "d")]
    Press { x: i32, y: i32, b: u8 },

    /// Pointer button up
    #[serde(rename = "u")]
    Release { x: i32, y: i32, b: u8 },

    /// Pointer moved
    #[serde(rename = "m")]
    Move { x: i32, y: i32 },

    /// Wheel: signed notches, positive is up
    #[serde(rename = "s")]
    Scroll { x: i32, y: i32, dy: i32 },

    /// Key down: literal character if printable, symbolic name otherwise
    #[serde(rename = "k")]
    Key { k: String },
}

impl InputEvent {
    pub const LEFT: u8 = 0;
    pub const RIGHT: u8 = 1;
    pub const MIDDLE: u8 = 2;

    pub fn key_char(c: char) -> Self {
        InputEvent::Key { k: c.to_string() }
    }

    pub fn key_named(name: impl Into<String>) -> Self {
        InputEvent::Key { k: name.into() }
    }

    /// Pointer position carried by the event, if any
    pub fn position(&self) -> Option<Point> {
        match *self {
            InputEvent::Press { x, y, .. }
            | InputEvent::Release { x, y, .. }
            | InputEvent::Move { x, y }
            | InputEvent::Scroll { x, y, .. } => Some(Point::new(x, y)),
            InputEvent::Key { .. } => None,
        }
    }
}

/// Buttons the recorder turns into steps. Anything else is ignored.
pub fn recorded_button(b: u8) -> Option<MouseButton> {
    match b {
        InputEvent::LEFT => Some(MouseButton::Left),
        InputEvent::RIGHT => Some(MouseButton::Right),
        _ => None,
    }
}

/// Event with an optional timestamp, as read from an event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Milliseconds since the log started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<u64>,
    #[serde(flatten)]
    pub event: InputEvent,
}
