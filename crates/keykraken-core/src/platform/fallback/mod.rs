//! Platforms without a command-line input backend (Windows and others)
//!
//! Every primitive reports `Unsupported`; use a custom
//! [`InputInjector`](crate::input::InputInjector) instead.

use crate::input::{InjectResult, InjectionError};
use crate::step::{MouseButton, Point};

fn unsupported<T>(what: &str) -> InjectResult<T> {
    Err(InjectionError::Unsupported(format!(
        "{} on {}",
        what,
        std::env::consts::OS
    )))
}

/// No backend to consult; the standard table stands.
pub fn supports_key(_name: &str) -> bool {
    true
}

pub fn click(_at: Point, _button: MouseButton) -> InjectResult<()> {
    unsupported("click")
}

pub fn move_to(_to: Point) -> InjectResult<()> {
    unsupported("move")
}

pub fn drag_to(_to: Point, _duration: f64) -> InjectResult<()> {
    unsupported("drag")
}

pub fn press(_key: &str) -> InjectResult<()> {
    unsupported("key press")
}

pub fn hotkey(_keys: &[String]) -> InjectResult<()> {
    unsupported("hotkey")
}

pub fn write(_text: &str, _interval: f64) -> InjectResult<()> {
    unsupported("typing")
}

pub fn scroll(_amount: i32) -> InjectResult<()> {
    unsupported("scroll")
}
