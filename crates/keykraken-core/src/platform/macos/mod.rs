//! macOS backend: AppleScript via `osascript` for keys, `cliclick` for the
//! mouse (brew install cliclick).

use crate::input::{run, InjectResult, InjectionError};
use crate::keys::is_modifier;
use crate::step::{MouseButton, Point};

/// Common key codes for macOS
pub mod key_codes {
    pub const RETURN: u8 = 36;
    pub const TAB: u8 = 48;
    pub const SPACE: u8 = 49;
    pub const DELETE: u8 = 51;
    pub const ESCAPE: u8 = 53;
    pub const FORWARD_DELETE: u8 = 117;
    pub const ARROW_LEFT: u8 = 123;
    pub const ARROW_RIGHT: u8 = 124;
    pub const ARROW_DOWN: u8 = 125;
    pub const ARROW_UP: u8 = 126;
    pub const PAGE_UP: u8 = 116;
    pub const PAGE_DOWN: u8 = 121;
    pub const HOME: u8 = 115;
    pub const END: u8 = 119;
    pub const F1: u8 = 122;
    pub const F2: u8 = 120;
    pub const F3: u8 = 99;
    pub const F4: u8 = 118;
    pub const F5: u8 = 96;
    pub const F6: u8 = 97;
    pub const F7: u8 = 98;
    pub const F8: u8 = 100;
    pub const F9: u8 = 101;
    pub const F10: u8 = 109;
    pub const F11: u8 = 103;
    pub const F12: u8 = 111;
}

fn key_code(name: &str) -> Option<u8> {
    use key_codes::*;
    Some(match name.to_lowercase().as_str() {
        "enter" | "return" => RETURN,
        "tab" => TAB,
        "space" => SPACE,
        "backspace" => DELETE,
        "delete" | "del" => FORWARD_DELETE,
        "esc" | "escape" => ESCAPE,
        "left" => ARROW_LEFT,
        "right" => ARROW_RIGHT,
        "down" => ARROW_DOWN,
        "up" => ARROW_UP,
        "pageup" | "page_up" | "pgup" => PAGE_UP,
        "pagedown" | "page_down" | "pgdn" => PAGE_DOWN,
        "home" => HOME,
        "end" => END,
        "f1" => F1,
        "f2" => F2,
        "f3" => F3,
        "f4" => F4,
        "f5" => F5,
        "f6" => F6,
        "f7" => F7,
        "f8" => F8,
        "f9" => F9,
        "f10" => F10,
        "f11" => F11,
        "f12" => F12,
        _ => return None,
    })
}

fn modifier_name(name: &str) -> Option<&'static str> {
    match name.to_lowercase().as_str() {
        "cmd" | "cmd_l" | "cmd_r" | "command" | "win" | "winleft" | "winright" | "super" => {
            Some("command")
        }
        "ctrl" | "ctrl_l" | "ctrl_r" | "ctrlleft" | "ctrlright" => Some("control"),
        "alt" | "alt_l" | "alt_r" | "altleft" | "altright" | "option" | "optionleft"
        | "optionright" | "alt_gr" => Some("option"),
        "shift" | "shift_l" | "shift_r" | "shiftleft" | "shiftright" => Some("shift"),
        _ => None,
    }
}

fn modifier_clause(name: &str) -> Option<String> {
    modifier_name(name).map(|m| format!("{} down", m))
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// AppleScript fragment that presses `key`
fn key_statement(key: &str) -> InjectResult<String> {
    if let Some(code) = key_code(key) {
        return Ok(format!("key code {}", code));
    }
    if key.chars().count() == 1 {
        return Ok(format!("keystroke \"{}\"", escape(key)));
    }
    Err(InjectionError::UnknownKey(key.to_string()))
}

fn system_events(body: &str) -> InjectResult<()> {
    let script = format!("tell application \"System Events\"\n{}\nend tell", body);
    run("osascript", &["-e".to_string(), script])
}

fn cliclick(commands: &[String]) -> InjectResult<()> {
    run("cliclick", commands)
}

pub fn supports_key(name: &str) -> bool {
    modifier_name(name).is_some() || key_statement(name).is_ok()
}

pub fn click(at: Point, button: MouseButton) -> InjectResult<()> {
    let cmd = match button {
        MouseButton::Left => "c",
        MouseButton::Right => "rc",
        MouseButton::Middle => {
            return Err(InjectionError::Unsupported("middle click".to_string()))
        }
    };
    cliclick(&[format!("{}:{},{}", cmd, at.x, at.y)])
}

pub fn move_to(to: Point) -> InjectResult<()> {
    cliclick(&[format!("m:{},{}", to.x, to.y)])
}

pub fn drag_to(to: Point, duration: f64) -> InjectResult<()> {
    let wait_ms = (duration.max(0.0) * 1000.0).round() as u64;
    cliclick(&[
        "dd:.".to_string(),
        format!("w:{}", wait_ms),
        format!("du:{},{}", to.x, to.y),
    ])
}

pub fn press(key: &str) -> InjectResult<()> {
    if let Some(m) = modifier_name(key) {
        return system_events(&format!("key down {m}\nkey up {m}"));
    }
    system_events(&key_statement(key)?)
}

pub fn hotkey(keys: &[String]) -> InjectResult<()> {
    let (mods, rest): (Vec<&String>, Vec<&String>) = keys.iter().partition(|k| is_modifier(k));
    let Some(main) = rest.last() else {
        return Err(InjectionError::Unsupported("modifier-only hotkey".to_string()));
    };
    let clauses = mods
        .iter()
        .filter_map(|m| modifier_clause(m))
        .collect::<Vec<_>>()
        .join(", ");
    let statement = key_statement(main)?;
    if clauses.is_empty() {
        system_events(&statement)
    } else {
        system_events(&format!("{} using {{{}}}", statement, clauses))
    }
}

pub fn write(text: &str, interval: f64) -> InjectResult<()> {
    if interval <= 0.0 {
        return system_events(&format!("keystroke \"{}\"", escape(text)));
    }
    let body = text
        .chars()
        .map(|c| format!("keystroke \"{}\"\ndelay {}", escape(&c.to_string()), interval))
        .collect::<Vec<_>>()
        .join("\n");
    system_events(&body)
}

/// No wheel events through AppleScript; arrow keys move by roughly a line.
pub fn scroll(amount: i32) -> InjectResult<()> {
    if amount == 0 {
        return Ok(());
    }
    let code = if amount > 0 {
        key_codes::ARROW_UP
    } else {
        key_codes::ARROW_DOWN
    };
    system_events(&format!(
        "repeat {} times\nkey code {}\nend repeat",
        amount.unsigned_abs(),
        code
    ))
}
