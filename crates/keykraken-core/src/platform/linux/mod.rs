//! Linux backend using xdotool (X11)

use crate::input::{output, run, InjectResult, InjectionError};
use crate::step::{MouseButton, Point};
use std::thread;
use std::time::Duration;

const XDOTOOL: &str = "xdotool";

/// Pause between pointer moves during a drag
const DRAG_TICK: Duration = Duration::from_millis(20);
const MAX_DRAG_MOVES: u32 = 100;

fn xdotool(args: &[&str]) -> InjectResult<()> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    run(XDOTOOL, &args)
}

fn button_number(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

/// Map a key name to an X keysym
pub fn keysym(name: &str) -> InjectResult<String> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let sym = match c {
            ' ' => "space",
            '\n' => "Return",
            '\t' => "Tab",
            ',' => "comma",
            '.' => "period",
            '/' => "slash",
            '\\' => "backslash",
            ';' => "semicolon",
            '\'' => "apostrophe",
            '[' => "bracketleft",
            ']' => "bracketright",
            '-' => "minus",
            '=' => "equal",
            '`' => "grave",
            '+' => "plus",
            _ if c.is_ascii_graphic() => return Ok(c.to_string()),
            _ => return Err(InjectionError::UnknownKey(name.to_string())),
        };
        return Ok(sym.to_string());
    }

    let lower = name.to_lowercase();
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        return Ok(format!("F{}", n));
    }
    if let Some(n) = lower.strip_prefix("num").and_then(|n| n.parse::<u8>().ok()) {
        return Ok(format!("KP_{}", n));
    }
    let sym = match lower.as_str() {
        "enter" | "return" => "Return",
        "esc" | "escape" => "Escape",
        "tab" => "Tab",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" | "del" => "Delete",
        "insert" => "Insert",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "home" => "Home",
        "end" => "End",
        "pageup" | "page_up" | "pgup" => "Prior",
        "pagedown" | "page_down" | "pgdn" => "Next",
        "ctrl" | "ctrlleft" | "ctrl_l" => "Control_L",
        "ctrlright" | "ctrl_r" => "Control_R",
        "shift" | "shiftleft" | "shift_l" => "Shift_L",
        "shiftright" | "shift_r" => "Shift_R",
        "alt" | "altleft" | "alt_l" | "option" | "optionleft" => "Alt_L",
        "altright" | "alt_r" | "optionright" => "Alt_R",
        "alt_gr" => "ISO_Level3_Shift",
        "cmd" | "cmd_l" | "command" | "win" | "winleft" | "super" => "Super_L",
        "cmd_r" | "winright" => "Super_R",
        "capslock" | "caps_lock" => "Caps_Lock",
        "numlock" | "num_lock" => "Num_Lock",
        "scrolllock" | "scroll_lock" => "Scroll_Lock",
        "print" | "printscreen" | "print_screen" | "prntscrn" | "prtsc" | "prtscr" => "Print",
        "pause" => "Pause",
        "menu" | "apps" => "Menu",
        "volumeup" | "media_volume_up" => "XF86AudioRaiseVolume",
        "volumedown" | "media_volume_down" => "XF86AudioLowerVolume",
        "volumemute" | "media_volume_mute" => "XF86AudioMute",
        "playpause" | "media_play_pause" => "XF86AudioPlay",
        "nexttrack" | "media_next" => "XF86AudioNext",
        "prevtrack" | "media_previous" => "XF86AudioPrev",
        _ => return Err(InjectionError::UnknownKey(name.to_string())),
    };
    Ok(sym.to_string())
}

pub fn supports_key(name: &str) -> bool {
    keysym(name).is_ok()
}

pub fn click(at: Point, button: MouseButton) -> InjectResult<()> {
    let (x, y) = (at.x.to_string(), at.y.to_string());
    xdotool(&["mousemove", &x, &y, "click", button_number(button)])
}

pub fn move_to(to: Point) -> InjectResult<()> {
    xdotool(&["mousemove", &to.x.to_string(), &to.y.to_string()])
}

/// Pointer position from `xdotool getmouselocation --shell`
fn pointer() -> InjectResult<Point> {
    let shell = output(XDOTOOL, &["getmouselocation".to_string(), "--shell".to_string()])?;
    parse_location(&shell).ok_or_else(|| InjectionError::Command {
        command: "xdotool getmouselocation".to_string(),
        reason: format!("unexpected output: {}", shell.trim()),
    })
}

fn parse_location(shell: &str) -> Option<Point> {
    let field = |name: &str| {
        shell
            .lines()
            .find_map(|l| l.trim().strip_prefix(name)?.strip_prefix('='))
            .and_then(|v| v.trim().parse::<i32>().ok())
    };
    Some(Point::new(field("X")?, field("Y")?))
}

/// Evenly spaced points after `from`, ending exactly on `to`
fn drag_path(from: Point, to: Point, moves: u32) -> Vec<Point> {
    let moves = moves.max(1);
    (1..=moves)
        .map(|i| {
            let t = f64::from(i) / f64::from(moves);
            Point::new(
                from.x + (f64::from(to.x - from.x) * t).round() as i32,
                from.y + (f64::from(to.y - from.y) * t).round() as i32,
            )
        })
        .collect()
}

pub fn drag_to(to: Point, duration: f64) -> InjectResult<()> {
    let from = pointer()?;
    let duration = Duration::from_secs_f64(duration.max(0.0));
    let moves = ((duration.as_millis() / DRAG_TICK.as_millis()) as u32).clamp(1, MAX_DRAG_MOVES);
    let pause = duration / moves;

    xdotool(&["mousedown", "1"])?;
    let mut moved = Ok(());
    for point in drag_path(from, to, moves) {
        thread::sleep(pause);
        moved = move_to(point);
        if moved.is_err() {
            break;
        }
    }
    // Always release, even if a move failed
    let released = xdotool(&["mouseup", "1"]);
    moved.and(released)
}

pub fn press(key: &str) -> InjectResult<()> {
    xdotool(&["key", &keysym(key)?])
}

pub fn hotkey(keys: &[String]) -> InjectResult<()> {
    let chord = keys
        .iter()
        .map(|k| keysym(k))
        .collect::<InjectResult<Vec<_>>>()?
        .join("+");
    xdotool(&["key", &chord])
}

pub fn write(text: &str, interval: f64) -> InjectResult<()> {
    let delay_ms = ((interval.max(0.0)) * 1000.0).round() as u64;
    xdotool(&["type", "--delay", &delay_ms.to_string(), "--", text])
}

pub fn scroll(amount: i32) -> InjectResult<()> {
    if amount == 0 {
        return Ok(());
    }
    // X11 wheel: button 4 is up, 5 is down
    let button = if amount > 0 { "4" } else { "5" };
    let times = amount.unsigned_abs().to_string();
    xdotool(&["click", "--repeat", &times, button])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_path_is_gradual() {
        let path = drag_path(Point::new(0, 0), Point::new(100, -50), 4);
        assert_eq!(
            path,
            [Point::new(25, -13), Point::new(50, -25), Point::new(75, -38), Point::new(100, -50)]
        );
        assert_eq!(drag_path(Point::new(5, 5), Point::new(9, 9), 0), [Point::new(9, 9)]);
    }

    #[test]
    fn location_output() {
        let shell = "X=640\nY=480\nSCREEN=0\nWINDOW=123\n";
        assert_eq!(parse_location(shell), Some(Point::new(640, 480)));
        assert_eq!(parse_location("WINDOW=1"), None);
    }

    #[test]
    fn keysyms() {
        assert_eq!(keysym("enter").unwrap(), "Return");
        assert_eq!(keysym("a").unwrap(), "a");
        assert_eq!(keysym(",").unwrap(), "comma");
        assert_eq!(keysym("F5").unwrap(), "F5");
        assert_eq!(keysym("num7").unwrap(), "KP_7");
        assert_eq!(keysym("ctrl").unwrap(), "Control_L");
        assert!(matches!(keysym("hyperdrive"), Err(InjectionError::UnknownKey(_))));
    }
}
