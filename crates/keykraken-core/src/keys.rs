//! Key names understood by the injection backends

/// Set of key names a backend can press
pub trait KeySet: Send + Sync {
    fn contains(&self, key: &str) -> bool;
}

/// Named keys shared by every backend. Single printable characters are
/// accepted on top of these.
pub const NAMED_KEYS: &[&str] = &[
    "accept", "add", "alt", "alt_gr", "alt_l", "alt_r", "altleft", "altright", "apps",
    "backspace", "browserback", "browserforward", "browserhome", "browserrefresh",
    "browsersearch", "browserstop", "caps_lock", "capslock", "clear", "cmd", "cmd_l", "cmd_r",
    "command", "convert", "ctrl", "ctrl_l", "ctrl_r", "ctrlleft", "ctrlright", "decimal", "del",
    "delete", "divide", "down", "end", "enter", "esc", "escape", "execute", "final", "fn", "help",
    "home", "insert", "launchapp1", "launchapp2", "launchmail", "launchmediaselect", "left",
    "media_next", "media_play_pause", "media_previous", "media_volume_down",
    "media_volume_mute", "media_volume_up", "menu", "modechange", "multiply", "nexttrack",
    "nonconvert", "num_lock", "numlock", "option", "optionleft", "optionright", "page_down",
    "page_up", "pagedown", "pageup", "pause", "pgdn", "pgup", "playpause", "prevtrack", "print",
    "print_screen", "printscreen", "prntscrn", "prtsc", "prtscr", "return", "right",
    "scroll_lock", "scrolllock", "select", "separator", "shift", "shift_l", "shift_r",
    "shiftleft", "shiftright", "sleep", "space", "stop", "subtract", "super", "tab", "up",
    "volumedown", "volumemute", "volumeup", "win", "winleft", "winright",
];

/// Keys that act as modifiers in a hotkey chord
pub const MODIFIER_KEYS: &[&str] = &[
    "alt", "alt_gr", "alt_l", "alt_r", "altleft", "altright", "cmd", "cmd_l", "cmd_r", "command",
    "ctrl", "ctrl_l", "ctrl_r", "ctrlleft", "ctrlright", "fn", "option", "optionleft",
    "optionright", "shift", "shift_l", "shift_r", "shiftleft", "shiftright", "super", "win",
    "winleft", "winright",
];

/// The default key table
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardKeys;

impl KeySet for StandardKeys {
    fn contains(&self, key: &str) -> bool {
        is_standard_key(key)
    }
}

pub fn is_standard_key(key: &str) -> bool {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return c == ' ' || c == '\t' || c == '\n' || c.is_ascii_graphic();
    }
    let lower = key.to_lowercase();
    if NAMED_KEYS.binary_search(&lower.as_str()).is_ok() {
        return true;
    }
    numbered(&lower, "f", 1, 24) || numbered(&lower, "num", 0, 9)
}

/// Every multi-character key name in `keys`, in table order followed by
/// function and keypad keys.
pub fn named_keys(keys: &dyn KeySet) -> Vec<String> {
    NAMED_KEYS
        .iter()
        .map(|k| k.to_string())
        .chain((1..=24).map(|n| format!("f{}", n)))
        .chain((0..=9).map(|n| format!("num{}", n)))
        .filter(|k| keys.contains(k))
        .collect()
}

pub fn is_modifier(key: &str) -> bool {
    MODIFIER_KEYS.binary_search(&key.to_lowercase().as_str()).is_ok()
}

fn numbered(key: &str, prefix: &str, min: u32, max: u32) -> bool {
    key.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse::<u32>().ok())
        .map(|n| n >= min && n <= max)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted() {
        assert!(NAMED_KEYS.windows(2).all(|w| w[0] < w[1]));
        assert!(MODIFIER_KEYS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn standard_keys() {
        let keys = StandardKeys;
        assert!(keys.contains("a"));
        assert!(keys.contains("Z"));
        assert!(keys.contains("!"));
        assert!(keys.contains("enter"));
        assert!(keys.contains("Enter"));
        assert!(keys.contains("f12"));
        assert!(keys.contains("num0"));
        assert!(!keys.contains("f25"));
        assert!(!keys.contains("notakey"));
        assert!(!keys.contains(""));
    }

    #[test]
    fn named_keys_filtered_by_set() {
        struct Arrows;
        impl KeySet for Arrows {
            fn contains(&self, key: &str) -> bool {
                ["up", "down", "f3"].contains(&key)
            }
        }
        assert_eq!(named_keys(&Arrows), ["down", "up", "f3"]);
        assert_eq!(named_keys(&StandardKeys).len(), NAMED_KEYS.len() + 34);
    }

    #[test]
    fn modifiers() {
        assert!(is_modifier("ctrl"));
        assert!(is_modifier("Shift"));
        assert!(!is_modifier("a"));
    }
}
