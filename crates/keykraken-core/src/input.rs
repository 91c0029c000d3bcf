//! Input injection - the capability that moves the mouse and presses keys

use crate::keys::{is_standard_key, KeySet, StandardKeys};
use crate::platform;
use crate::step::{MouseButton, Point};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("{0} is not supported by this input backend")]
    Unsupported(String),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type InjectResult<T> = std::result::Result<T, InjectionError>;

/// Primitives the executor drives. Implementations must be shareable with
/// the playback thread.
pub trait InputInjector: Send + Sync {
    fn click(&self, at: Point, button: MouseButton) -> InjectResult<()>;

    fn move_to(&self, to: Point) -> InjectResult<()>;

    /// Drag from the current pointer position to `to` over `duration` seconds.
    fn drag_to(&self, to: Point, duration: f64) -> InjectResult<()>;

    fn press(&self, key: &str) -> InjectResult<()>;

    fn hotkey(&self, keys: &[String]) -> InjectResult<()>;

    /// Type `text`, waiting `interval` seconds between characters.
    fn write(&self, text: &str, interval: f64) -> InjectResult<()>;

    /// Positive scrolls up.
    fn scroll(&self, amount: i32) -> InjectResult<()>;

    /// Center of the best on-screen match for `image` scoring at least
    /// `confidence`, or `None` when nothing matches.
    fn locate_center_on_screen(&self, image: &Path, confidence: f64) -> InjectResult<Option<Point>>;

    /// Key names this backend can press
    fn keys(&self) -> &dyn KeySet {
        &StandardKeys
    }
}

/// Injects through the platform's command-line tools
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInjector;

impl SystemInjector {
    pub fn new() -> Self {
        Self
    }
}

impl InputInjector for SystemInjector {
    fn click(&self, at: Point, button: MouseButton) -> InjectResult<()> {
        platform::current::click(at, button)
    }

    fn move_to(&self, to: Point) -> InjectResult<()> {
        platform::current::move_to(to)
    }

    fn drag_to(&self, to: Point, duration: f64) -> InjectResult<()> {
        platform::current::drag_to(to, duration)
    }

    fn press(&self, key: &str) -> InjectResult<()> {
        platform::current::press(key)
    }

    fn hotkey(&self, keys: &[String]) -> InjectResult<()> {
        platform::current::hotkey(keys)
    }

    fn write(&self, text: &str, interval: f64) -> InjectResult<()> {
        platform::current::write(text, interval)
    }

    fn scroll(&self, amount: i32) -> InjectResult<()> {
        platform::current::scroll(amount)
    }

    fn locate_center_on_screen(&self, _image: &Path, _confidence: f64) -> InjectResult<Option<Point>> {
        Err(InjectionError::Unsupported("image search".to_string()))
    }

    fn keys(&self) -> &dyn KeySet {
        &PlatformKeys
    }
}

/// Standard key names the current platform backend can map
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformKeys;

impl KeySet for PlatformKeys {
    fn contains(&self, key: &str) -> bool {
        is_standard_key(key) && platform::current::supports_key(key)
    }
}

/// Run a command and turn a non-zero exit into an error.
pub(crate) fn run(program: &str, args: &[String]) -> InjectResult<()> {
    output(program, args).map(|_| ())
}

/// Like [`run`], returning what the command printed.
pub(crate) fn output(program: &str, args: &[String]) -> InjectResult<String> {
    let output = std::process::Command::new(program).args(args).output()?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(InjectionError::Command {
            command: format!("{} {}", program, args.join(" ")),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{named_keys, NAMED_KEYS};

    #[test]
    fn system_keys_map_on_this_platform() {
        let injector = SystemInjector::new();
        let accepted = named_keys(injector.keys());
        assert!(!accepted.is_empty());
        for key in &accepted {
            assert!(platform::current::supports_key(key), "{} accepted but unmapped", key);
        }
        for c in ['a', 'Z', '7', ',', ' '] {
            assert!(injector.keys().contains(&c.to_string()));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_rejects_unmapped_names() {
        let keys = SystemInjector::new();
        for key in ["browserback", "launchmail", "fn", "sleep"] {
            assert!(NAMED_KEYS.contains(&key));
            assert!(!keys.keys().contains(key));
        }
        assert!(keys.keys().contains("enter"));
        assert!(keys.keys().contains("f24"));
    }
}
