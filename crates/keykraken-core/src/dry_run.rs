//! Injector that records calls instead of touching the desktop
//!
//! Used by `kk --dry-run` and by tests. Image searches answer from a
//! script; primitives can be told to fail.

use crate::input::{InjectResult, InjectionError, InputInjector};
use crate::step::{MouseButton, Point};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::info;

/// One primitive call
#[derive(Debug, Clone, PartialEq)]
pub enum InjectorCall {
    Click { at: Point, button: MouseButton },
    MoveTo { to: Point },
    DragTo { to: Point, duration: f64 },
    Press { key: String },
    Hotkey { keys: Vec<String> },
    Write { text: String, interval: f64 },
    Scroll { amount: i32 },
    Locate { image: PathBuf, confidence: f64 },
}

impl InjectorCall {
    /// Primitive name, as used by [`DryRunInjector::fail_on`]
    pub fn primitive(&self) -> &'static str {
        match self {
            InjectorCall::Click { .. } => "click",
            InjectorCall::MoveTo { .. } => "move_to",
            InjectorCall::DragTo { .. } => "drag_to",
            InjectorCall::Press { .. } => "press",
            InjectorCall::Hotkey { .. } => "hotkey",
            InjectorCall::Write { .. } => "write",
            InjectorCall::Scroll { .. } => "scroll",
            InjectorCall::Locate { .. } => "locate",
        }
    }
}

pub struct DryRunInjector {
    calls: Mutex<Vec<InjectorCall>>,
    located: Mutex<VecDeque<Option<Point>>>,
    default_location: Option<Point>,
    failing: HashSet<&'static str>,
}

impl DryRunInjector {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            located: Mutex::new(VecDeque::new()),
            default_location: Some(Point::new(0, 0)),
            failing: HashSet::new(),
        }
    }

    /// Queue answers for successive image searches.
    pub fn locate_results(self, results: impl IntoIterator<Item = Option<Point>>) -> Self {
        self.located.lock().extend(results);
        self
    }

    /// Answer once the queued results run out
    pub fn default_location(mut self, location: Option<Point>) -> Self {
        self.default_location = location;
        self
    }

    /// Make a primitive (`"click"`, `"press"`, ...) return an error.
    pub fn fail_on(mut self, primitive: &'static str) -> Self {
        self.failing.insert(primitive);
        self
    }

    pub fn calls(&self) -> Vec<InjectorCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: InjectorCall) -> InjectResult<()> {
        info!(?call, "dry run");
        let primitive = call.primitive();
        self.calls.lock().push(call);
        if self.failing.contains(primitive) {
            return Err(InjectionError::Command {
                command: primitive.to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DryRunInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl InputInjector for DryRunInjector {
    fn click(&self, at: Point, button: MouseButton) -> InjectResult<()> {
        self.record(InjectorCall::Click { at, button })
    }

    fn move_to(&self, to: Point) -> InjectResult<()> {
        self.record(InjectorCall::MoveTo { to })
    }

    fn drag_to(&self, to: Point, duration: f64) -> InjectResult<()> {
        self.record(InjectorCall::DragTo { to, duration })
    }

    fn press(&self, key: &str) -> InjectResult<()> {
        self.record(InjectorCall::Press { key: key.to_string() })
    }

    fn hotkey(&self, keys: &[String]) -> InjectResult<()> {
        self.record(InjectorCall::Hotkey { keys: keys.to_vec() })
    }

    fn write(&self, text: &str, interval: f64) -> InjectResult<()> {
        self.record(InjectorCall::Write { text: text.to_string(), interval })
    }

    fn scroll(&self, amount: i32) -> InjectResult<()> {
        self.record(InjectorCall::Scroll { amount })
    }

    fn locate_center_on_screen(&self, image: &Path, confidence: f64) -> InjectResult<Option<Point>> {
        self.record(InjectorCall::Locate { image: image.to_path_buf(), confidence })?;
        let next = self.located.lock().pop_front();
        Ok(next.unwrap_or(self.default_location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_scripts() {
        let inj = DryRunInjector::new()
            .locate_results([None, Some(Point::new(5, 5))])
            .default_location(None);
        inj.press("a").unwrap();
        assert_eq!(inj.locate_center_on_screen(Path::new("x.png"), 0.9).unwrap(), None);
        assert_eq!(
            inj.locate_center_on_screen(Path::new("x.png"), 0.9).unwrap(),
            Some(Point::new(5, 5))
        );
        assert_eq!(inj.locate_center_on_screen(Path::new("x.png"), 0.9).unwrap(), None);
        assert_eq!(inj.calls().len(), 4);
        assert_eq!(inj.calls()[0], InjectorCall::Press { key: "a".into() });
    }

    #[test]
    fn simulated_failure() {
        let inj = DryRunInjector::new().fail_on("scroll");
        assert!(inj.scroll(3).is_err());
        assert!(inj.press("a").is_ok());
        assert_eq!(inj.calls().len(), 2);
    }
}
