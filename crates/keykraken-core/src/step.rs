//! Step model - one automation action plus its pre-delay
//!
//! A [`Step`] always holds a typed [`Action`]. The loose, document-shaped
//! form used for persistence and editing is [`StepRecord`]; converting a
//! record into a step goes through [`crate::validate`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Seconds waited before a step when none is given
pub const DEFAULT_DELAY: f64 = 0.25;
/// Minimum visual match score for image steps
pub const DEFAULT_CONFIDENCE: f64 = 0.9;
/// Seconds between typed characters
pub const DEFAULT_INTERVAL: f64 = 0.05;
/// Seconds a drag motion takes
pub const DEFAULT_DRAG_DURATION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// The closed set of step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Click,
    Image,
    Type,
    Press,
    Hotkey,
    Scroll,
    Drag,
    Move,
    Delay,
}

impl StepKind {
    pub const ALL: [StepKind; 9] = [
        StepKind::Click,
        StepKind::Image,
        StepKind::Type,
        StepKind::Press,
        StepKind::Hotkey,
        StepKind::Scroll,
        StepKind::Drag,
        StepKind::Move,
        StepKind::Delay,
    ];

    /// Canonical name written to documents
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Click => "click",
            StepKind::Image => "image",
            StepKind::Type => "typewrite",
            StepKind::Press => "press",
            StepKind::Hotkey => "hotkey",
            StepKind::Scroll => "scroll",
            StepKind::Drag => "drag",
            StepKind::Move => "move",
            StepKind::Delay => "delay",
        }
    }

    /// Accepts canonical names and the older `type` / `keypress` spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "click" => Some(StepKind::Click),
            "image" => Some(StepKind::Image),
            "typewrite" | "type" => Some(StepKind::Type),
            "press" | "keypress" => Some(StepKind::Press),
            "hotkey" => Some(StepKind::Hotkey),
            "scroll" => Some(StepKind::Scroll),
            "drag" => Some(StepKind::Drag),
            "move" => Some(StepKind::Move),
            "delay" => Some(StepKind::Delay),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed step payload
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click { at: Point, button: MouseButton },
    Image { path: PathBuf, confidence: f64 },
    Type { text: String, interval: f64 },
    Press { key: String },
    Hotkey { keys: Vec<String> },
    /// Positive scrolls up, negative scrolls down
    Scroll { amount: i32 },
    Drag { from: Point, to: Point, duration: f64 },
    Move { to: Point },
    Delay { seconds: f64 },
}

impl Action {
    pub fn kind(&self) -> StepKind {
        match self {
            Action::Click { .. } => StepKind::Click,
            Action::Image { .. } => StepKind::Image,
            Action::Type { .. } => StepKind::Type,
            Action::Press { .. } => StepKind::Press,
            Action::Hotkey { .. } => StepKind::Hotkey,
            Action::Scroll { .. } => StepKind::Scroll,
            Action::Drag { .. } => StepKind::Drag,
            Action::Move { .. } => StepKind::Move,
            Action::Delay { .. } => StepKind::Delay,
        }
    }

    /// Human-facing rendering of the value. Parsing this string back with
    /// [`crate::validate::parse_value`] yields the same action.
    pub fn display_value(&self) -> String {
        match self {
            Action::Click { at, .. } => at.to_string(),
            Action::Move { to } => to.to_string(),
            Action::Image { path, .. } => path.display().to_string(),
            Action::Type { text, .. } => text.clone(),
            Action::Press { key } => key.clone(),
            Action::Hotkey { keys } => keys.join(","),
            Action::Scroll { amount } => amount.to_string(),
            Action::Drag { from, to, .. } => format!("{}; {}", from, to),
            Action::Delay { seconds } => seconds.to_string(),
        }
    }

    /// Canonical value as stored in documents
    pub fn document_value(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Action::Click { at, .. } => json!([at.x, at.y]),
            Action::Move { to } => json!([to.x, to.y]),
            Action::Image { path, .. } => json!(path.display().to_string()),
            Action::Type { text, .. } => json!(text),
            Action::Press { key } => json!(key),
            Action::Hotkey { keys } => json!(keys.join(",")),
            Action::Scroll { amount } => json!(amount),
            Action::Drag { from, to, .. } => json!([[from.x, from.y], [to.x, to.y]]),
            Action::Delay { seconds } => json!(seconds),
        }
    }

    /// Label used when a step has no name of its own
    pub fn default_name(&self) -> String {
        match self {
            Action::Click { at, button } => match button {
                MouseButton::Left => format!("Click at ({})", at),
                other => format!("{} click at ({})", capitalize(other.as_str()), at),
            },
            Action::Image { path, .. } => {
                let file = path
                    .file_name()
                    .map(|f| f.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                format!("Click image: {}", file)
            }
            Action::Type { text, .. } => format!("Type: {}", truncate(text, 30)),
            Action::Press { key } => format!("Press key: {}", key),
            Action::Hotkey { keys } => format!("Hotkey: {}", keys.join("+")),
            Action::Scroll { amount } => format!("Scroll {}", amount),
            Action::Drag { from, to, .. } => format!("Drag ({}) -> ({})", from, to),
            Action::Move { to } => format!("Move to ({})", to),
            Action::Delay { seconds } => format!("Wait {}s", seconds),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// A validated step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    /// Seconds to wait before the action runs
    pub delay: f64,
    pub action: Action,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            name: action.default_name(),
            delay: DEFAULT_DELAY,
            action,
        }
    }

    /// Blank names fall back to the generated label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.trim().is_empty() {
            self.action.default_name()
        } else {
            name
        };
        self
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    /// Document form; only canonical values are kept.
    pub fn to_record(&self) -> StepRecord {
        let mut record = StepRecord {
            name: Some(self.name.clone()),
            kind: self.kind().as_str().to_string(),
            value: self.action.document_value(),
            delay: Some(self.delay),
            button: None,
            confidence: None,
            interval: None,
            duration: None,
        };
        match &self.action {
            Action::Click { button, .. } => record.button = Some(button.as_str().to_string()),
            Action::Image { confidence, .. } => record.confidence = Some(*confidence),
            Action::Type { interval, .. } => record.interval = Some(*interval),
            Action::Drag { duration, .. } => record.duration = Some(*duration),
            _ => {}
        }
        record
    }
}

/// Step as it appears in a scenario document or comes in from an editor.
/// Nothing here is checked; see [`crate::validate::parse_step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl StepRecord {
    pub fn new(kind: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: None,
            kind: kind.into(),
            value: value.into(),
            delay: None,
            button: None,
            confidence: None,
            interval: None,
            duration: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn button(mut self, button: impl Into<String>) -> Self {
        self.button = Some(button.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn interval(mut self, interval: f64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// 1-based position inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "loop")]
    pub iteration: u32,
    pub step: usize,
}

impl Position {
    pub fn new(iteration: u32, step: usize) -> Self {
        Self { iteration, step }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop {} step {}", self.iteration, self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_aliases() {
        assert_eq!(StepKind::parse("type"), Some(StepKind::Type));
        assert_eq!(StepKind::parse("keypress"), Some(StepKind::Press));
        assert_eq!(StepKind::parse("Hotkey"), Some(StepKind::Hotkey));
        assert_eq!(StepKind::parse("wiggle"), None);
        for kind in StepKind::ALL {
            assert_eq!(StepKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn blank_name_gets_default() {
        let step = Step::new(Action::Click { at: Point::new(10, 20), button: MouseButton::Left })
            .named("   ");
        assert_eq!(step.name, "Click at (10, 20)");

        let step = Step::new(Action::Press { key: "enter".into() }).named("Submit");
        assert_eq!(step.name, "Submit");
    }

    #[test]
    fn record_keeps_kind_specific_fields() {
        let step = Step::new(Action::Drag {
            from: Point::new(1, 2),
            to: Point::new(3, 4),
            duration: 1.5,
        });
        let record = step.to_record();
        assert_eq!(record.kind, "drag");
        assert_eq!(record.value, serde_json::json!([[1, 2], [3, 4]]));
        assert_eq!(record.duration, Some(1.5));
        assert_eq!(record.button, None);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("button").is_none());
        assert_eq!(json["type"], "drag");
    }

    #[test]
    fn display_values() {
        let drag = Action::Drag { from: Point::new(1, 2), to: Point::new(3, 4), duration: 0.5 };
        assert_eq!(drag.display_value(), "1, 2; 3, 4");
        let hotkey = Action::Hotkey { keys: vec!["ctrl".into(), "c".into()] };
        assert_eq!(hotkey.display_value(), "ctrl,c");
        assert_eq!(hotkey.default_name(), "Hotkey: ctrl+c");
    }

    #[test]
    fn long_text_name_truncated() {
        let action = Action::Type { text: "a".repeat(100), interval: DEFAULT_INTERVAL };
        assert!(action.default_name().ends_with("..."));
    }
}
