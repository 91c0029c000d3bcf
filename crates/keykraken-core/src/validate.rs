//! Step validation and normalization
//!
//! Two layers:
//! - [`parse_step`] checks shape only (value matches the kind, numbers in
//!   range). Loading documents goes through this.
//! - [`Validator`] adds checks that depend on the environment: keys the
//!   injection backend knows, image files that exist.

use crate::error::{Error, Result};
use crate::keys::KeySet;
use crate::scenario::Scenario;
use crate::step::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

const POINT_SHAPE: &str = "two non-negative integers as [x, y], (x, y) or \"x, y\"";
const DRAG_SHAPE: &str = "two coordinate pairs as \"x1, y1; x2, y2\" or [[x1, y1], [x2, y2]]";

/// Turn a loose record into a typed step. Missing optional fields take
/// their defaults; malformed ones are rejected.
pub fn parse_step(record: &StepRecord) -> Result<Step> {
    let kind = StepKind::parse(&record.kind).ok_or_else(|| {
        Error::validation(
            "type",
            "one of click, image, typewrite, press, hotkey, scroll, drag, move, delay",
        )
        .with_suggestions(vec![format!("Unknown step type '{}'", record.kind)])
    })?;

    let delay = match record.delay {
        Some(d) => non_negative_seconds("delay", d)?,
        None => DEFAULT_DELAY,
    };

    let mut action = parse_value(kind, &record.value)?;
    match &mut action {
        Action::Click { button, .. } => {
            if let Some(raw) = &record.button {
                *button = MouseButton::parse(raw)
                    .ok_or_else(|| Error::validation("button", "left, right or middle"))?;
            }
        }
        Action::Image { confidence, .. } => {
            if let Some(c) = record.confidence {
                if !(c > 0.0 && c <= 1.0) {
                    return Err(Error::validation("confidence", "a number in (0, 1]"));
                }
                *confidence = c;
            }
        }
        Action::Type { interval, .. } => {
            if let Some(i) = record.interval {
                *interval = non_negative_seconds("interval", i)?;
            }
        }
        Action::Drag { duration, .. } => {
            if let Some(d) = record.duration {
                *duration = non_negative_seconds("duration", d)?;
            }
        }
        _ => {}
    }

    let name = record.name.clone().unwrap_or_default();
    Ok(Step::new(action).named(name).with_delay(delay))
}

/// Parse a raw value for `kind`. Kind-specific options (button, confidence,
/// interval, duration) take their defaults.
pub fn parse_value(kind: StepKind, value: &Value) -> Result<Action> {
    Ok(match kind {
        StepKind::Click => Action::Click {
            at: parse_point("value", value)?,
            button: MouseButton::Left,
        },
        StepKind::Move => Action::Move {
            to: parse_point("value", value)?,
        },
        StepKind::Image => {
            let path = non_empty_string(value, "an image file path")?;
            Action::Image {
                path: PathBuf::from(path),
                confidence: DEFAULT_CONFIDENCE,
            }
        }
        StepKind::Type => Action::Type {
            text: text_value(value)?,
            interval: DEFAULT_INTERVAL,
        },
        StepKind::Press => Action::Press {
            key: non_empty_string(value, "a key name")?.trim().to_string(),
        },
        StepKind::Hotkey => Action::Hotkey {
            keys: parse_key_list(value)?,
        },
        StepKind::Scroll => Action::Scroll {
            amount: parse_scroll(value)?,
        },
        StepKind::Drag => {
            let (from, to) = parse_drag(value)?;
            Action::Drag {
                from,
                to,
                duration: DEFAULT_DRAG_DURATION,
            }
        }
        StepKind::Delay => Action::Delay {
            seconds: parse_seconds(value)?,
        },
    })
}

/// Accepts `[x, y]` arrays and the strings `"[x,y]"`, `"(x,y)"`, `"x, y"`.
pub fn parse_point(field: &str, value: &Value) -> Result<Point> {
    let invalid = || Error::validation(field, POINT_SHAPE);
    let (x, y) = match value {
        Value::Array(items) if items.len() == 2 => {
            (integer(&items[0]).ok_or_else(invalid)?, integer(&items[1]).ok_or_else(invalid)?)
        }
        Value::String(s) => {
            let inner = strip_brackets(s.trim());
            let mut parts = inner.split(',').map(str::trim);
            let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(invalid());
            };
            (
                x.parse::<i64>().map_err(|_| invalid())?,
                y.parse::<i64>().map_err(|_| invalid())?,
            )
        }
        _ => return Err(invalid()),
    };
    if x < 0 || y < 0 || x > i32::MAX as i64 || y > i32::MAX as i64 {
        return Err(invalid().with_suggestions(vec![
            "Screen coordinates cannot be negative".to_string(),
        ]));
    }
    Ok(Point::new(x as i32, y as i32))
}

fn parse_drag(value: &Value) -> Result<(Point, Point)> {
    let invalid = || Error::validation("value", DRAG_SHAPE);
    match value {
        Value::Array(items) if items.len() == 2 => {
            Ok((parse_point("value", &items[0])?, parse_point("value", &items[1])?))
        }
        Value::String(s) => {
            let mut parts = s.split(';');
            let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(invalid());
            };
            Ok((
                parse_point("value", &Value::String(a.to_string()))?,
                parse_point("value", &Value::String(b.to_string()))?,
            ))
        }
        _ => Err(invalid()),
    }
}

fn parse_scroll(value: &Value) -> Result<i32> {
    let invalid = || Error::validation("value", "an integer scroll amount (negative scrolls down)");
    let n = match value {
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        other => integer(other).ok_or_else(invalid)?,
    };
    i32::try_from(n).map_err(|_| invalid())
}

fn parse_seconds(value: &Value) -> Result<f64> {
    let invalid = || Error::validation("value", "a non-negative number of seconds");
    let secs = match value {
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    non_negative_seconds("value", secs)
}

fn parse_key_list(value: &Value) -> Result<Vec<String>> {
    let invalid = || Error::validation("value", "a comma-separated list of key names");
    let keys: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|k| k.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .map(|k| k.as_str().map(|s| s.trim().to_string()).ok_or_else(invalid))
            .collect::<Result<_>>()?,
        _ => return Err(invalid()),
    };
    if keys.is_empty() || keys.iter().any(|k| k.is_empty()) {
        return Err(invalid());
    }
    Ok(keys)
}

fn non_negative_seconds(field: &str, secs: f64) -> Result<f64> {
    if secs.is_finite() && secs >= 0.0 {
        Ok(secs)
    } else {
        Err(Error::validation(field, "a non-negative number of seconds"))
    }
}

fn non_empty_string(value: &Value, expected: &str) -> Result<String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(Error::validation("value", expected)),
    }
}

/// Typed text is free-form; numbers from old documents are taken as text.
fn text_value(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::validation("value", "text to type")),
    }
}

fn integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    // Recorders on HiDPI screens sometimes emit 100.0
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
        .map(|f| f as i64)
}

fn strip_brackets(s: &str) -> &str {
    for (open, close) in [('[', ']'), ('(', ')')] {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner;
        }
    }
    s
}

/// Find an image either as given or under `assets_dir`.
pub fn resolve_asset(path: &Path, assets_dir: Option<&Path>) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.is_relative() {
        let candidate = assets_dir?.join(path);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Validation against the environment a scenario will run in
pub struct Validator<'a> {
    keys: &'a dyn KeySet,
    assets_dir: Option<PathBuf>,
}

impl<'a> Validator<'a> {
    pub fn new(keys: &'a dyn KeySet) -> Self {
        Self {
            keys,
            assets_dir: None,
        }
    }

    /// Directory image paths may be relative to
    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    /// Full validation of an incoming record, the gate for committing a
    /// step into a scenario.
    pub fn validate(&self, record: &StepRecord) -> Result<Step> {
        let step = parse_step(record)?;
        self.check(&step)?;
        Ok(step)
    }

    /// Environment checks on an already-typed step
    pub fn check(&self, step: &Step) -> Result<()> {
        match &step.action {
            Action::Press { key } => self.check_key(key),
            Action::Hotkey { keys } => keys.iter().try_for_each(|k| self.check_key(k)),
            Action::Image { path, .. } => {
                if resolve_asset(path, self.assets_dir.as_deref()).is_none() {
                    return Err(Error::validation("value", "an existing image file")
                        .with_context(serde_json::json!({
                            "field": "value",
                            "path": path.display().to_string(),
                        })));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Check every step, reporting the first failure with its 1-based index.
    pub fn check_scenario(&self, scenario: &Scenario) -> Result<()> {
        for (i, step) in scenario.steps.iter().enumerate() {
            self.check(step).map_err(|e| e.at_step(i + 1))?;
        }
        Ok(())
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if self.keys.contains(key) {
            Ok(())
        } else {
            Err(Error::validation("value", "a known key name")
                .with_suggestions(vec![
                    format!("'{}' is not a key the input backend can press", key),
                    "Run `kk keys` to list key names".to_string(),
                ]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::keys::StandardKeys;
    use serde_json::json;

    #[test]
    fn point_forms() {
        let expected = Point::new(100, 200);
        assert_eq!(parse_point("value", &json!([100, 200])).unwrap(), expected);
        assert_eq!(parse_point("value", &json!("[100,200]")).unwrap(), expected);
        assert_eq!(parse_point("value", &json!("(100, 200)")).unwrap(), expected);
        assert_eq!(parse_point("value", &json!(" 100 , 200 ")).unwrap(), expected);
        assert_eq!(parse_point("value", &json!([100.0, 200.0])).unwrap(), expected);
    }

    #[test]
    fn point_rejects() {
        for bad in [json!("100"), json!("1,2,3"), json!([1]), json!("a,b"), json!([-1, 5]), json!(null)] {
            let err = parse_point("value", &bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::Validation);
            assert_eq!(err.field(), Some("value"));
        }
    }

    #[test]
    fn display_value_round_trips() {
        let actions = [
            Action::Click { at: Point::new(0, 0), button: MouseButton::Left },
            Action::Click { at: Point::new(1920, 1080), button: MouseButton::Left },
            Action::Move { to: Point::new(7, 99999) },
            Action::Type { text: "hi, there; [x]".into(), interval: DEFAULT_INTERVAL },
            Action::Press { key: "enter".into() },
            Action::Hotkey { keys: vec!["ctrl".into(), "shift".into(), "t".into()] },
            Action::Scroll { amount: -15 },
            Action::Drag { from: Point::new(1, 2), to: Point::new(300, 400), duration: DEFAULT_DRAG_DURATION },
            Action::Delay { seconds: 0.1 },
            Action::Delay { seconds: 2.0 },
        ];
        for action in actions {
            let reparsed = parse_value(action.kind(), &Value::String(action.display_value())).unwrap();
            assert_eq!(reparsed, action);
            let from_doc = parse_value(action.kind(), &action.document_value()).unwrap();
            assert_eq!(from_doc, action);
        }
    }

    #[test]
    fn scroll_must_be_integer() {
        let err = parse_step(&StepRecord::new("scroll", "abc")).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.field(), Some("value"));
        assert!(err.message.contains("integer"));

        let step = parse_step(&StepRecord::new("scroll", "-3")).unwrap();
        assert_eq!(step.action, Action::Scroll { amount: -3 });
        assert!(parse_step(&StepRecord::new("scroll", 2.5)).is_err());
    }

    #[test]
    fn delay_value_non_negative() {
        assert!(parse_step(&StepRecord::new("delay", -1.0)).is_err());
        assert!(parse_step(&StepRecord::new("delay", "soon")).is_err());
        let step = parse_step(&StepRecord::new("delay", "1.5")).unwrap();
        assert_eq!(step.action, Action::Delay { seconds: 1.5 });
        assert!(parse_step(&StepRecord::new("click", json!([1, 1])).delay(-0.5)).is_err());
    }

    #[test]
    fn defaults_for_missing_fields() {
        let step = parse_step(&StepRecord::new("click", json!([5, 6]))).unwrap();
        assert_eq!(step.delay, DEFAULT_DELAY);
        assert_eq!(step.name, "Click at (5, 6)");
        assert_eq!(step.action, Action::Click { at: Point::new(5, 6), button: MouseButton::Left });

        let step = parse_step(&StepRecord::new("image", "btn.png")).unwrap();
        assert!(matches!(step.action, Action::Image { confidence, .. } if confidence == DEFAULT_CONFIDENCE));
    }

    #[test]
    fn button_and_confidence_checked() {
        let err = parse_step(&StepRecord::new("click", json!([1, 1])).button("back")).unwrap_err();
        assert_eq!(err.field(), Some("button"));
        let step = parse_step(&StepRecord::new("click", json!([1, 1])).button("right")).unwrap();
        assert!(matches!(step.action, Action::Click { button: MouseButton::Right, .. }));

        for bad in [0.0, 1.5, -0.2] {
            let err = parse_step(&StepRecord::new("image", "a.png").confidence(bad)).unwrap_err();
            assert_eq!(err.field(), Some("confidence"));
        }
        assert!(parse_step(&StepRecord::new("image", "a.png").confidence(1.0)).is_ok());
    }

    #[test]
    fn drag_forms() {
        let expected = (Point::new(10, 20), Point::new(30, 40));
        for value in [json!("10,20;30,40"), json!("(10, 20); (30, 40)"), json!([[10, 20], [30, 40]])] {
            let step = parse_step(&StepRecord::new("drag", value).duration(2.0)).unwrap();
            assert_eq!(
                step.action,
                Action::Drag { from: expected.0, to: expected.1, duration: 2.0 }
            );
        }
        assert!(parse_step(&StepRecord::new("drag", "10,20")).is_err());
        assert!(parse_step(&StepRecord::new("drag", "10,20;-1,4")).is_err());
    }

    #[test]
    fn unknown_type_rejected() {
        let err = parse_step(&StepRecord::new("teleport", "x")).unwrap_err();
        assert_eq!(err.field(), Some("type"));
    }

    #[test]
    fn press_needs_known_key() {
        let validator = Validator::new(&StandardKeys);
        assert!(validator.validate(&StepRecord::new("press", "enter")).is_ok());
        let err = validator.validate(&StepRecord::new("keypress", "hyperdrive")).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.field(), Some("value"));
    }

    #[test]
    fn hotkey_checks_every_key() {
        let validator = Validator::new(&StandardKeys);
        let step = validator.validate(&StepRecord::new("hotkey", "ctrl, c")).unwrap();
        assert_eq!(step.action, Action::Hotkey { keys: vec!["ctrl".into(), "c".into()] });
        assert!(validator.validate(&StepRecord::new("hotkey", "ctrl,bogus")).is_err());
        assert!(validator.validate(&StepRecord::new("hotkey", "")).is_err());
        assert!(validator.validate(&StepRecord::new("hotkey", "ctrl,,c")).is_err());
        assert!(validator.validate(&StepRecord::new("hotkey", json!(["alt", "tab"]))).is_ok());
    }

    #[test]
    fn image_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.png"), b"png").unwrap();

        let validator = Validator::new(&StandardKeys).assets_dir(dir.path());
        assert!(validator.validate(&StepRecord::new("image", "ok.png")).is_ok());
        let absolute = dir.path().join("ok.png").display().to_string();
        assert!(Validator::new(&StandardKeys).validate(&StepRecord::new("image", absolute)).is_ok());

        let err = validator.validate(&StepRecord::new("image", "missing.png")).unwrap_err();
        assert_eq!(err.field(), Some("value"));
        assert_eq!(err.context.unwrap()["path"], "missing.png");
    }

    #[test]
    fn scenario_check_reports_index() {
        let mut scenario = Scenario::new("s");
        scenario.push(Step::new(Action::Press { key: "a".into() }));
        scenario.push(Step::new(Action::Press { key: "nope".into() }));
        let err = Validator::new(&StandardKeys).check_scenario(&scenario).unwrap_err();
        assert_eq!(err.context.unwrap()["step_index"], 2);
    }
}
