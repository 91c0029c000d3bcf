//! Scenario storage - one pretty-printed JSON document per scenario name

use anyhow::Context;
use keykraken_core::{parse_step, Error, Result, Scenario, StepRecord, FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Format tags this store can read. Documents without one are taken as 1.0.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1", "1.2"];

const EXTENSION: &str = "json";

/// On-disk shape
#[derive(Debug, Serialize, Deserialize)]
struct ScenarioDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    description: String,
    steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    loops: Option<u32>,
}

pub struct ScenarioStore {
    dir: PathBuf,
}

impl ScenarioStore {
    /// `$KEYKRAKEN_HOME` if set, otherwise `~/.keykraken/scenarios`.
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os("KEYKRAKEN_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var("HOME").context("HOME not set")?;
                PathBuf::from(home).join(".keykraken").join("scenarios")
            }
        };
        Self::with_dir(dir)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write `scenario`, replacing any document of the same name. Stamps
    /// the format version and save time onto the scenario.
    pub fn save(&self, scenario: &mut Scenario) -> Result<PathBuf> {
        let path = self.document_path(&scenario.name)?;
        let saved_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let doc = ScenarioDocument {
            version: Some(FORMAT_VERSION.to_string()),
            name: Some(scenario.name.clone()),
            description: scenario.description.clone(),
            steps: scenario.steps.iter().map(|s| s.to_record()).collect(),
            saved_at: Some(saved_at.clone()),
            loops: scenario.loops,
        };
        let mut json = serde_json::to_string_pretty(&doc)
            .map_err(|e| Error::format(&scenario.name, &e.to_string()))?;
        json.push('\n');
        fs::write(&path, json)?;

        scenario.version = FORMAT_VERSION.to_string();
        scenario.saved_at = Some(saved_at);
        info!(scenario = %scenario.name, steps = scenario.len(), path = %path.display(), "scenario saved");
        Ok(path)
    }

    /// Read a scenario back. Accepts the wrapped document and the legacy
    /// bare array of steps.
    pub fn load(&self, name: &str) -> Result<Scenario> {
        let path = self.document_path(name)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::not_found(name)),
            Err(e) => return Err(e.into()),
        };
        let scenario = parse_document(name, &raw)?;
        debug!(scenario = %name, steps = scenario.len(), version = %scenario.version, "scenario loaded");
        Ok(scenario)
    }

    /// Scenario names, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a document. Returns whether one existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.document_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(scenario = %name, "scenario deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.document_path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, EXTENSION)))
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(Error::validation("name", "a scenario name without path separators")
            .with_suggestions(vec![format!("'{}' cannot be used as a file name", name)]));
    }
    Ok(())
}

fn parse_document(name: &str, raw: &str) -> Result<Scenario> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::format(name, &format!("invalid JSON: {}", e)))?;

    let legacy = match &value {
        Value::Array(_) => true,
        Value::Object(map) if map.contains_key("steps") => false,
        Value::Object(_) => return Err(Error::format(name, "missing \"steps\"")),
        _ => return Err(Error::format(name, "expected an object or an array of steps")),
    };
    let shape = |e: serde_json::Error| Error::format(name, &e.to_string());
    let doc = if legacy {
        ScenarioDocument {
            version: None,
            name: None,
            description: String::new(),
            steps: serde_json::from_value(value).map_err(shape)?,
            saved_at: None,
            loops: None,
        }
    } else {
        serde_json::from_value::<ScenarioDocument>(value).map_err(shape)?
    };

    let version = doc.version.unwrap_or_else(|| "1.0".to_string());
    if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
        return Err(Error::format(name, &format!("unsupported format version {}", version))
            .with_suggestions(vec![format!("Supported versions: {}", SUPPORTED_VERSIONS.join(", "))]));
    }

    let mut steps = Vec::with_capacity(doc.steps.len());
    for (i, record) in doc.steps.iter().enumerate() {
        let step = parse_step(record).map_err(|e| {
            Error::format(name, &format!("step {}: {}", i + 1, e.message)).with_context(
                serde_json::json!({
                    "scenario": name,
                    "step_index": i + 1,
                    "field": e.field(),
                }),
            )
        })?;
        steps.push(step);
    }

    if let Some(stored) = doc.name.as_deref().filter(|n| *n != name) {
        debug!(stored, key = name, "document name differs from its key");
    }

    Ok(Scenario {
        name: name.to_string(),
        description: doc.description,
        steps,
        version,
        saved_at: doc.saved_at,
        loops: doc.loops,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keykraken_core::{Action, ErrorCode, MouseButton, Point, Step};
    use keykraken_core::step::DEFAULT_DELAY;

    fn store() -> (tempfile::TempDir, ScenarioStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScenarioStore::with_dir(dir.path()).unwrap();
        (dir, store)
    }

    fn sample() -> Scenario {
        Scenario::new("morning").description("open mail").with_steps(vec![
            Step::new(Action::Click { at: Point::new(100, 100), button: MouseButton::Right }).with_delay(0.0),
            Step::new(Action::Type { text: "hello".into(), interval: 0.1 }).named("greet"),
            Step::new(Action::Hotkey { keys: vec!["ctrl".into(), "s".into()] }),
            Step::new(Action::Drag { from: Point::new(1, 2), to: Point::new(3, 4), duration: 1.5 }),
            Step::new(Action::Scroll { amount: -5 }),
            Step::new(Action::Delay { seconds: 2.5 }),
        ])
    }

    #[test]
    fn save_then_load() {
        let (_dir, store) = store();
        let mut scenario = sample();
        scenario.loops = Some(4);
        let path = store.save(&mut scenario).unwrap();
        assert!(path.ends_with("morning.json"));
        assert!(scenario.saved_at.is_some());

        let loaded = store.load("morning").unwrap();
        assert_eq!(loaded.steps, scenario.steps);
        assert_eq!(loaded.description, "open mail");
        assert_eq!(loaded.version, FORMAT_VERSION);
        assert_eq!(loaded.loops, Some(4));
        assert_eq!(loaded, scenario);
    }

    #[test]
    fn document_shape() {
        let (dir, store) = store();
        store.save(&mut sample()).unwrap();
        let raw = fs::read_to_string(dir.path().join("morning.json")).unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["version"], "1.2");
        assert_eq!(doc["name"], "morning");
        assert_eq!(doc["steps"][0]["type"], "click");
        assert_eq!(doc["steps"][0]["value"], serde_json::json!([100, 100]));
        assert_eq!(doc["steps"][0]["button"], "right");
        assert_eq!(doc["steps"][1]["type"], "typewrite");
        assert!(doc["saved_at"].is_string());
        assert!(doc.get("loops").is_none());
    }

    #[test]
    fn legacy_bare_array() {
        let (dir, store) = store();
        fs::write(
            dir.path().join("old.json"),
            r#"[
                {"type": "click", "value": [10, 20]},
                {"type": "keypress", "value": "enter", "name": "Submit"},
                {"type": "type", "value": "abc", "delay": 1}
            ]"#,
        )
        .unwrap();

        let s = store.load("old").unwrap();
        assert_eq!(s.description, "");
        assert_eq!(s.len(), 3);
        assert_eq!(s.version, "1.0");
        assert_eq!(s.steps[0].delay, DEFAULT_DELAY);
        assert_eq!(s.steps[0].action, Action::Click { at: Point::new(10, 20), button: MouseButton::Left });
        assert_eq!(s.steps[0].name, "Click at (10, 20)");
        assert_eq!(s.steps[1].name, "Submit");
        assert_eq!(s.steps[2].delay, 1.0);
    }

    #[test]
    fn missing_document() {
        let (_dir, store) = store();
        assert_eq!(store.load("nope").unwrap_err().code, ErrorCode::NotFound);
    }

    #[test]
    fn format_errors() {
        let (dir, store) = store();
        let cases = [
            ("broken", "{not json"),
            ("nosteps", r#"{"version": "1.2", "name": "x"}"#),
            ("future", r#"{"version": "9.0", "steps": []}"#),
            ("scalar", "42"),
            ("badstep", r#"{"steps": [{"type": "press", "value": "a"}, {"type": "scroll", "value": "abc"}]}"#),
            ("badkind", r#"[{"type": "teleport", "value": 1}]"#),
        ];
        for (name, body) in cases {
            fs::write(dir.path().join(format!("{}.json", name)), body).unwrap();
            let err = store.load(name).unwrap_err();
            assert_eq!(err.code, ErrorCode::Format, "{}", name);
        }

        let err = store.load("badstep").unwrap_err();
        assert!(err.message.contains("step 2"));
        assert!(err.message.contains("integer"));
        assert_eq!(err.context.unwrap()["step_index"], 2);
    }

    #[test]
    fn list_and_delete() {
        let (dir, store) = store();
        for name in ["b", "a", "c"] {
            store.save(&mut Scenario::new(name)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert_eq!(store.list().unwrap(), ["a", "b", "c"]);

        assert!(store.delete("b").unwrap());
        assert!(!store.delete("b").unwrap());
        assert!(!store.exists("b"));
        assert_eq!(store.list().unwrap(), ["a", "c"]);
    }

    #[test]
    fn rejects_path_names() {
        let (_dir, store) = store();
        for name in ["", "../x", "a/b", ".hidden"] {
            let err = store.save(&mut Scenario::new(name)).unwrap_err();
            assert_eq!(err.code, ErrorCode::Validation);
        }
    }

    #[test]
    fn overwrite_replaces() {
        let (_dir, store) = store();
        let mut s = sample();
        store.save(&mut s).unwrap();
        s.steps.truncate(1);
        store.save(&mut s).unwrap();
        assert_eq!(store.load("morning").unwrap().len(), 1);
    }
}
