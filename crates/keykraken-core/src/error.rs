//! Structured errors, serializable so front-ends can print them as JSON

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::step::Position;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A step field is malformed
    Validation,
    /// No scenario document under that name
    NotFound,
    /// Scenario document exists but cannot be understood
    Format,
    /// An injection primitive failed during playback
    StepExecution,
    /// A mutually exclusive activity is running
    Busy,
    Io,
    NotImplemented,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Malformed step field. `expected` describes the accepted shape.
    pub fn validation(field: &str, expected: &str) -> Self {
        Self::new(ErrorCode::Validation, format!("Invalid {}: expected {}", field, expected))
            .with_context(serde_json::json!({ "field": field }))
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("Scenario not found: {}", name))
            .with_context(serde_json::json!({ "scenario": name }))
    }

    pub fn format(name: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::Format,
            format!("Scenario '{}' is not a valid document: {}", name, reason),
        )
        .with_context(serde_json::json!({ "scenario": name }))
    }

    pub fn step_execution(at: Position, step: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::StepExecution,
            format!(
                "Step {} '{}' failed in loop {}: {}",
                at.step, step, at.iteration, reason
            ),
        )
        .with_context(serde_json::json!({
            "loop": at.iteration,
            "step": at.step,
            "name": step,
        }))
    }

    pub fn busy(activity: &str) -> Self {
        Self::new(ErrorCode::Busy, format!("Cannot do that while {} is active", activity))
            .with_context(serde_json::json!({ "activity": activity }))
    }

    /// Attach the 1-based index of the step that produced this error.
    pub fn at_step(mut self, index: usize) -> Self {
        self.message = format!("step {}: {}", index, self.message);
        let mut ctx = match self.context.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        ctx.insert("step_index".to_string(), serde_json::json!(index));
        self.context = Some(serde_json::Value::Object(ctx));
        self
    }

    /// The offending field recorded by [`Error::validation`], if any.
    pub fn field(&self) -> Option<&str> {
        self.context.as_ref()?.get("field")?.as_str()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}

impl From<crate::input::InjectionError> for Error {
    fn from(e: crate::input::InjectionError) -> Self {
        let code = match e {
            crate::input::InjectionError::Unsupported(_) => ErrorCode::NotImplemented,
            _ => ErrorCode::StepExecution,
        };
        Self::new(code, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_names_field() {
        let e = Error::validation("value", "an integer scroll amount");
        assert_eq!(e.code, ErrorCode::Validation);
        assert_eq!(e.field(), Some("value"));
        assert!(e.message.contains("integer"));
    }

    #[test]
    fn at_step_keeps_field() {
        let e = Error::validation("button", "left, right or middle").at_step(3);
        assert_eq!(e.field(), Some("button"));
        assert!(e.message.starts_with("step 3:"));
        assert_eq!(e.context.unwrap()["step_index"], 3);
    }

    #[test]
    fn serializes_code_screaming() {
        let json = serde_json::to_string(&Error::busy("recording")).unwrap();
        assert!(json.contains("\"BUSY\""));
    }
}
