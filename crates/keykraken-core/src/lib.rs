//! keykraken-core - macro step model and input primitives
//!
//! Typed steps, their validation rules, and the input-injection
//! capability the playback engine drives.
//!
//! ## Input backends
//!
//! - **Linux**: `xdotool` (X11)
//! - **macOS**: `osascript` + `cliclick`
//! - **Other**: bring your own [`InputInjector`]

pub mod cancel;
pub mod dry_run;
pub mod error;
pub mod input;
pub mod keys;
pub mod platform;
pub mod scenario;
pub mod step;
pub mod validate;

pub use cancel::CancelToken;
pub use dry_run::{DryRunInjector, InjectorCall};
pub use error::{Error, ErrorCode, Result};
pub use input::{InjectResult, InjectionError, InputInjector, PlatformKeys, SystemInjector};
pub use keys::{named_keys, KeySet, StandardKeys};
pub use scenario::{Scenario, FORMAT_VERSION};
pub use step::{Action, MouseButton, Point, Position, Step, StepKind, StepRecord};
pub use validate::{parse_step, parse_value, Validator};

pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::input::{InputInjector, SystemInjector};
    pub use crate::scenario::Scenario;
    pub use crate::step::{Action, MouseButton, Point, Position, Step, StepKind, StepRecord};
    pub use crate::validate::Validator;
}
