//! # KEYKRAKEN
//!
//! Record, edit and replay desktop input macros.
//!
//! ## Features
//!
//! - **Recording**: Clicks and key presses become steps as they happen
//! - **Playback**: Looping, cancellable, with image-targeted clicks
//! - **Storage**: One JSON document per scenario
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keykraken::prelude::*;
//! use std::sync::Arc;
//!
//! let store = ScenarioStore::new()?;
//! let scenario = store.load("morning")?;
//!
//! let executor = Executor::new(Arc::new(SystemInjector::new()));
//! let outcome = executor.execute(&scenario, 2, &CancelToken::new(), |event| {
//!     println!("{:?}", event);
//! })?;
//! println!("executed {} steps", outcome.executed);
//! # Ok::<(), keykraken::Error>(())
//! ```

// Re-export the step model
pub use keykraken_core::*;

// Re-export the engine
pub use keykraken_engine as engine;

pub use keykraken_engine::{
    BatchEntry, BatchRunner, Executor, ExecutorConfig, InputEvent, InputObserver,
    JsonLinesObserver, ManualObserver, PlaybackEvent, PlaybackHandle, RecordMode, Recorder,
    RecorderConfig, RecordingHandle, RunOutcome, RunStatus, ScenarioStore, Session,
    SessionEvent,
};

/// Prelude - import everything you need
pub mod prelude {
    pub use keykraken_core::prelude::*;
    pub use keykraken_engine::prelude::*;
}
