//! keykraken-engine - macro recording, playback and storage
//!
//! Turns observed input into steps, plays scenarios back against an
//! [`keykraken_core::InputInjector`], and keeps scenarios on disk.
//!
//! ## Threads
//!
//! - **Recording**: one worker per armed recorder, fed by an [`InputObserver`]
//! - **Playback**: one worker per run, reporting [`PlaybackEvent`]s
//! - **Session**: owns the scenario; applies both on the caller's thread

pub mod batch;
pub mod events;
pub mod executor;
pub mod observer;
pub mod recorder;
pub mod session;
pub mod storage;

pub use batch::{BatchEntry, BatchRunner};
pub use events::{InputEvent, TimedEvent};
pub use executor::{
    Executor, ExecutorConfig, PlaybackEvent, PlaybackHandle, RunOutcome, RunStatus,
};
pub use observer::{InputObserver, JsonLinesObserver, ManualObserver, Subscription};
pub use recorder::{RecordMode, Recorder, RecorderConfig, RecordingHandle};
pub use session::{ActivityKind, Session, SessionEvent};
pub use storage::ScenarioStore;

pub mod prelude {
    pub use crate::batch::BatchRunner;
    pub use crate::events::InputEvent;
    pub use crate::executor::{Executor, ExecutorConfig, PlaybackEvent, RunOutcome, RunStatus};
    pub use crate::observer::{InputObserver, JsonLinesObserver, ManualObserver};
    pub use crate::recorder::{RecordMode, Recorder, RecorderConfig};
    pub use crate::session::{Session, SessionEvent};
    pub use crate::storage::ScenarioStore;
}
