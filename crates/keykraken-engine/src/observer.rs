//! Input observation - where recorded events come from
//!
//! The OS-level listener is external; anything that can push
//! [`InputEvent`]s into a channel can drive the recorder.

use crate::events::{InputEvent, TimedEvent};
use crossbeam_channel::Sender;
use keykraken_core::{CancelToken, Error, Result};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Source of global pointer/keyboard events
pub trait InputObserver: Send + Sync {
    /// Start delivering events into `sink` until the subscription is stopped.
    fn subscribe(&self, sink: Sender<InputEvent>) -> Result<Box<dyn Subscription>>;
}

/// Live listener registration
pub trait Subscription: Send {
    /// Stop delivering events. The listener is released when this returns.
    fn stop(self: Box<Self>);
}

/// Observer fed by hand through [`ManualObserver::emit`]
#[derive(Clone, Default)]
pub struct ManualObserver {
    sink: Arc<Mutex<Option<Sender<InputEvent>>>>,
}

impl ManualObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the current subscriber. Returns `false` when
    /// nobody is listening.
    pub fn emit(&self, event: InputEvent) -> bool {
        match self.sink.lock().as_ref() {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink.lock().is_some()
    }
}

impl InputObserver for ManualObserver {
    fn subscribe(&self, sink: Sender<InputEvent>) -> Result<Box<dyn Subscription>> {
        let mut slot = self.sink.lock();
        if slot.is_some() {
            return Err(Error::busy("another recording"));
        }
        *slot = Some(sink);
        Ok(Box::new(ManualSubscription {
            sink: self.sink.clone(),
        }))
    }
}

struct ManualSubscription {
    sink: Arc<Mutex<Option<Sender<InputEvent>>>>,
}

impl Subscription for ManualSubscription {
    fn stop(self: Box<Self>) {
        self.sink.lock().take();
    }
}

/// Replays an event log of JSON lines (see [`TimedEvent`]). Events with a
/// `t` are delivered at that offset from subscription time.
pub struct JsonLinesObserver {
    source: Source,
}

enum Source {
    File(PathBuf),
    Stdin,
}

impl JsonLinesObserver {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
        }
    }

    pub fn stdin() -> Self {
        Self {
            source: Source::Stdin,
        }
    }
}

impl InputObserver for JsonLinesObserver {
    fn subscribe(&self, sink: Sender<InputEvent>) -> Result<Box<dyn Subscription>> {
        let reader: Box<dyn BufRead + Send> = match &self.source {
            Source::File(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
            Source::Stdin => Box::new(BufReader::new(std::io::stdin())),
        };
        let stop = CancelToken::new();
        let stop_reader = stop.clone();
        // Detached: a blocked stdin read cannot be interrupted, the flag
        // stops delivery at the next line.
        thread::spawn(move || pump_lines(reader, sink, stop_reader));
        Ok(Box::new(LogSubscription { stop }))
    }
}

struct LogSubscription {
    stop: CancelToken,
}

impl Subscription for LogSubscription {
    fn stop(self: Box<Self>) {
        self.stop.cancel();
    }
}

fn pump_lines(reader: Box<dyn BufRead + Send>, sink: Sender<InputEvent>, stop: CancelToken) {
    let start = Instant::now();
    for (n, line) in reader.lines().enumerate() {
        if stop.is_cancelled() {
            break;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "event log read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let timed: TimedEvent = match serde_json::from_str(&line) {
            Ok(t) => t,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping malformed event");
                continue;
            }
        };
        if let Some(t) = timed.t {
            let due = Duration::from_millis(t);
            let elapsed = start.elapsed();
            if due > elapsed && !stop.wait(due - elapsed, Duration::from_millis(50), |_| {}) {
                break;
            }
        }
        if sink.send(timed.event).is_err() {
            break;
        }
    }
    debug!("event log finished");
}
