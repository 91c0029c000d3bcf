//! Cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is cancelled along with `self`, but whose own
    /// cancellation does not reach `self`.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.parent.as_ref().map(|p| p.is_cancelled()).unwrap_or(false)
    }

    /// Sleep for `total`, waking every `poll` to check the flag. `tick` is
    /// called with the remaining time on each wake. Returns `false` if
    /// cancelled before the time ran out.
    pub fn wait(&self, total: Duration, poll: Duration, mut tick: impl FnMut(Duration)) -> bool {
        let deadline = Instant::now() + total;
        let poll = poll.max(Duration::from_millis(1));
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let remaining = deadline - now;
            tick(remaining);
            std::thread::sleep(remaining.min(poll));
        }
    }
}
