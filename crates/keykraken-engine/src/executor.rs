//! Playback engine - walks a scenario across loops and drives the injector
//!
//! Runs synchronously through [`Executor::execute`], or on a worker thread
//! through [`Executor::spawn`] with progress delivered over a channel.
//! Cancellation is cooperative: delays, countdowns and image retry pauses
//! poll the [`CancelToken`]; a primitive already in flight runs to completion.

use crossbeam_channel::{unbounded, Receiver};
use keykraken_core::validate::resolve_asset;
use keykraken_core::{
    Action, CancelToken, Error, ErrorCode, InputInjector, MouseButton, Position, Result, Scenario,
    Step,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Longest single wait honored; anything beyond is clamped.
const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Locate attempts for an image step before it fails
    pub image_attempts: u32,
    /// Pause between locate attempts
    pub image_retry_pause: Duration,
    /// Cancellation polling granularity during waits
    pub poll_interval: Duration,
    /// Countdown before the first loop
    pub start_delay: Duration,
    /// Abort the whole run on the first failing step. When false, failed
    /// steps are reported and playback moves on to the next one.
    pub abort_on_failure: bool,
    /// Directory relative image paths resolve against
    pub assets_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            image_attempts: 3,
            image_retry_pause: Duration::from_secs(1),
            poll_interval: Duration::from_millis(50),
            start_delay: Duration::ZERO,
            abort_on_failure: true,
            assets_dir: None,
        }
    }
}

impl ExecutorConfig {
    pub fn image_attempts(mut self, attempts: u32) -> Self {
        self.image_attempts = attempts.max(1);
        self
    }

    pub fn image_retry_pause(mut self, pause: Duration) -> Self {
        self.image_retry_pause = pause;
        self
    }

    pub fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll_interval = poll;
        self
    }

    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = abort;
        self
    }

    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }
}

/// Progress notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Started {
        scenario: String,
        steps: usize,
        loops: u32,
    },
    /// Pre-run countdown, whole seconds left
    Countdown { remaining_secs: u64 },
    LoopStarted {
        #[serde(rename = "loop")]
        iteration: u32,
        total: u32,
    },
    /// Waiting out a step's delay
    Waiting { at: Position, remaining_secs: u64 },
    StepExecuted { at: Position, description: String },
    ImageRetry {
        at: Position,
        attempt: u32,
        attempts: u32,
    },
    StepFailed { at: Position, error: Error },
    Finished { outcome: RunOutcome },
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped on request; every step up to `last_completed` ran, none after
    Cancelled { last_completed: Option<Position> },
    Failed {
        at: Position,
        step: String,
        error: Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    #[serde(flatten)]
    pub status: RunStatus,
    /// Steps executed across all loops
    pub executed: usize,
    /// Steps that failed without aborting the run
    #[serde(skip_serializing_if = "is_zero")]
    pub failed: usize,
    pub loops: u32,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled { .. })
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.status {
            RunStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

enum Dispatch {
    Done,
    Interrupted,
}

/// Bookkeeping for one run
struct Run {
    loops: u32,
    executed: usize,
    failed: usize,
    last: Option<Position>,
}

impl Run {
    fn outcome(&self, status: RunStatus) -> RunOutcome {
        RunOutcome {
            status,
            executed: self.executed,
            failed: self.failed,
            loops: self.loops,
        }
    }
}

/// The playback engine
#[derive(Clone)]
pub struct Executor {
    injector: Arc<dyn InputInjector>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(injector: Arc<dyn InputInjector>) -> Self {
        Self::with_config(injector, ExecutorConfig::default())
    }

    pub fn with_config(injector: Arc<dyn InputInjector>, config: ExecutorConfig) -> Self {
        Self { injector, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn injector(&self) -> &Arc<dyn InputInjector> {
        &self.injector
    }

    /// Play `scenario` `loops` times. Step failures end up in the outcome;
    /// only a zero loop count is an error.
    pub fn execute(
        &self,
        scenario: &Scenario,
        loops: u32,
        cancel: &CancelToken,
        mut emit: impl FnMut(PlaybackEvent),
    ) -> Result<RunOutcome> {
        if loops == 0 {
            return Err(Error::validation("loops", "a positive integer"));
        }
        info!(scenario = %scenario.name, steps = scenario.len(), loops, "playback started");
        emit(PlaybackEvent::Started {
            scenario: scenario.name.clone(),
            steps: scenario.len(),
            loops,
        });

        let mut run = Run {
            loops,
            executed: 0,
            failed: 0,
            last: None,
        };
        let status = self.run_loops(scenario, &mut run, cancel, &mut emit);
        let outcome = run.outcome(status);

        match &outcome.status {
            RunStatus::Completed => info!(executed = outcome.executed, "playback completed"),
            RunStatus::Cancelled { last_completed } => {
                info!(executed = outcome.executed, ?last_completed, "playback stopped by user")
            }
            RunStatus::Failed { at, .. } => {
                warn!(executed = outcome.executed, %at, "playback aborted")
            }
        }
        emit(PlaybackEvent::Finished {
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    fn run_loops(
        &self,
        scenario: &Scenario,
        run: &mut Run,
        cancel: &CancelToken,
        emit: &mut dyn FnMut(PlaybackEvent),
    ) -> RunStatus {
        if !self.config.start_delay.is_zero() && !self.countdown(cancel, emit) {
            return RunStatus::Cancelled { last_completed: None };
        }

        for iteration in 1..=run.loops {
            if cancel.is_cancelled() {
                return RunStatus::Cancelled { last_completed: run.last };
            }
            debug!(iteration, total = run.loops, "loop started");
            emit(PlaybackEvent::LoopStarted {
                iteration,
                total: run.loops,
            });

            for (i, step) in scenario.steps.iter().enumerate() {
                let at = Position::new(iteration, i + 1);
                if cancel.is_cancelled() {
                    return RunStatus::Cancelled { last_completed: run.last };
                }
                if !self.wait_step(step.delay, at, cancel, emit) {
                    return RunStatus::Cancelled { last_completed: run.last };
                }

                match self.dispatch(step, at, cancel, emit) {
                    Ok(Dispatch::Done) => {
                        run.executed += 1;
                        run.last = Some(at);
                        debug!(%at, step = %step.name, "step executed");
                        emit(PlaybackEvent::StepExecuted {
                            at,
                            description: step.name.clone(),
                        });
                    }
                    Ok(Dispatch::Interrupted) => {
                        return RunStatus::Cancelled { last_completed: run.last };
                    }
                    Err(e) => {
                        let err = Error::step_execution(at, &step.name, &e.message);
                        error!(%at, step = %step.name, error = %e.message, "step failed");
                        emit(PlaybackEvent::StepFailed {
                            at,
                            error: err.clone(),
                        });
                        if self.config.abort_on_failure {
                            cancel.cancel();
                            return RunStatus::Failed {
                                at,
                                step: step.name.clone(),
                                error: err,
                            };
                        }
                        run.failed += 1;
                    }
                }
            }
        }
        RunStatus::Completed
    }

    fn countdown(&self, cancel: &CancelToken, emit: &mut dyn FnMut(PlaybackEvent)) -> bool {
        let mut shown = None;
        cancel.wait(self.config.start_delay, self.config.poll_interval, |left| {
            let secs = whole_seconds(left);
            if shown != Some(secs) {
                shown = Some(secs);
                emit(PlaybackEvent::Countdown { remaining_secs: secs });
            }
        })
    }

    /// Wait out `seconds`, reporting each whole second left. Returns false
    /// when cancelled.
    fn wait_step(
        &self,
        seconds: f64,
        at: Position,
        cancel: &CancelToken,
        emit: &mut dyn FnMut(PlaybackEvent),
    ) -> bool {
        let total = duration(seconds);
        if total.is_zero() {
            return !cancel.is_cancelled();
        }
        let mut shown = None;
        cancel.wait(total, self.config.poll_interval, |left| {
            let secs = whole_seconds(left);
            if shown != Some(secs) {
                shown = Some(secs);
                emit(PlaybackEvent::Waiting {
                    at,
                    remaining_secs: secs,
                });
            }
        })
    }

    fn dispatch(
        &self,
        step: &Step,
        at: Position,
        cancel: &CancelToken,
        emit: &mut dyn FnMut(PlaybackEvent),
    ) -> Result<Dispatch> {
        let inj = &self.injector;
        match &step.action {
            Action::Click { at: point, button } => inj.click(*point, *button)?,
            Action::Move { to } => inj.move_to(*to)?,
            Action::Type { text, interval } => inj.write(text, *interval)?,
            Action::Press { key } => inj.press(key)?,
            Action::Hotkey { keys } => inj.hotkey(keys)?,
            Action::Scroll { amount } => inj.scroll(*amount)?,
            Action::Drag { from, to, duration } => {
                inj.move_to(*from)?;
                inj.drag_to(*to, *duration)?;
            }
            Action::Delay { seconds } => {
                if !self.wait_step(*seconds, at, cancel, emit) {
                    return Ok(Dispatch::Interrupted);
                }
            }
            Action::Image { path, confidence } => {
                return self.click_image(path, *confidence, at, cancel, emit);
            }
        }
        Ok(Dispatch::Done)
    }

    fn click_image(
        &self,
        path: &std::path::Path,
        confidence: f64,
        at: Position,
        cancel: &CancelToken,
        emit: &mut dyn FnMut(PlaybackEvent),
    ) -> Result<Dispatch> {
        let target = resolve_asset(path, self.config.assets_dir.as_deref())
            .unwrap_or_else(|| path.to_path_buf());
        let attempts = self.config.image_attempts.max(1);

        for attempt in 1..=attempts {
            if let Some(center) = self.injector.locate_center_on_screen(&target, confidence)? {
                debug!(%at, x = center.x, y = center.y, attempt, "image located");
                self.injector.click(center, MouseButton::Left)?;
                return Ok(Dispatch::Done);
            }
            if attempt < attempts {
                info!(%at, attempt, attempts, image = %target.display(), "image not found, retrying");
                emit(PlaybackEvent::ImageRetry {
                    at,
                    attempt,
                    attempts,
                });
                if !cancel.wait(self.config.image_retry_pause, self.config.poll_interval, |_| {}) {
                    return Ok(Dispatch::Interrupted);
                }
            }
        }
        Err(Error::new(
            ErrorCode::StepExecution,
            format!(
                "image {} not found on screen after {} attempts",
                path.display(),
                attempts
            ),
        ))
    }

    /// Run on a worker thread. Events, ending with `Finished`, arrive on
    /// the handle's receiver.
    pub fn spawn(&self, scenario: Scenario, loops: u32) -> Result<PlaybackHandle> {
        if loops == 0 {
            return Err(Error::validation("loops", "a positive integer"));
        }
        let (tx, rx) = unbounded();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let executor = self.clone();

        let worker = thread::Builder::new()
            .name("kk-playback".to_string())
            .spawn(move || {
                executor.execute(&scenario, loops, &token, |event| {
                    let _ = tx.send(event);
                })
            })?;

        Ok(PlaybackHandle {
            cancel,
            events: rx,
            worker: Some(worker),
        })
    }
}

fn duration(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(seconds.min(MAX_WAIT.as_secs_f64()))
}

fn whole_seconds(d: Duration) -> u64 {
    d.as_secs_f64().ceil() as u64
}

/// A run in progress on its own thread
pub struct PlaybackHandle {
    cancel: CancelToken,
    events: Receiver<PlaybackEvent>,
    worker: Option<thread::JoinHandle<Result<RunOutcome>>>,
}

impl PlaybackHandle {
    /// Ask the run to stop at the next cancellation point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map(|w| w.is_finished()).unwrap_or(true)
    }

    pub fn try_recv(&self) -> Option<PlaybackEvent> {
        self.events.try_recv().ok()
    }

    /// Move pending events into `out`, in emission order.
    pub fn drain(&self, out: &mut Vec<PlaybackEvent>) {
        out.extend(self.events.try_iter());
    }

    pub fn receiver(&self) -> &Receiver<PlaybackEvent> {
        &self.events
    }

    /// Block until the run ends.
    pub fn join(mut self) -> Result<RunOutcome> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| Error::new(ErrorCode::Unknown, "playback thread panicked"))?,
            None => Err(Error::new(ErrorCode::Unknown, "playback already joined")),
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.cancel.cancel();
            let _ = worker.join();
        }
    }
}
