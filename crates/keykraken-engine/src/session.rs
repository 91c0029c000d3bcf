//! Editing session - owns the scenario and keeps recording, playback and
//! editing from overlapping.
//!
//! Workers never touch the scenario. Recorded steps and playback progress
//! queue up on channels and are applied here, on the owner's thread, by
//! [`Session::poll`].

use crate::executor::{Executor, ExecutorConfig, PlaybackEvent, PlaybackHandle, RunOutcome};
use crate::observer::InputObserver;
use crate::recorder::{RecordMode, Recorder, RecorderConfig, RecordingHandle};
use keykraken_core::{Error, InputInjector, Result, Scenario, Step, StepRecord, Validator};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Idle,
    Recording,
    Playing,
}

enum Activity {
    Idle,
    Recording(RecordingHandle),
    Playing(PlaybackHandle),
}

impl Activity {
    fn kind(&self) -> ActivityKind {
        match self {
            Activity::Idle => ActivityKind::Idle,
            Activity::Recording(_) => ActivityKind::Recording,
            Activity::Playing(_) => ActivityKind::Playing,
        }
    }
}

/// Something that happened since the last [`Session::poll`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StepRecorded { index: usize, name: String },
    /// A recorded step the validator turned away
    StepRejected { name: String, error: Error },
    RecordingStopped { recorded: usize },
    Playback(PlaybackEvent),
}

pub struct Session {
    scenario: Scenario,
    injector: Arc<dyn InputInjector>,
    recorder: Recorder,
    executor_config: ExecutorConfig,
    activity: Activity,
    recorded: usize,
    pending: Vec<SessionEvent>,
    last_outcome: Option<RunOutcome>,
}

impl Session {
    pub fn new(
        scenario: Scenario,
        injector: Arc<dyn InputInjector>,
        observer: Arc<dyn InputObserver>,
    ) -> Self {
        Self {
            scenario,
            injector,
            recorder: Recorder::new(observer),
            executor_config: ExecutorConfig::default(),
            activity: Activity::Idle,
            recorded: 0,
            pending: Vec::new(),
            last_outcome: None,
        }
    }

    pub fn recorder_config(mut self, config: RecorderConfig) -> Self {
        let observer = self.recorder.observer().clone();
        self.recorder = Recorder::with_config(observer, config);
        self
    }

    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn activity(&self) -> ActivityKind {
        self.activity.kind()
    }

    pub fn last_outcome(&self) -> Option<&RunOutcome> {
        self.last_outcome.as_ref()
    }

    /// Validator for the injector and assets this session plays with
    pub fn validator(&self) -> Validator<'_> {
        let validator = Validator::new(self.injector.keys());
        match &self.executor_config.assets_dir {
            Some(dir) => validator.assets_dir(dir),
            None => validator,
        }
    }

    fn ensure_idle(&mut self) -> Result<()> {
        self.reap();
        match self.activity {
            Activity::Idle => Ok(()),
            Activity::Recording(_) => Err(Error::busy("recording")),
            Activity::Playing(_) => Err(Error::busy("playback")),
        }
    }

    /// Direct access to the scenario, for edits that need no validation
    /// (name, description, loop count).
    pub fn edit(&mut self) -> Result<&mut Scenario> {
        self.ensure_idle()?;
        Ok(&mut self.scenario)
    }

    /// Replace the scenario being edited, e.g. with one just loaded.
    pub fn open(&mut self, scenario: Scenario) -> Result<()> {
        self.ensure_idle()?;
        info!(scenario = %scenario.name, steps = scenario.len(), "scenario opened");
        self.scenario = scenario;
        self.last_outcome = None;
        Ok(())
    }

    pub fn new_scenario(&mut self, name: impl Into<String>) -> Result<()> {
        self.open(Scenario::new(name))
    }

    /// Validate and append. Returns the new step's index.
    pub fn add_step(&mut self, record: &StepRecord) -> Result<usize> {
        self.ensure_idle()?;
        let step = self.validator().validate(record)?;
        self.scenario.push(step);
        Ok(self.scenario.len() - 1)
    }

    pub fn insert_step(&mut self, index: usize, record: &StepRecord) -> Result<usize> {
        self.ensure_idle()?;
        let step = self.validator().validate(record)?;
        Ok(self.scenario.insert(index, step))
    }

    /// Validate and swap in for the step at `index`. Returns the old step.
    pub fn replace_step(&mut self, index: usize, record: &StepRecord) -> Result<Step> {
        self.ensure_idle()?;
        let len = self.scenario.len();
        if index >= len {
            return Err(out_of_range(index, len));
        }
        let step = self.validator().validate(record)?;
        self.scenario.replace(index, step).ok_or_else(|| out_of_range(index, len))
    }

    pub fn remove_step(&mut self, index: usize) -> Result<Step> {
        self.ensure_idle()?;
        let len = self.scenario.len();
        self.scenario.remove(index).ok_or_else(|| out_of_range(index, len))
    }

    /// New index, or `None` when already at the top.
    pub fn move_step_up(&mut self, index: usize) -> Result<Option<usize>> {
        self.ensure_idle()?;
        Ok(self.scenario.move_up(index))
    }

    pub fn move_step_down(&mut self, index: usize) -> Result<Option<usize>> {
        self.ensure_idle()?;
        Ok(self.scenario.move_down(index))
    }

    /// Arm the recorder. A recording already in progress is stopped (its
    /// steps kept) and the request is refused.
    pub fn start_recording(&mut self, mode: RecordMode) -> Result<()> {
        self.reap();
        match self.activity {
            Activity::Playing(_) => return Err(Error::busy("playback")),
            Activity::Recording(_) => {
                warn!("recording already active, stopping it");
                self.stop_recording();
                return Err(Error::busy("recording"));
            }
            Activity::Idle => {}
        }
        let handle = self.recorder.start(mode)?;
        self.recorded = 0;
        self.activity = Activity::Recording(handle);
        Ok(())
    }

    /// Disarm and commit what was recorded. Returns the number of steps
    /// added over the whole recording; on an idle session this is a no-op
    /// returning 0.
    pub fn stop_recording(&mut self) -> usize {
        if !matches!(self.activity, Activity::Recording(_)) {
            return 0;
        }
        let mut events = std::mem::take(&mut self.pending);
        self.finish_recording(&mut events);
        self.pending = events;
        self.recorded
    }

    fn finish_recording(&mut self, events: &mut Vec<SessionEvent>) {
        if !matches!(self.activity, Activity::Recording(_)) {
            return;
        }
        if let Activity::Recording(handle) = std::mem::replace(&mut self.activity, Activity::Idle) {
            let steps = handle.stop();
            self.commit(steps, events);
            info!(recorded = self.recorded, "recording committed");
            events.push(SessionEvent::RecordingStopped {
                recorded: self.recorded,
            });
        }
    }

    fn commit(&mut self, steps: Vec<Step>, events: &mut Vec<SessionEvent>) {
        for step in steps {
            if let Err(error) = self.validator().check(&step) {
                warn!(step = %step.name, error = %error, "recorded step rejected");
                events.push(SessionEvent::StepRejected {
                    name: step.name,
                    error,
                });
                continue;
            }
            events.push(SessionEvent::StepRecorded {
                index: self.scenario.len(),
                name: step.name.clone(),
            });
            self.scenario.push(step);
            self.recorded += 1;
        }
    }

    /// Play the scenario on a worker thread. `loops` falls back to the
    /// scenario's own count, then to 1.
    pub fn start_playback(&mut self, loops: Option<u32>) -> Result<()> {
        self.ensure_idle()?;
        let loops = loops.or(self.scenario.loops).unwrap_or(1);
        if self.scenario.is_empty() {
            return Err(Error::validation("steps", "at least one step to play"));
        }
        self.validator().check_scenario(&self.scenario)?;

        let executor = Executor::with_config(self.injector.clone(), self.executor_config.clone());
        let handle = executor.spawn(self.scenario.clone(), loops)?;
        self.last_outcome = None;
        self.activity = Activity::Playing(handle);
        Ok(())
    }

    /// Ask a running playback to stop at its next cancellation point.
    pub fn request_cancel(&self) {
        if let Activity::Playing(handle) = &self.activity {
            handle.cancel();
        }
    }

    /// Cancel playback and wait for it to unwind. `None` when nothing was
    /// playing.
    pub fn stop_playback(&mut self) -> Result<Option<RunOutcome>> {
        if !matches!(self.activity, Activity::Playing(_)) {
            return Ok(None);
        }
        self.request_cancel();
        let mut events = std::mem::take(&mut self.pending);
        let joined = self.finish_playback(&mut events);
        self.pending = events;
        joined?;
        Ok(self.last_outcome.clone())
    }

    fn finish_playback(&mut self, events: &mut Vec<SessionEvent>) -> Result<()> {
        if !matches!(self.activity, Activity::Playing(_)) {
            return Ok(());
        }
        if let Activity::Playing(handle) = std::mem::replace(&mut self.activity, Activity::Idle) {
            let receiver = handle.receiver().clone();
            let joined = handle.join();
            for event in receiver.try_iter() {
                self.observe(&event);
                events.push(SessionEvent::Playback(event));
            }
            self.last_outcome = Some(joined?);
        }
        Ok(())
    }

    fn observe(&mut self, event: &PlaybackEvent) {
        if let PlaybackEvent::Finished { outcome } = event {
            self.last_outcome = Some(outcome.clone());
        }
    }

    /// Apply recorded steps and collect progress. Activities that ended
    /// on their own are torn down here, leaving the session idle.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = std::mem::take(&mut self.pending);
        self.pump(&mut events);
        events
    }

    fn pump(&mut self, events: &mut Vec<SessionEvent>) {
        let mut steps = Vec::new();
        let mut progress = Vec::new();
        let ended = match &self.activity {
            Activity::Idle => false,
            Activity::Recording(handle) => {
                handle.drain(&mut steps);
                !handle.is_armed()
            }
            Activity::Playing(handle) => {
                handle.drain(&mut progress);
                handle.is_finished()
            }
        };

        self.commit(steps, events);
        for event in progress {
            self.observe(&event);
            events.push(SessionEvent::Playback(event));
        }
        if ended {
            self.finish_recording(events);
            if let Err(e) = self.finish_playback(events) {
                warn!(error = %e, "playback ended abnormally");
            }
        }
    }

    /// Tear down activities that ended on their own, keeping their events
    /// for the next poll.
    fn reap(&mut self) {
        let mut events = std::mem::take(&mut self.pending);
        self.pump(&mut events);
        self.pending = events;
    }
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::validation("index", &format!("a step index below {}", len))
        .with_suggestions(vec![format!("There is no step at index {}", index)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InputEvent;
    use crate::executor::RunStatus;
    use crate::observer::ManualObserver;
    use keykraken_core::{Action, DryRunInjector, ErrorCode, MouseButton, Point};
    use std::time::{Duration, Instant};

    fn session() -> (Session, ManualObserver) {
        let observer = ManualObserver::new();
        let session = Session::new(
            Scenario::new("test"),
            Arc::new(DryRunInjector::new()),
            Arc::new(observer.clone()),
        )
        .executor_config(ExecutorConfig::default().poll_interval(Duration::from_millis(5)));
        (session, observer)
    }

    fn poll_until(session: &mut Session, mut done: impl FnMut(&[SessionEvent]) -> bool) -> Vec<SessionEvent> {
        let start = Instant::now();
        let mut all = Vec::new();
        while start.elapsed() < Duration::from_secs(3) {
            all.extend(session.poll());
            if done(&all) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        all
    }

    fn press(key: &str) -> StepRecord {
        StepRecord::new("press", key).delay(0.0)
    }

    #[test]
    fn steps_are_validated_before_commit() {
        let (mut s, _) = session();
        assert_eq!(s.add_step(&StepRecord::new("click", "[10, 20]")).unwrap(), 0);
        let err = s.add_step(&press("hyperdrive")).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
        let err = s.add_step(&StepRecord::new("scroll", "abc")).unwrap_err();
        assert!(err.message.contains("integer"));
        assert_eq!(s.scenario().len(), 1);

        assert_eq!(s.insert_step(0, &press("a")).unwrap(), 0);
        assert_eq!(s.move_step_down(0).unwrap(), Some(1));
        assert!(s.replace_step(5, &press("b")).is_err());
        assert!(s.remove_step(5).is_err());
        assert_eq!(s.remove_step(1).unwrap().action, Action::Press { key: "a".into() });
    }

    #[test]
    fn recording_appends_in_order() {
        let (mut s, observer) = session();
        s.start_recording(RecordMode::Steps).unwrap();
        assert_eq!(s.activity(), ActivityKind::Recording);

        observer.emit(InputEvent::Press { x: 5, y: 6, b: InputEvent::LEFT });
        observer.emit(InputEvent::key_named("tab"));
        observer.emit(InputEvent::Press { x: 7, y: 8, b: InputEvent::RIGHT });
        let events = poll_until(&mut s, |ev| {
            ev.iter().filter(|e| matches!(e, SessionEvent::StepRecorded { .. })).count() == 3
        });
        assert_eq!(
            events.iter().filter(|e| matches!(e, SessionEvent::StepRecorded { .. })).count(),
            3
        );

        assert_eq!(s.stop_recording(), 3);
        assert!(!observer.is_subscribed());
        assert_eq!(s.activity(), ActivityKind::Idle);
        assert_eq!(s.stop_recording(), 0);

        let actions: Vec<_> = s.scenario().steps.iter().map(|st| st.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Action::Click { at: Point::new(5, 6), button: MouseButton::Left },
                Action::Press { key: "tab".into() },
                Action::Click { at: Point::new(7, 8), button: MouseButton::Right },
            ]
        );
    }

    #[test]
    fn activities_exclude_each_other() {
        let (mut s, observer) = session();
        s.add_step(&press("a")).unwrap();

        s.start_recording(RecordMode::Steps).unwrap();
        assert_eq!(s.start_playback(None).unwrap_err().code, ErrorCode::Busy);
        assert_eq!(s.add_step(&press("b")).unwrap_err().code, ErrorCode::Busy);
        assert_eq!(s.edit().unwrap_err().code, ErrorCode::Busy);

        // Second start tears the first one down and is refused
        assert_eq!(s.start_recording(RecordMode::Steps).unwrap_err().code, ErrorCode::Busy);
        assert_eq!(s.activity(), ActivityKind::Idle);
        assert!(!observer.is_subscribed());
        s.start_recording(RecordMode::Steps).unwrap();
        s.stop_recording();

        s.add_step(&StepRecord::new("delay", 30).delay(0.0)).unwrap();
        s.start_playback(Some(1)).unwrap();
        poll_until(&mut s, |ev| {
            ev.iter().any(|e| matches!(e, SessionEvent::Playback(PlaybackEvent::StepExecuted { .. })))
        });
        assert_eq!(s.start_recording(RecordMode::Steps).unwrap_err().code, ErrorCode::Busy);
        assert_eq!(s.remove_step(0).unwrap_err().code, ErrorCode::Busy);

        let outcome = s.stop_playback().unwrap().unwrap();
        assert!(matches!(outcome.status, RunStatus::Cancelled { .. }));
        assert_eq!(outcome.executed, 1);
        assert_eq!(s.activity(), ActivityKind::Idle);
        assert!(s.stop_playback().unwrap().is_none());
    }

    #[test]
    fn playback_reports_through_poll() {
        let (mut s, _) = session();
        s.add_step(&press("a")).unwrap();
        s.add_step(&press("b")).unwrap();
        s.edit().unwrap().loops = Some(3);
        s.start_playback(None).unwrap();

        let events = poll_until(&mut s, |ev| {
            ev.iter().any(|e| matches!(e, SessionEvent::Playback(PlaybackEvent::Finished { .. })))
        });
        let executed = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Playback(PlaybackEvent::StepExecuted { .. })))
            .count();
        assert_eq!(executed, 6);
        assert_eq!(s.last_outcome().unwrap().executed, 6);
        assert_eq!(s.activity(), ActivityKind::Idle);
    }

    #[test]
    fn empty_or_invalid_scenarios_do_not_play() {
        let (mut s, _) = session();
        assert_eq!(s.start_playback(None).unwrap_err().code, ErrorCode::Validation);

        let mut bad = Scenario::new("loaded");
        bad.push(Step::new(Action::Press { key: "hyperdrive".into() }));
        s.open(bad).unwrap();
        let err = s.start_playback(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.starts_with("step 1"));
    }

    #[test]
    fn drag_capture_finishes_by_itself() {
        let (mut s, observer) = session();
        s.start_recording(RecordMode::Drag).unwrap();
        observer.emit(InputEvent::Press { x: 10, y: 10, b: 0 });
        observer.emit(InputEvent::Release { x: 90, y: 40, b: 0 });

        let events = poll_until(&mut s, |ev| {
            ev.iter().any(|e| matches!(e, SessionEvent::RecordingStopped { .. }))
        });
        assert!(events.contains(&SessionEvent::RecordingStopped { recorded: 1 }));
        assert_eq!(s.activity(), ActivityKind::Idle);
        assert!(!observer.is_subscribed());
        assert!(matches!(s.scenario().steps[0].action, Action::Drag { .. }));
    }
}
