//! Macro recorder - turns observed input into steps
//!
//! `Idle -> Armed -> Idle`. Arming subscribes to an [`InputObserver`] and
//! starts a worker thread that synthesizes steps; stopping releases the
//! subscription and joins the worker before returning.

use crate::events::{recorded_button, InputEvent};
use crate::observer::{InputObserver, Subscription};
pub use crossbeam_channel::{Receiver, Sender};
use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};
use keykraken_core::{Action, CancelToken, Point, Result, Step};
use keykraken_core::step::DEFAULT_DRAG_DURATION;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Pre-delay given to recorded clicks and drags, seconds
    pub click_delay: f64,
    /// Pre-delay given to recorded key presses, seconds
    pub key_delay: f64,
    /// Disarm when the pointer comes within this many pixels of the
    /// top-left screen corner. `None` disables the corner stop.
    pub stop_corner: Option<i32>,
    /// How often the worker checks for a stop request
    pub poll_interval: Duration,
    /// Observed events buffered before new ones are dropped
    pub max_buffer: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            click_delay: 0.25,
            key_delay: 0.1,
            stop_corner: Some(2),
            poll_interval: Duration::from_millis(50),
            max_buffer: 10000,
        }
    }
}

/// What an armed recorder captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// Clicks and key presses, one step each
    Steps,
    /// Sum wheel deltas into a single scroll step, emitted on stop
    Scroll,
    /// Next press and release become one drag step; disarms itself
    Drag,
}

/// The recorder
pub struct Recorder {
    config: RecorderConfig,
    observer: Arc<dyn InputObserver>,
}

impl Recorder {
    pub fn new(observer: Arc<dyn InputObserver>) -> Self {
        Self::with_config(observer, RecorderConfig::default())
    }

    pub fn with_config(observer: Arc<dyn InputObserver>, config: RecorderConfig) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn observer(&self) -> &Arc<dyn InputObserver> {
        &self.observer
    }

    /// Arm the recorder. Steps arrive on the handle in event order.
    pub fn start(&self, mode: RecordMode) -> Result<RecordingHandle> {
        let (events_tx, events_rx) = bounded::<InputEvent>(self.config.max_buffer);
        let (steps_tx, steps_rx) = unbounded::<Step>();
        let subscription = self.observer.subscribe(events_tx)?;
        let listener = Arc::new(Mutex::new(Some(subscription)));
        let stop = CancelToken::new();

        let worker = {
            let stop = stop.clone();
            let listener = listener.clone();
            let config = self.config.clone();
            thread::spawn(move || {
                run_worker(events_rx, steps_tx, stop, &listener, config, mode);
                release(&listener);
            })
        };

        info!(?mode, "recording armed");
        Ok(RecordingHandle {
            mode,
            stop,
            steps_rx,
            listener,
            worker: Some(worker),
        })
    }
}

fn release(listener: &Mutex<Option<Box<dyn Subscription>>>) {
    if let Some(sub) = listener.lock().take() {
        sub.stop();
        debug!("input listener released");
    }
}

/// Recording handle - owns the armed session
pub struct RecordingHandle {
    mode: RecordMode,
    stop: CancelToken,
    steps_rx: Receiver<Step>,
    listener: Arc<Mutex<Option<Box<dyn Subscription>>>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl RecordingHandle {
    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    /// False once stopped, including when the recorder disarmed itself
    /// (corner stop, finished drag).
    pub fn is_armed(&self) -> bool {
        !self.stop.is_cancelled()
            && self.worker.as_ref().map(|w| !w.is_finished()).unwrap_or(false)
    }

    /// Move recorded steps into `steps`, in arrival order.
    pub fn drain(&self, steps: &mut Vec<Step>) {
        steps.extend(self.steps_rx.try_iter());
    }

    pub fn try_recv(&self) -> Option<Step> {
        self.steps_rx.try_recv().ok()
    }

    /// Get the step receiver for streaming consumption
    pub fn receiver(&self) -> &Receiver<Step> {
        &self.steps_rx
    }

    /// Disarm, release the listener and return the steps not yet drained.
    pub fn stop(mut self) -> Vec<Step> {
        self.shutdown();
        let mut steps = Vec::new();
        self.drain(&mut steps);
        info!(steps = steps.len(), "recording stopped");
        steps
    }

    fn shutdown(&mut self) {
        self.stop.cancel();
        release(&self.listener);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    events: Receiver<InputEvent>,
    steps: Sender<Step>,
    stop: CancelToken,
    listener: &Mutex<Option<Box<dyn Subscription>>>,
    config: RecorderConfig,
    mode: RecordMode,
) {
    let poll = config.poll_interval;
    let mut synth = Synthesizer::new(mode, config);
    let mut disarmed = false;

    while !stop.is_cancelled() {
        let event = match events.recv_timeout(poll) {
            Ok(e) => e,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if feed(&mut synth, &event, &steps) {
            info!("recorder disarmed itself");
            disarmed = true;
            stop.cancel();
        }
    }

    // Stopped from outside: nothing new arrives once the listener is gone,
    // but everything delivered before that still counts.
    if !disarmed {
        release(listener);
        for event in events.try_iter() {
            if feed(&mut synth, &event, &steps) {
                info!("recorder disarmed itself");
                break;
            }
        }
    }

    if let Some(step) = synth.finish() {
        debug!(step = %step.name, "recorded");
        let _ = steps.send(step);
    }
}

/// Run one event through the synthesizer. Returns true when it disarms.
fn feed(synth: &mut Synthesizer, event: &InputEvent, steps: &Sender<Step>) -> bool {
    let out = synth.handle(event);
    if let Some(step) = out.step {
        debug!(step = %step.name, "recorded");
        let _ = steps.send(step);
    }
    out.disarm
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Synthesized {
    pub step: Option<Step>,
    pub disarm: bool,
}

/// Pure event-to-step logic, run by the worker
pub(crate) struct Synthesizer {
    mode: RecordMode,
    config: RecorderConfig,
    scroll_total: i32,
    scrolled: bool,
    drag_start: Option<Point>,
}

impl Synthesizer {
    pub fn new(mode: RecordMode, config: RecorderConfig) -> Self {
        Self {
            mode,
            config,
            scroll_total: 0,
            scrolled: false,
            drag_start: None,
        }
    }

    fn in_stop_corner(&self, event: &InputEvent) -> bool {
        match (self.config.stop_corner, event) {
            (Some(margin), InputEvent::Move { .. } | InputEvent::Press { .. }) => event
                .position()
                .map(|p| p.x <= margin && p.y <= margin)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn handle(&mut self, event: &InputEvent) -> Synthesized {
        if self.in_stop_corner(event) {
            return Synthesized { step: None, disarm: true };
        }
        match self.mode {
            RecordMode::Steps => Synthesized {
                step: self.step_for(event),
                disarm: false,
            },
            RecordMode::Scroll => {
                if let InputEvent::Scroll { dy, .. } = event {
                    self.scroll_total = self.scroll_total.saturating_add(*dy);
                    self.scrolled = true;
                }
                Synthesized::default()
            }
            RecordMode::Drag => self.drag_for(event),
        }
    }

    fn step_for(&self, event: &InputEvent) -> Option<Step> {
        match event {
            InputEvent::Press { x, y, b } => {
                let button = recorded_button(*b)?;
                let action = Action::Click { at: Point::new(*x, *y), button };
                Some(Step::new(action).with_delay(self.config.click_delay))
            }
            InputEvent::Key { k } if !k.is_empty() => {
                let action = Action::Press { key: k.clone() };
                Some(Step::new(action).with_delay(self.config.key_delay))
            }
            _ => None,
        }
    }

    fn drag_for(&mut self, event: &InputEvent) -> Synthesized {
        match (*event).clone() {
            InputEvent::Press { x, y, b } if recorded_button(b).is_some() => {
                if self.drag_start.is_none() {
                    self.drag_start = Some(Point::new(x, y));
                }
                Synthesized::default()
            }
            InputEvent::Release { x, y, b } if recorded_button(b).is_some() => {
                match self.drag_start.take() {
                    Some(from) => {
                        let action = Action::Drag {
                            from,
                            to: Point::new(x, y),
                            duration: DEFAULT_DRAG_DURATION,
                        };
                        Synthesized {
                            step: Some(Step::new(action).with_delay(self.config.click_delay)),
                            disarm: true,
                        }
                    }
                    None => Synthesized::default(),
                }
            }
            _ => Synthesized::default(),
        }
    }

    /// Step owed when recording ends (scroll mode only)
    pub fn finish(&mut self) -> Option<Step> {
        if self.mode != RecordMode::Scroll || !self.scrolled {
            return None;
        }
        self.scrolled = false;
        let amount = std::mem::take(&mut self.scroll_total);
        Some(Step::new(Action::Scroll { amount }).with_delay(self.config.click_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ManualObserver;
    use keykraken_core::MouseButton;
    use std::time::Instant;

    fn synth(mode: RecordMode) -> Synthesizer {
        Synthesizer::new(mode, RecorderConfig::default())
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(3) {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn clicks_and_keys() {
        let mut s = synth(RecordMode::Steps);
        let click = s.handle(&InputEvent::Press { x: 100, y: 200, b: InputEvent::RIGHT });
        let step = click.step.unwrap();
        assert_eq!(step.action, Action::Click { at: Point::new(100, 200), button: MouseButton::Right });
        assert_eq!(step.delay, 0.25);
        assert_eq!(step.name, "Right click at (100, 200)");

        let key = s.handle(&InputEvent::key_named("enter")).step.unwrap();
        assert_eq!(key.action, Action::Press { key: "enter".into() });
        assert_eq!(key.delay, 0.1);
        assert_eq!(key.name, "Press key: enter");
    }

    #[test]
    fn ignores_unsupported_input() {
        let mut s = synth(RecordMode::Steps);
        assert_eq!(s.handle(&InputEvent::Press { x: 50, y: 50, b: InputEvent::MIDDLE }), Synthesized::default());
        assert_eq!(s.handle(&InputEvent::Release { x: 50, y: 50, b: 0 }), Synthesized::default());
        assert_eq!(s.handle(&InputEvent::Move { x: 50, y: 50 }), Synthesized::default());
        assert_eq!(s.handle(&InputEvent::Scroll { x: 50, y: 50, dy: 1 }), Synthesized::default());
        assert!(s.finish().is_none());
    }

    #[test]
    fn corner_disarms() {
        let mut s = synth(RecordMode::Steps);
        let out = s.handle(&InputEvent::Move { x: 0, y: 1 });
        assert!(out.disarm);
        assert!(out.step.is_none());

        let mut s = Synthesizer::new(
            RecordMode::Steps,
            RecorderConfig { stop_corner: None, ..Default::default() },
        );
        assert!(!s.handle(&InputEvent::Move { x: 0, y: 0 }).disarm);
    }

    #[test]
    fn scroll_accumulates() {
        let mut s = synth(RecordMode::Scroll);
        for dy in [3, 2, -1] {
            s.handle(&InputEvent::Scroll { x: 500, y: 500, dy });
        }
        s.handle(&InputEvent::key_char('a'));
        let step = s.finish().unwrap();
        assert_eq!(step.action, Action::Scroll { amount: 4 });
        assert!(s.finish().is_none());
    }

    #[test]
    fn drag_is_single_shot() {
        let mut s = synth(RecordMode::Drag);
        assert_eq!(s.handle(&InputEvent::Release { x: 9, y: 9, b: 0 }), Synthesized::default());
        assert_eq!(s.handle(&InputEvent::Press { x: 10, y: 20, b: 0 }), Synthesized::default());
        s.handle(&InputEvent::Move { x: 50, y: 60 });
        let out = s.handle(&InputEvent::Release { x: 300, y: 400, b: 0 });
        assert!(out.disarm);
        assert_eq!(
            out.step.unwrap().action,
            Action::Drag { from: Point::new(10, 20), to: Point::new(300, 400), duration: DEFAULT_DRAG_DURATION }
        );
    }

    #[test]
    fn armed_recorder_streams_steps() {
        let observer = ManualObserver::new();
        let recorder = Recorder::new(Arc::new(observer.clone()));
        let handle = recorder.start(RecordMode::Steps).unwrap();
        assert!(handle.is_armed());

        observer.emit(InputEvent::Press { x: 10, y: 10, b: 0 });
        observer.emit(InputEvent::key_char('x'));
        observer.emit(InputEvent::Press { x: 20, y: 20, b: 2 });

        let mut steps = Vec::new();
        assert!(wait_until(|| {
            handle.drain(&mut steps);
            steps.len() == 2
        }));

        let rest = handle.stop();
        assert!(rest.is_empty());
        assert!(!observer.is_subscribed());
        assert_eq!(steps[0].action, Action::Click { at: Point::new(10, 10), button: MouseButton::Left });
        assert_eq!(steps[1].action, Action::Press { key: "x".into() });
    }

    #[test]
    fn scroll_step_delivered_on_stop() {
        let observer = ManualObserver::new();
        let recorder = Recorder::new(Arc::new(observer.clone()));
        let handle = recorder.start(RecordMode::Scroll).unwrap();
        observer.emit(InputEvent::Scroll { x: 1, y: 1, dy: -2 });
        observer.emit(InputEvent::Scroll { x: 1, y: 1, dy: -3 });
        let steps = handle.stop();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action, Action::Scroll { amount: -5 });
    }

    #[test]
    fn stop_keeps_delivered_scrolls() {
        let observer = ManualObserver::new();
        let recorder = Recorder::new(Arc::new(observer.clone()));
        let handle = recorder.start(RecordMode::Scroll).unwrap();
        for _ in 0..200 {
            assert!(observer.emit(InputEvent::Scroll { x: 1, y: 1, dy: 1 }));
        }
        let steps = handle.stop();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action, Action::Scroll { amount: 200 });
    }

    #[test]
    fn stop_keeps_delivered_clicks_in_order() {
        let observer = ManualObserver::new();
        let recorder = Recorder::new(Arc::new(observer.clone()));
        let handle = recorder.start(RecordMode::Steps).unwrap();
        for i in 0..200 {
            assert!(observer.emit(InputEvent::Press { x: 10 + i, y: 10, b: 0 }));
        }
        let steps = handle.stop();
        assert_eq!(steps.len(), 200);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(
                step.action,
                Action::Click { at: Point::new(10 + i as i32, 10), button: MouseButton::Left }
            );
        }
        assert!(!observer.is_subscribed());
    }

    #[test]
    fn drag_mode_disarms_and_releases() {
        let observer = ManualObserver::new();
        let recorder = Recorder::new(Arc::new(observer.clone()));
        let handle = recorder.start(RecordMode::Drag).unwrap();
        observer.emit(InputEvent::Press { x: 5, y: 5, b: 0 });
        observer.emit(InputEvent::Release { x: 80, y: 90, b: 0 });

        assert!(wait_until(|| !handle.is_armed()));
        assert!(wait_until(|| !observer.is_subscribed()));
        let steps = handle.stop();
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0].action, Action::Drag { .. }));
    }

    #[test]
    fn restart_after_stop() {
        let observer = ManualObserver::new();
        let recorder = Recorder::new(Arc::new(observer.clone()));
        recorder.start(RecordMode::Steps).unwrap().stop();
        let handle = recorder.start(RecordMode::Steps).unwrap();
        assert!(observer.is_subscribed());
        drop(handle);
        assert!(!observer.is_subscribed());
    }
}
