//! kk - KeyKraken CLI
//!
//! Record, edit and replay desktop input macros. Results are printed as
//! JSON on stdout; logs and playback progress go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keykraken::engine::ActivityKind;
use keykraken::keys::{is_modifier, named_keys};
use keykraken::prelude::*;
use keykraken::{BatchRunner, DryRunInjector, InputObserver, JsonLinesObserver, ManualObserver};

const POLL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "kk")]
#[command(about = "KeyKraken - record, edit and replay desktop input macros")]
#[command(version)]
struct Cli {
    /// Scenario directory
    #[arg(long, global = true, env = "KEYKRAKEN_DIR")]
    dir: Option<PathBuf>,
    /// Log injected input instead of performing it
    #[arg(long, global = true)]
    dry_run: bool,
    /// Directory image paths are relative to (default: scenario directory)
    #[arg(long, global = true)]
    assets: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // === Scenarios ===
    /// List saved scenarios
    List,
    /// Show a scenario's steps
    Show { name: String },
    /// Create an empty scenario
    New {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Default loop count for `run`
        #[arg(long)]
        loops: Option<u32>,
    },
    /// Delete a scenario
    Delete { name: String },

    // === Editing ===
    /// Validate and add a step
    AddStep {
        name: String,
        /// click, image, typewrite, press, hotkey, scroll, drag, move, delay
        kind: String,
        value: String,
        /// Step label
        #[arg(long)]
        label: Option<String>,
        /// Seconds to wait before the step
        #[arg(long)]
        delay: Option<f64>,
        #[arg(long)]
        button: Option<String>,
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long)]
        interval: Option<f64>,
        #[arg(long)]
        duration: Option<f64>,
        /// Insert at this 1-based position instead of appending
        #[arg(long)]
        at: Option<usize>,
    },
    /// Remove a step by 1-based position
    RemoveStep { name: String, index: usize },
    /// Move a step up or down by one
    MoveStep {
        name: String,
        index: usize,
        #[arg(value_enum)]
        direction: Direction,
    },
    /// Check every step against the current key table and assets
    Validate { name: String },
    /// List key names accepted by press and hotkey steps
    Keys,

    // === Playback ===
    /// Play a scenario
    Run {
        name: String,
        /// Defaults to the scenario's own loop count, then 1
        #[arg(short, long)]
        loops: Option<u32>,
        /// Seconds to wait before the first step
        #[arg(long, default_value = "3")]
        countdown: u64,
        /// Report failing steps and keep going instead of aborting
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Play several scenarios back to back (all of them if none given)
    RunAll {
        names: Vec<String>,
        #[arg(short, long)]
        loops: Option<u32>,
        /// Milliseconds between scenarios
        #[arg(long, default_value = "1000")]
        gap_ms: u64,
        #[arg(long, default_value = "3")]
        countdown: u64,
    },

    // === Recording ===
    /// Record input into a scenario (Ctrl+C to stop)
    Record {
        name: String,
        #[arg(short, long, value_enum, default_value = "steps")]
        mode: Mode,
        /// Observed input events as JSON lines, `-` for stdin
        ///
        /// The recording ends at end of input. After Ctrl+C a stdin reader
        /// stays blocked until the next line or EOF arrives.
        #[arg(long)]
        events: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Up,
    Down,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Steps,
    Scroll,
    Drag,
}

impl From<Mode> for RecordMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Steps => RecordMode::Steps,
            Mode::Scroll => RecordMode::Scroll,
            Mode::Drag => RecordMode::Drag,
        }
    }
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error: {}", e),
    }
}

/// One compact JSON line on stderr
fn progress<T: Serialize>(event: &T) {
    if let Ok(s) = serde_json::to_string(event) {
        eprintln!("{}", s);
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = Context::new(&cli).map_err(anyhow::Error::from).and_then(|ctx| match cli.command {
        Commands::List => list(&ctx),
        Commands::Show { name } => show(&ctx, &name),
        Commands::New { name, description, loops } => new(&ctx, &name, &description, loops),
        Commands::Delete { name } => delete(&ctx, &name),
        Commands::AddStep { name, kind, value, label, delay, button, confidence, interval, duration, at } => {
            let mut record = StepRecord::new(kind, value);
            record.name = label;
            record.delay = delay;
            record.button = button;
            record.confidence = confidence;
            record.interval = interval;
            record.duration = duration;
            add_step(&ctx, &name, record, at)
        }
        Commands::RemoveStep { name, index } => remove_step(&ctx, &name, index),
        Commands::MoveStep { name, index, direction } => move_step(&ctx, &name, index, direction),
        Commands::Validate { name } => validate(&ctx, &name),
        Commands::Keys => keys(&ctx),
        Commands::Run { name, loops, countdown, continue_on_error } => {
            run(&ctx, &name, loops, countdown, continue_on_error)
        }
        Commands::RunAll { names, loops, gap_ms, countdown } => run_all(&ctx, names, loops, gap_ms, countdown),
        Commands::Record { name, mode, events } => record(&ctx, &name, mode.into(), events.as_deref()),
    });

    if let Err(e) = result {
        let err = match e.downcast_ref::<Error>() {
            Some(err) => err.clone(),
            None => Error::new(ErrorCode::Unknown, e.to_string()),
        };
        print_json(&Output::<()>::err(err));
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kk=info,keykraken_engine=info,keykraken_core=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Shared by every command
struct Context {
    store: ScenarioStore,
    injector: Arc<dyn InputInjector>,
    assets: PathBuf,
}

impl Context {
    fn new(cli: &Cli) -> keykraken::Result<Self> {
        let store = match &cli.dir {
            Some(dir) => ScenarioStore::with_dir(dir)?,
            None => ScenarioStore::new()?,
        };
        let injector: Arc<dyn InputInjector> = if cli.dry_run {
            Arc::new(DryRunInjector::new())
        } else {
            Arc::new(SystemInjector::new())
        };
        let assets = cli.assets.clone().unwrap_or_else(|| store.path().to_path_buf());
        Ok(Self { store, injector, assets })
    }

    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default().assets_dir(&self.assets)
    }

    fn session(&self, scenario: Scenario, observer: Arc<dyn InputObserver>) -> Session {
        Session::new(scenario, self.injector.clone(), observer).executor_config(self.executor_config())
    }

    /// Session for editing a stored scenario
    fn editor(&self, name: &str) -> keykraken::Result<Session> {
        let scenario = self.store.load(name)?;
        Ok(self.session(scenario, Arc::new(ManualObserver::new())))
    }
}

/// Cancelled on Ctrl+C
fn interrupt() -> Result<CancelToken> {
    let token = CancelToken::new();
    let t = token.clone();
    ctrlc::set_handler(move || t.cancel())?;
    Ok(token)
}

fn report(events: Vec<SessionEvent>) {
    for event in events {
        match event {
            SessionEvent::Playback(e) => progress(&e),
            SessionEvent::StepRecorded { index, name } => {
                progress(&json!({"event": "step_recorded", "index": index + 1, "name": name}))
            }
            SessionEvent::StepRejected { name, error } => {
                warn!(step = %name, error = %error, "recorded step rejected")
            }
            SessionEvent::RecordingStopped { recorded } => info!(recorded, "recording stopped"),
        }
    }
}

fn step_json(index: usize, step: &Step) -> serde_json::Value {
    json!({
        "index": index + 1,
        "name": step.name,
        "type": step.kind().as_str(),
        "value": step.action.display_value(),
        "delay": step.delay,
    })
}

/// 1-based position from the command line to a list index
fn position(index: usize, len: usize) -> keykraken::Result<usize> {
    match index.checked_sub(1) {
        Some(i) if i < len => Ok(i),
        _ => Err(Error::validation("index", &format!("a step position from 1 to {}", len))),
    }
}

// ── Scenario commands ───────────────────────────────────────────────────────

fn list(ctx: &Context) -> Result<()> {
    let names = ctx.store.list()?;
    print_json(&Output::ok(json!({"dir": ctx.store.path(), "scenarios": names})));
    Ok(())
}

fn show(ctx: &Context, name: &str) -> Result<()> {
    let s = ctx.store.load(name)?;
    let steps: Vec<_> = s.steps.iter().enumerate().map(|(i, st)| step_json(i, st)).collect();
    print_json(&Output::ok(json!({
        "name": s.name,
        "description": s.description,
        "version": s.version,
        "saved_at": s.saved_at,
        "loops": s.loops,
        "steps": steps,
    })));
    Ok(())
}

fn new(ctx: &Context, name: &str, description: &str, loops: Option<u32>) -> Result<()> {
    if ctx.store.exists(name) {
        return Err(Error::new(ErrorCode::Validation, format!("Scenario already exists: {}", name))
            .with_suggestions(vec![format!("Run `kk delete {}` first to start over", name)])
            .into());
    }
    if loops == Some(0) {
        return Err(Error::validation("loops", "a positive integer").into());
    }
    let mut scenario = Scenario::new(name).description(description);
    scenario.loops = loops;
    let path = ctx.store.save(&mut scenario)?;
    print_json(&Output::ok(json!({"created": name, "path": path})));
    Ok(())
}

fn delete(ctx: &Context, name: &str) -> Result<()> {
    let existed = ctx.store.delete(name)?;
    print_json(&Output::ok(json!({"deleted": name, "existed": existed})));
    Ok(())
}

// ── Editing ─────────────────────────────────────────────────────────────────

fn add_step(ctx: &Context, name: &str, record: StepRecord, at: Option<usize>) -> Result<()> {
    let mut session = ctx.editor(name)?;
    let index = match at {
        Some(pos) => session.insert_step(pos.saturating_sub(1), &record)?,
        None => session.add_step(&record)?,
    };
    let scenario = session.edit()?;
    ctx.store.save(scenario)?;
    print_json(&Output::ok(step_json(index, &scenario.steps[index])));
    Ok(())
}

fn remove_step(ctx: &Context, name: &str, index: usize) -> Result<()> {
    let mut session = ctx.editor(name)?;
    let i = position(index, session.scenario().len())?;
    let removed = session.remove_step(i)?;
    ctx.store.save(session.edit()?)?;
    print_json(&Output::ok(json!({"removed": step_json(i, &removed)})));
    Ok(())
}

fn move_step(ctx: &Context, name: &str, index: usize, direction: Direction) -> Result<()> {
    let mut session = ctx.editor(name)?;
    let i = position(index, session.scenario().len())?;
    let moved = match direction {
        Direction::Up => session.move_step_up(i)?,
        Direction::Down => session.move_step_down(i)?,
    };
    if moved.is_some() {
        ctx.store.save(session.edit()?)?;
    }
    print_json(&Output::ok(json!({
        "moved": moved.is_some(),
        "index": moved.unwrap_or(i) + 1,
    })));
    Ok(())
}

fn validate(ctx: &Context, name: &str) -> Result<()> {
    let session = ctx.editor(name)?;
    let validator = session.validator();
    let scenario = session.scenario();
    let problems: Vec<_> = scenario
        .steps
        .iter()
        .enumerate()
        .filter_map(|(i, st)| {
            validator
                .check(st)
                .err()
                .map(|e| json!({"index": i + 1, "name": st.name, "error": e}))
        })
        .collect();

    if !problems.is_empty() {
        return Err(Error::new(
            ErrorCode::Validation,
            format!("{} of {} steps are invalid", problems.len(), scenario.len()),
        )
        .with_context(json!({"scenario": name, "problems": problems}))
        .into());
    }
    print_json(&Output::ok(json!({"scenario": name, "steps": scenario.len(), "valid": true})));
    Ok(())
}

fn keys(ctx: &Context) -> Result<()> {
    let named = named_keys(ctx.injector.keys());
    let modifiers: Vec<&String> = named.iter().filter(|k| is_modifier(k)).collect();
    print_json(&Output::ok(json!({
        "named": named,
        "modifiers": modifiers,
        "also": ["any single printable character"],
    })));
    Ok(())
}

// ── Playback ────────────────────────────────────────────────────────────────

fn run(ctx: &Context, name: &str, loops: Option<u32>, countdown: u64, keep_going: bool) -> Result<()> {
    let scenario = ctx.store.load(name)?;
    let config = ctx
        .executor_config()
        .start_delay(Duration::from_secs(countdown))
        .abort_on_failure(!keep_going);
    let mut session = Session::new(scenario, ctx.injector.clone(), Arc::new(ManualObserver::new()))
        .executor_config(config);

    let stop = interrupt()?;
    session.start_playback(loops)?;
    info!(scenario = name, "playing (Ctrl+C to stop)");
    while session.activity() == ActivityKind::Playing {
        if stop.is_cancelled() {
            session.request_cancel();
        }
        report(session.poll());
        std::thread::sleep(POLL);
    }
    report(session.poll());

    let outcome = session
        .last_outcome()
        .cloned()
        .ok_or_else(|| Error::new(ErrorCode::Unknown, "playback ended without an outcome"))?;
    let error = outcome.error().cloned();
    print_json(&Output { success: error.is_none(), data: Some(outcome), error });
    Ok(())
}

fn run_all(ctx: &Context, names: Vec<String>, loops: Option<u32>, gap_ms: u64, countdown: u64) -> Result<()> {
    let names = if names.is_empty() { ctx.store.list()? } else { names };
    let config = ctx.executor_config().start_delay(Duration::from_secs(countdown));
    let executor = Executor::with_config(ctx.injector.clone(), config);
    let mut runner = BatchRunner::new(&ctx.store, &executor).gap(Duration::from_millis(gap_ms));
    if let Some(n) = loops {
        runner = runner.loops(n);
    }

    let stop = interrupt()?;
    let entries = runner.run(&names, &stop, |scenario, event| {
        progress(&json!({"scenario": scenario, "progress": event}));
    });
    let success = entries
        .iter()
        .all(|e| e.outcome.as_ref().map(|o| o.is_completed()).unwrap_or(false));
    print_json(&Output { success, data: Some(entries), error: None });
    Ok(())
}

// ── Recording ───────────────────────────────────────────────────────────────

fn record(ctx: &Context, name: &str, mode: RecordMode, events: Option<&str>) -> Result<()> {
    let observer: Arc<dyn InputObserver> = match events {
        Some("-") => Arc::new(JsonLinesObserver::stdin()),
        Some(path) => Arc::new(JsonLinesObserver::from_path(path)),
        None => {
            return Err(Error::new(
                ErrorCode::NotImplemented,
                "No global input listener is available on this platform",
            )
            .with_suggestions(vec!["Feed observed events with --events <file|->".to_string()])
            .into())
        }
    };

    let scenario = match ctx.store.load(name) {
        Ok(s) => s,
        Err(e) if e.code == ErrorCode::NotFound => Scenario::new(name),
        Err(e) => return Err(e.into()),
    };
    let before = scenario.len();
    let mut session = ctx.session(scenario, observer);

    let stop = interrupt()?;
    session.start_recording(mode)?;
    info!(scenario = name, ?mode, "recording (Ctrl+C to stop)");
    while session.activity() == ActivityKind::Recording {
        if stop.is_cancelled() {
            session.stop_recording();
        }
        report(session.poll());
        std::thread::sleep(POLL);
    }
    session.stop_recording();
    report(session.poll());

    let scenario = session.edit()?;
    let recorded = scenario.len().saturating_sub(before);
    let path = ctx.store.save(scenario)?;
    print_json(&Output::ok(json!({
        "scenario": name,
        "recorded": recorded,
        "steps": scenario.len(),
        "path": path,
    })));
    Ok(())
}
