//! Run several stored scenarios back to back

use crate::executor::{Executor, PlaybackEvent, RunOutcome};
use crate::storage::ScenarioStore;
use keykraken_core::{CancelToken, Error, Validator};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Result for one scenario in a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    /// Why the scenario was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl BatchEntry {
    fn skipped(name: &str, error: Error) -> Self {
        Self {
            name: name.to_string(),
            outcome: None,
            error: Some(error),
        }
    }
}

pub struct BatchRunner<'a> {
    store: &'a ScenarioStore,
    executor: &'a Executor,
    gap: Duration,
    loops: Option<u32>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(store: &'a ScenarioStore, executor: &'a Executor) -> Self {
        Self {
            store,
            executor,
            gap: Duration::from_secs(1),
            loops: None,
        }
    }

    /// Pause between scenarios
    pub fn gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Loop count for every scenario, overriding each document's own
    pub fn loops(mut self, loops: u32) -> Self {
        self.loops = Some(loops);
        self
    }

    /// Play `names` in order. Unloadable or invalid scenarios are skipped;
    /// a cancelled run ends the batch.
    pub fn run(
        &self,
        names: &[String],
        cancel: &CancelToken,
        mut emit: impl FnMut(&str, PlaybackEvent),
    ) -> Vec<BatchEntry> {
        let keys = self.executor.injector().keys();
        let mut validator = Validator::new(keys);
        if let Some(dir) = &self.executor.config().assets_dir {
            validator = validator.assets_dir(dir);
        }

        let mut entries = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if i > 0 && !cancel.wait(self.gap, self.executor.config().poll_interval, |_| {}) {
                break;
            }
            if cancel.is_cancelled() {
                break;
            }

            let scenario = match self.store.load(name) {
                Ok(s) => s,
                Err(e) => {
                    warn!(scenario = %name, error = %e, "skipping scenario");
                    entries.push(BatchEntry::skipped(name, e));
                    continue;
                }
            };
            if let Err(e) = validator.check_scenario(&scenario) {
                warn!(scenario = %name, error = %e, "skipping invalid scenario");
                entries.push(BatchEntry::skipped(name, e));
                continue;
            }

            let loops = self.loops.or(scenario.loops).unwrap_or(1);
            // A failing step cancels its own run only
            let run_token = cancel.child();
            match self.executor.execute(&scenario, loops, &run_token, |e| emit(name.as_str(), e)) {
                Ok(outcome) => {
                    let stop = outcome.is_cancelled();
                    entries.push(BatchEntry {
                        name: name.clone(),
                        outcome: Some(outcome),
                        error: None,
                    });
                    if stop {
                        info!(scenario = %name, "batch stopped");
                        break;
                    }
                }
                Err(e) => entries.push(BatchEntry::skipped(name, e)),
            }
        }
        entries
    }
}
