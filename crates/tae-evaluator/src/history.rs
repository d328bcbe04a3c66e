//! Run history and evaluation statistics.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tae_types::{RunStatus, RunValue};

/// Aggregate counters for an evaluation session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of recorded target algorithm runs.
    pub ta_runs: usize,
    /// Runs that ended `Crashed`, `Memout` or `Abort`.
    pub failed_runs: usize,
    pub timeouts: usize,
    /// Sum of reported running times, in seconds.
    pub ta_time_used: f64,
    pub first_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct HistoryState {
    runs: Vec<RunValue>,
    stats: Stats,
    /// Index into `runs` of the lowest-cost successful run.
    incumbent: Option<usize>,
}

/// Append-only log of evaluated runs, safe to share between tasks.
#[derive(Debug, Default)]
pub struct RunHistory {
    state: Mutex<HistoryState>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a run and update statistics. Returns the run's position.
    pub fn record(&self, value: RunValue) -> usize {
        let mut state = self.state.lock();
        let index = state.runs.len();

        let stats = &mut state.stats;
        stats.ta_runs += 1;
        stats.ta_time_used += value.result.runtime;
        match value.status() {
            RunStatus::Crashed | RunStatus::Memout | RunStatus::Abort => stats.failed_runs += 1,
            RunStatus::Timeout => stats.timeouts += 1,
            RunStatus::Success => {}
        }
        stats.first_run_at.get_or_insert(value.started_at);
        stats.last_run_at = Some(value.finished_at);

        // Update the incumbent if this run improves on the current best.
        let improves = value.status().is_success()
            && match state.incumbent {
                None => true,
                Some(best) => value.cost < state.runs[best].cost,
            };
        if improves {
            state.incumbent = Some(index);
        }

        state.runs.push(value);
        index
    }

    pub fn len(&self) -> usize {
        self.state.lock().runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().runs.is_empty()
    }

    /// Snapshot of all recorded runs in recording order.
    pub fn runs(&self) -> Vec<RunValue> {
        self.state.lock().runs.clone()
    }

    pub fn last(&self) -> Option<RunValue> {
        self.state.lock().runs.last().cloned()
    }

    /// Lowest-cost successful run so far.
    pub fn incumbent(&self) -> Option<RunValue> {
        let state = self.state.lock();
        state.incumbent.map(|i| state.runs[i].clone())
    }

    pub fn count_by_status(&self, status: RunStatus) -> usize {
        self.state
            .lock()
            .runs
            .iter()
            .filter(|run| run.status() == status)
            .count()
    }

    /// Whether any recorded run reported `Abort`.
    pub fn aborted(&self) -> bool {
        self.state
            .lock()
            .runs
            .iter()
            .any(|run| run.status().is_fatal())
    }

    pub fn stats(&self) -> Stats {
        self.state.lock().stats.clone()
    }
}
