//! Evaluation session: runs requests through an evaluator, derives costs,
//! keeps the run history and enforces abort semantics.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tae_types::{RunRequest, RunStatus, RunValue, ScenarioConfig, TaeError, TaeResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::evaluator::TargetAlgorithmEvaluator;
use crate::history::RunHistory;

/// Drives a [`TargetAlgorithmEvaluator`] on behalf of an optimizer.
///
/// Cloning is cheap and clones share history and halt state, so a session
/// can be handed to concurrent tasks.
#[derive(Clone)]
pub struct EvaluationSession {
    evaluator: Arc<dyn TargetAlgorithmEvaluator>,
    scenario: Arc<ScenarioConfig>,
    history: Arc<RunHistory>,
    halted: Arc<AtomicBool>,
    /// Runs started and not rejected; also the sequence number of the next run.
    started: Arc<AtomicUsize>,
}

impl EvaluationSession {
    pub fn new(
        evaluator: Arc<dyn TargetAlgorithmEvaluator>,
        scenario: ScenarioConfig,
    ) -> TaeResult<Self> {
        scenario.validate()?;
        info!(
            "Creating evaluation session for '{}' ({:?} objective)",
            evaluator.name(),
            scenario.run_objective
        );
        Ok(Self {
            evaluator,
            scenario: Arc::new(scenario),
            history: Arc::new(RunHistory::new()),
            halted: Arc::new(AtomicBool::new(false)),
            started: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    pub fn history(&self) -> Arc<RunHistory> {
        Arc::clone(&self.history)
    }

    /// True once a run aborted or the first run crashed.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Evaluate one request.
    ///
    /// Per-run failures (`Crashed`, `Timeout`, `Memout`) come back as `Ok`
    /// with the matching status. A request the evaluator rejects (invalid
    /// cutoff, unusable configuration) returns the error without being
    /// recorded or counted against the run limit. `Abort` is recorded, halts the session and
    /// returns [`TaeError::Aborted`]; every later call returns
    /// [`TaeError::Halted`] without running anything.
    pub async fn evaluate(&self, mut request: RunRequest) -> TaeResult<RunValue> {
        if self.is_halted() {
            return Err(TaeError::Halted);
        }
        if request.cutoff.is_none() {
            request.cutoff = self.scenario.cutoff;
        }
        request.validate()?;
        let sequence = self.reserve_run()?;

        let started_at = Utc::now();
        debug!("Run {} on '{}' (seed {})", sequence, self.evaluator.name(), request.seed);
        let result = match self.evaluator.run(&request).await {
            Ok(result) => result,
            Err(e) => {
                // Nothing ran, so the run does not count against the limit.
                self.started.fetch_sub(1, Ordering::SeqCst);
                warn!("Run {} rejected by '{}': {}", sequence, self.evaluator.name(), e);
                return Err(e);
            }
        };
        let cost = self.scenario.cost_of(&result, request.cutoff);
        let value = RunValue::new(request, result, cost, started_at);
        let position = self.history.record(value.clone());

        match value.status() {
            RunStatus::Abort => {
                self.halted.store(true, Ordering::SeqCst);
                let reason = value
                    .result
                    .error_message()
                    .unwrap_or("target algorithm reported ABORT")
                    .to_string();
                error!("Run {} aborted, halting all further evaluations: {}", sequence, reason);
                Err(TaeError::Aborted { reason })
            }
            RunStatus::Crashed if position == 0 && self.scenario.abort_on_first_run_crash => {
                self.halted.store(true, Ordering::SeqCst);
                let reason = value
                    .result
                    .error_message()
                    .unwrap_or("target algorithm reported CRASHED")
                    .to_string();
                error!("First run crashed, halting: {}", reason);
                Err(TaeError::FirstRunCrashed { reason })
            }
            RunStatus::Crashed => {
                warn!("Run {} crashed, cost {}", sequence, value.cost);
                Ok(value)
            }
            status => {
                info!(
                    "Run {} finished: {} cost={} runtime={:.3}s",
                    sequence, status, value.cost, value.result.runtime
                );
                Ok(value)
            }
        }
    }

    /// Evaluate many requests with at most `concurrency` runs in flight.
    ///
    /// Results are returned in request order. Requests that had not started
    /// when the session halted come back as [`TaeError::Halted`].
    pub async fn evaluate_batch(&self, requests: Vec<RunRequest>) -> Vec<TaeResult<RunValue>> {
        let total = requests.len();
        let permits = Arc::new(Semaphore::new(self.scenario.concurrency));
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let session = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => session.evaluate(request).await,
                    Err(e) => Err(TaeError::Internal(format!("run slot unavailable: {e}"))),
                };
                (index, outcome)
            });
        }

        let mut results: Vec<Option<TaeResult<RunValue>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => results[index] = Some(outcome),
                Err(e) => error!("Evaluation task failed: {}", e),
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(TaeError::Internal("evaluation task panicked".to_string())))
            })
            .collect()
    }

    /// Claim a sequence number, honoring the run limit.
    fn reserve_run(&self) -> TaeResult<usize> {
        match self.scenario.ta_run_limit {
            Some(limit) => self
                .started
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
                .map_err(|_| TaeError::BudgetExhausted { limit }),
            None => Ok(self.started.fetch_add(1, Ordering::SeqCst)),
        }
    }
}
