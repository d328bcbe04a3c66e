//! Scenario configuration shared by all evaluators.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{TaeError, TaeResult};
use crate::run::RunResult;
use crate::status::RunStatus;

/// What the optimizer minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunObjective {
    /// Minimize the reported quality.
    Quality,
    /// Minimize running time, penalizing timeouts with the PAR factor.
    Runtime,
}

impl Default for RunObjective {
    fn default() -> Self {
        Self::Quality
    }
}

/// Output format expected on the result line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallFormat {
    /// `STATUS, runtime, runlength, quality, seed, instance-specifics`
    Legacy,
    /// A JSON object after the result prefix.
    Aclib,
}

impl Default for CallFormat {
    fn default() -> Self {
        Self::Legacy
    }
}

/// Top-level configuration for evaluating a target algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Command line of the target algorithm, split on whitespace.
    pub algo: String,

    pub call_format: CallFormat,

    /// Prepended to every parameter name on the command line.
    pub param_prefix: String,

    /// Default cutoff in seconds for requests that carry none.
    pub cutoff: Option<f64>,

    /// Memory ceiling handed to the resource limiter.
    pub memory_limit_mb: Option<u64>,

    pub run_objective: RunObjective,

    /// Penalty multiplier for timeouts under the runtime objective.
    pub par_factor: f64,

    /// Cost assigned to crashed runs under the quality objective.
    pub cost_for_crash: f64,

    /// Halt the session if the very first run crashes.
    pub abort_on_first_run_crash: bool,

    /// Maximum number of target algorithm runs for this session.
    pub ta_run_limit: Option<usize>,

    /// How many runs `evaluate_batch` keeps in flight.
    pub concurrency: usize,

    /// Extra wall-clock time before a subprocess past its cutoff is killed.
    pub kill_grace_seconds: f64,

    pub working_dir: Option<PathBuf>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            algo: String::new(),
            call_format: CallFormat::Legacy,
            param_prefix: String::new(),
            cutoff: None,
            memory_limit_mb: None,
            run_objective: RunObjective::Quality,
            par_factor: 1.0,
            cost_for_crash: f64::MAX,
            abort_on_first_run_crash: true,
            ta_run_limit: None,
            concurrency: 1,
            kill_grace_seconds: 1.0,
            working_dir: None,
        }
    }
}

impl ScenarioConfig {
    pub fn new(algo: impl Into<String>) -> Self {
        Self {
            algo: algo.into(),
            ..Self::default()
        }
    }

    /// Load a scenario from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> TaeResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_call_format(mut self, format: CallFormat) -> Self {
        self.call_format = format;
        self
    }

    pub fn with_param_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.param_prefix = prefix.into();
        self
    }

    pub fn with_cutoff(mut self, seconds: f64) -> Self {
        self.cutoff = Some(seconds);
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    pub fn with_objective(mut self, objective: RunObjective, par_factor: f64) -> Self {
        self.run_objective = objective;
        self.par_factor = par_factor;
        self
    }

    pub fn with_cost_for_crash(mut self, cost: f64) -> Self {
        self.cost_for_crash = cost;
        self
    }

    pub fn with_abort_on_first_run_crash(mut self, abort: bool) -> Self {
        self.abort_on_first_run_crash = abort;
        self
    }

    pub fn with_run_limit(mut self, limit: usize) -> Self {
        self.ta_run_limit = Some(limit);
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn with_kill_grace(mut self, seconds: f64) -> Self {
        self.kill_grace_seconds = seconds;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Check value ranges. `algo` is checked by the command-line evaluator,
    /// in-process evaluators have no use for it.
    pub fn validate(&self) -> TaeResult<()> {
        if let Some(cutoff) = self.cutoff {
            if !(cutoff > 0.0) {
                return Err(TaeError::Config(format!("cutoff must be positive, got {cutoff}")));
            }
        }
        if !(self.par_factor > 0.0) {
            return Err(TaeError::Config(format!(
                "par_factor must be positive, got {}",
                self.par_factor
            )));
        }
        if self.concurrency == 0 {
            return Err(TaeError::Config("concurrency must be at least 1".to_string()));
        }
        if self.kill_grace_seconds < 0.0 {
            return Err(TaeError::Config(format!(
                "kill_grace_seconds must not be negative, got {}",
                self.kill_grace_seconds
            )));
        }
        if self.memory_limit_mb == Some(0) {
            return Err(TaeError::Config("memory_limit_mb must be positive".to_string()));
        }
        Ok(())
    }

    /// Cost of a run under this scenario's objective. `cutoff` is the limit
    /// the run was executed with.
    pub fn cost_of(&self, result: &RunResult, cutoff: Option<f64>) -> f64 {
        match self.run_objective {
            RunObjective::Quality => match result.status {
                RunStatus::Success => result.quality,
                RunStatus::Timeout | RunStatus::Crashed | RunStatus::Abort | RunStatus::Memout => {
                    self.cost_for_crash
                }
            },
            RunObjective::Runtime => {
                let penalty = cutoff.map(|c| c * self.par_factor);
                match result.status {
                    RunStatus::Success => result.runtime,
                    _ => penalty.unwrap_or(self.cost_for_crash),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::run::RunRequest;
    use std::io::Write;

    fn result(status: RunStatus, runtime: f64, quality: f64) -> RunResult {
        RunResult::from_status(status, &RunRequest::new(Configuration::new()))
            .with_runtime(runtime)
            .with_quality(quality)
    }

    #[test]
    fn default_scenario_is_valid() {
        let config = ScenarioConfig::new("python solver.py");
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 1);
        assert!(config.abort_on_first_run_crash);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(ScenarioConfig::new("a").with_cutoff(0.0).validate().is_err());
        assert!(ScenarioConfig::new("a").with_concurrency(0).validate().is_err());
        assert!(ScenarioConfig::new("a")
            .with_objective(RunObjective::Runtime, -1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn quality_cost() {
        let config = ScenarioConfig::new("a").with_cost_for_crash(1000.0);
        assert_eq!(config.cost_of(&result(RunStatus::Success, 3.0, 0.25), None), 0.25);
        assert_eq!(config.cost_of(&result(RunStatus::Crashed, 3.0, 0.25), None), 1000.0);
        assert_eq!(config.cost_of(&result(RunStatus::Abort, 3.0, 0.25), None), 1000.0);
    }

    #[test]
    fn quality_timeout_costs_like_a_crash() {
        let config = ScenarioConfig::new("a").with_cost_for_crash(1000.0);
        // A timed-out run never looks better than any successful one
        assert_eq!(config.cost_of(&result(RunStatus::Timeout, 3.0, 0.0), Some(3.0)), 1000.0);
        assert_eq!(config.cost_of(&result(RunStatus::Memout, 3.0, 0.0), None), 1000.0);
    }

    #[test]
    fn runtime_cost_applies_par_factor() {
        let config = ScenarioConfig::new("a").with_objective(RunObjective::Runtime, 10.0);
        assert_eq!(config.cost_of(&result(RunStatus::Success, 3.0, 0.0), Some(5.0)), 3.0);
        assert_eq!(config.cost_of(&result(RunStatus::Timeout, 5.0, 0.0), Some(5.0)), 50.0);
        assert_eq!(config.cost_of(&result(RunStatus::Crashed, 0.1, 0.0), Some(5.0)), 50.0);
        assert_eq!(
            config.cost_of(&result(RunStatus::Crashed, 0.1, 0.0), None),
            f64::MAX
        );
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"algo": "python wrapper.py", "cutoff": 30, "run_objective": "runtime", "par_factor": 10, "call_format": "aclib"}}"#
        )
        .unwrap();

        let config = ScenarioConfig::from_file(file.path()).unwrap();
        assert_eq!(config.algo, "python wrapper.py");
        assert_eq!(config.cutoff, Some(30.0));
        assert_eq!(config.run_objective, RunObjective::Runtime);
        assert_eq!(config.call_format, CallFormat::Aclib);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"algo": "x", "concurrency": 0}}"#).unwrap();
        assert!(matches!(
            ScenarioConfig::from_file(file.path()),
            Err(TaeError::Config(_))
        ));
    }
}
