//! Run requests, parsed run results and recorded run values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config_error;
use crate::configuration::Configuration;
use crate::errors::TaeResult;
use crate::status::RunStatus;

/// Unique run identifier.
pub type RunId = Uuid;

/// Auxiliary information attached to a run result.
pub type AdditionalInfo = serde_json::Map<String, serde_json::Value>;

/// Parameters of one evaluation of the target algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Problem instance to run on, if the scenario has instances.
    #[serde(default)]
    pub instance: Option<String>,

    /// Extra instance information passed through verbatim.
    #[serde(default = "default_instance_specific")]
    pub instance_specific: String,

    /// Wall-clock limit in seconds.
    #[serde(default)]
    pub cutoff: Option<f64>,

    /// Maximum number of algorithm-internal steps (0 = unlimited).
    #[serde(default)]
    pub runlength: u64,

    #[serde(default)]
    pub seed: i64,

    /// Fidelity for multi-fidelity intensifiers (e.g. epochs in Hyperband).
    #[serde(default)]
    pub budget: Option<f64>,

    pub configuration: Configuration,
}

fn default_instance_specific() -> String {
    "0".to_string()
}

impl RunRequest {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            instance: None,
            instance_specific: default_instance_specific(),
            cutoff: None,
            runlength: 0,
            seed: 0,
            budget: None,
            configuration,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_instance_specific(mut self, specific: impl Into<String>) -> Self {
        self.instance_specific = specific.into();
        self
    }

    pub fn with_cutoff(mut self, seconds: f64) -> Self {
        self.cutoff = Some(seconds);
        self
    }

    pub fn with_runlength(mut self, steps: u64) -> Self {
        self.runlength = steps;
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Reject requests no evaluator can honor.
    pub fn validate(&self) -> TaeResult<()> {
        if let Some(cutoff) = self.cutoff {
            if !cutoff.is_finite() || cutoff <= 0.0 {
                return Err(config_error!("request cutoff must be positive and finite, got {cutoff}"));
            }
            if Duration::try_from_secs_f64(cutoff).is_err() {
                return Err(config_error!("request cutoff {cutoff}s is out of range"));
            }
        }
        if let Some(budget) = self.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(config_error!("request budget must be non-negative and finite, got {budget}"));
            }
        }
        Ok(())
    }
}

/// Outcome of one run as reported by the target algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    /// Observed running time in seconds.
    pub runtime: f64,
    pub runlength: f64,
    /// Objective value; lower is better.
    pub quality: f64,
    pub seed: i64,
    pub instance_specific: String,
    #[serde(default)]
    pub additional_info: AdditionalInfo,
}

impl RunResult {
    /// A result carrying only a status, echoing seed and specifics from the
    /// request. Used when the algorithm produced nothing parseable.
    pub fn from_status(status: RunStatus, request: &RunRequest) -> Self {
        Self {
            status,
            runtime: 0.0,
            runlength: 0.0,
            quality: 0.0,
            seed: request.seed,
            instance_specific: request.instance_specific.clone(),
            additional_info: AdditionalInfo::new(),
        }
    }

    pub fn with_runtime(mut self, seconds: f64) -> Self {
        self.runtime = seconds;
        self
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }

    /// Error description attached by the evaluator, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.additional_info.get("error").and_then(|v| v.as_str())
    }
}

/// A recorded evaluation: the request, the algorithm's result and the cost
/// the optimizer should minimize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunValue {
    pub id: RunId,
    pub request: RunRequest,
    pub result: RunResult,
    pub cost: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunValue {
    pub fn new(
        request: RunRequest,
        result: RunResult,
        cost: f64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            result,
            cost,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.result.status
    }
}
