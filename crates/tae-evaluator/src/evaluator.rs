//! The capability shared by every target algorithm evaluator.

use async_trait::async_trait;
use tae_types::{RunRequest, RunResult, TaeResult};

/// Evaluates one run of a target algorithm.
///
/// Failures of the target algorithm itself (crash, timeout, memout, abort)
/// are reported through [`RunResult::status`]. An `Err` means the evaluator
/// could not do its job, e.g. the request is malformed or an I/O call on the
/// harness side failed.
#[async_trait]
pub trait TargetAlgorithmEvaluator: Send + Sync {
    /// Run the target algorithm once and return what it reported.
    async fn run(&self, request: &RunRequest) -> TaeResult<RunResult>;

    /// Human-readable evaluator name used in logs.
    fn name(&self) -> &str;
}
