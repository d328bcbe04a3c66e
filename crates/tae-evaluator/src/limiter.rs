//! Resource limiting for in-process target algorithms.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::time::Duration;
use tracing::warn;

use crate::function::FunctionOutput;

/// Ceilings applied to one in-process run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall-clock limit in seconds.
    pub cutoff: Option<f64>,
    pub memory_limit_mb: Option<u64>,
}

/// A blocking unit of work handed to a limiter.
pub type Job = Box<dyn FnOnce() -> anyhow::Result<FunctionOutput> + Send + 'static>;

/// Box a closure as a [`Job`].
pub fn job<F>(f: F) -> Job
where
    F: FnOnce() -> anyhow::Result<FunctionOutput> + Send + 'static,
{
    Box::new(f)
}

/// How a limited job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitOutcome {
    Completed(FunctionOutput),
    Timeout,
    Memout,
    /// The job returned an error or panicked.
    Failed(String),
}

/// Enforces running time and memory ceilings around a callable.
///
/// Implementations may fork, use cgroups, or simply watch the clock; the
/// evaluator only consumes the reported [`LimitOutcome`].
#[async_trait]
pub trait ResourceLimiter: Send + Sync {
    async fn run(&self, limits: ResourceLimits, job: Job) -> LimitOutcome;
}

/// Runs jobs on tokio's blocking pool and enforces the wall-clock cutoff.
///
/// Memory limits are not enforced. A job that overruns its cutoff is
/// reported as `Timeout` but keeps its blocking thread until it returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLimiter;

#[async_trait]
impl ResourceLimiter for TokioLimiter {
    async fn run(&self, limits: ResourceLimits, job: Job) -> LimitOutcome {
        if limits.memory_limit_mb.is_some() {
            tracing::debug!("Memory limit requested but not enforced by the tokio limiter");
        }

        let limit = match limits.cutoff.map(Duration::try_from_secs_f64).transpose() {
            Ok(limit) => limit,
            Err(e) => {
                return LimitOutcome::Failed(format!("invalid cutoff {:?}: {e}", limits.cutoff))
            }
        };

        let handle = tokio::task::spawn_blocking(job);
        let joined = match limit {
            Some(limit) => {
                match tokio::time::timeout(limit, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("In-process run exceeded cutoff of {:.3}s", limit.as_secs_f64());
                        return LimitOutcome::Timeout;
                    }
                }
            }
            None => handle.await,
        };

        match joined {
            Ok(Ok(output)) => LimitOutcome::Completed(output),
            Ok(Err(e)) => LimitOutcome::Failed(format!("{e:#}")),
            Err(e) if e.is_panic() => {
                LimitOutcome::Failed(format!("panicked: {}", panic_message(e.into_panic())))
            }
            Err(e) => LimitOutcome::Failed(e.to_string()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
