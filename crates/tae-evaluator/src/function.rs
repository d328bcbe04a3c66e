//! In-process target algorithms: callables taking a configuration as a
//! key-value mapping or as a positional array.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tae_types::{
    AdditionalInfo, Configuration, RunRequest, RunResult, RunStatus, TaeResult,
};
use tracing::{debug, warn};

use crate::evaluator::TargetAlgorithmEvaluator;
use crate::limiter::{job, LimitOutcome, ResourceLimiter, ResourceLimits, TokioLimiter};

/// Optional identifiers of a run, handed to the callable alongside the
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    pub seed: i64,
    pub instance: Option<String>,
    pub instance_specific: String,
    pub budget: Option<f64>,
    pub cutoff: Option<f64>,
}

impl CallContext {
    pub fn from_request(request: &RunRequest) -> Self {
        Self {
            seed: request.seed,
            instance: request.instance.clone(),
            instance_specific: request.instance_specific.clone(),
            budget: request.budget,
            cutoff: request.cutoff,
        }
    }
}

/// What a callable returns: a loss and, optionally, auxiliary information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionOutput {
    pub loss: f64,
    pub info: Option<AdditionalInfo>,
}

impl From<f64> for FunctionOutput {
    fn from(loss: f64) -> Self {
        Self { loss, info: None }
    }
}

impl From<(f64, AdditionalInfo)> for FunctionOutput {
    fn from((loss, info): (f64, AdditionalInfo)) -> Self {
        Self {
            loss,
            info: Some(info),
        }
    }
}

impl From<(f64, serde_json::Value)> for FunctionOutput {
    /// Objects are kept as-is; any other value is stored under `"info"`.
    fn from((loss, value): (f64, serde_json::Value)) -> Self {
        let info = match value {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = AdditionalInfo::new();
                map.insert("info".to_string(), other);
                map
            }
        };
        Self {
            loss,
            info: Some(info),
        }
    }
}

/// Wrap a "higher is better" callable so its loss is negated. The optimizer
/// always minimizes.
pub fn maximize<T, F, R>(f: F) -> impl Fn(&T, &CallContext) -> anyhow::Result<FunctionOutput>
where
    T: ?Sized,
    F: Fn(&T, &CallContext) -> anyhow::Result<R>,
    R: Into<FunctionOutput>,
{
    move |input: &T, ctx: &CallContext| {
        let mut output: FunctionOutput = f(input, ctx)?.into();
        output.loss = -output.loss;
        Ok(output)
    }
}

type DictFn = dyn Fn(&Configuration, &CallContext) -> anyhow::Result<FunctionOutput> + Send + Sync;
type ArrayFn = dyn Fn(&[f64], &CallContext) -> anyhow::Result<FunctionOutput> + Send + Sync;

/// Limiter and bookkeeping shared by both callable evaluators.
struct Harness {
    name: String,
    limiter: Arc<dyn ResourceLimiter>,
    memory_limit_mb: Option<u64>,
    /// Quality reported for runs that produced no usable loss.
    cost_for_crash: f64,
}

impl Harness {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            limiter: Arc::new(TokioLimiter),
            memory_limit_mb: None,
            cost_for_crash: f64::MAX,
        }
    }

    async fn execute<F>(&self, request: &RunRequest, call: F) -> RunResult
    where
        F: FnOnce() -> anyhow::Result<FunctionOutput> + Send + 'static,
    {
        let limits = ResourceLimits {
            cutoff: request.cutoff,
            memory_limit_mb: self.memory_limit_mb,
        };
        debug!("{}: calling target function (seed {})", self.name, request.seed);

        let start = Instant::now();
        let outcome = self.limiter.run(limits, job(call)).await;
        let runtime = start.elapsed().as_secs_f64();

        match outcome {
            LimitOutcome::Completed(output) if output.loss.is_finite() => {
                let mut result = RunResult::from_status(RunStatus::Success, request)
                    .with_runtime(runtime)
                    .with_quality(output.loss);
                if let Some(info) = output.info {
                    result.additional_info = info;
                }
                result
            }
            LimitOutcome::Completed(output) => {
                warn!("{}: target function returned non-finite loss {}", self.name, output.loss);
                RunResult::from_status(RunStatus::Crashed, request)
                    .with_runtime(runtime)
                    .with_quality(self.cost_for_crash)
                    .with_info("error", format!("non-finite loss {}", output.loss))
            }
            LimitOutcome::Timeout => RunResult::from_status(RunStatus::Timeout, request)
                .with_runtime(request.cutoff.unwrap_or(runtime))
                .with_quality(self.cost_for_crash),
            LimitOutcome::Memout => RunResult::from_status(RunStatus::Memout, request)
                .with_runtime(runtime)
                .with_quality(self.cost_for_crash),
            LimitOutcome::Failed(message) => {
                warn!("{}: target function failed: {}", self.name, message);
                RunResult::from_status(RunStatus::Crashed, request)
                    .with_runtime(runtime)
                    .with_quality(self.cost_for_crash)
                    .with_info("error", message)
            }
        }
    }
}

/// Evaluates a callable that takes the configuration as a key-value mapping.
pub struct FunctionEvaluator {
    func: Arc<DictFn>,
    harness: Harness,
}

impl FunctionEvaluator {
    pub fn new<F, R>(func: F) -> Self
    where
        F: Fn(&Configuration, &CallContext) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<FunctionOutput>,
    {
        Self {
            func: Arc::new(move |config: &Configuration, ctx: &CallContext| {
                func(config, ctx).map(Into::<FunctionOutput>::into)
            }),
            harness: Harness::new("function"),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.harness.name = name.into();
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn ResourceLimiter>) -> Self {
        self.harness.limiter = limiter;
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.harness.memory_limit_mb = Some(mb);
        self
    }

    /// Quality reported for crashed, timed-out and memout runs.
    pub fn with_cost_for_crash(mut self, cost: f64) -> Self {
        self.harness.cost_for_crash = cost;
        self
    }
}

#[async_trait]
impl TargetAlgorithmEvaluator for FunctionEvaluator {
    async fn run(&self, request: &RunRequest) -> TaeResult<RunResult> {
        request.validate()?;
        let func = Arc::clone(&self.func);
        let config = request.configuration.clone();
        let ctx = CallContext::from_request(request);
        Ok(self
            .harness
            .execute(request, move || func(&config, &ctx))
            .await)
    }

    fn name(&self) -> &str {
        &self.harness.name
    }
}

/// Evaluates a callable that takes the configuration as a positional array
/// of numbers.
pub struct ArrayFunctionEvaluator {
    func: Arc<ArrayFn>,
    parameter_order: Vec<String>,
    harness: Harness,
}

impl ArrayFunctionEvaluator {
    /// `parameter_order` fixes which configuration entry lands at which
    /// array position.
    pub fn new<F, R>(parameter_order: Vec<String>, func: F) -> Self
    where
        F: Fn(&[f64], &CallContext) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<FunctionOutput>,
    {
        Self {
            func: Arc::new(move |x: &[f64], ctx: &CallContext| {
                func(x, ctx).map(Into::<FunctionOutput>::into)
            }),
            parameter_order,
            harness: Harness::new("array-function"),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.harness.name = name.into();
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn ResourceLimiter>) -> Self {
        self.harness.limiter = limiter;
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.harness.memory_limit_mb = Some(mb);
        self
    }

    /// Quality reported for crashed, timed-out and memout runs.
    pub fn with_cost_for_crash(mut self, cost: f64) -> Self {
        self.harness.cost_for_crash = cost;
        self
    }

    pub fn parameter_order(&self) -> &[String] {
        &self.parameter_order
    }
}

#[async_trait]
impl TargetAlgorithmEvaluator for ArrayFunctionEvaluator {
    async fn run(&self, request: &RunRequest) -> TaeResult<RunResult> {
        request.validate()?;
        let array = request.configuration.to_array(&self.parameter_order)?;
        let func = Arc::clone(&self.func);
        let ctx = CallContext::from_request(request);
        Ok(self
            .harness
            .execute(request, move || func(array.as_slice(), &ctx))
            .await)
    }

    fn name(&self) -> &str {
        &self.harness.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tae_types::{ParameterValue, TaeError};

    fn request() -> RunRequest {
        RunRequest::new(Configuration::new().with("x", 2.0).with("n", 3))
            .with_seed(7)
            .with_instance("1")
    }

    /// Limiter that reports a memout without running anything.
    struct AlwaysMemout;

    #[async_trait]
    impl ResourceLimiter for AlwaysMemout {
        async fn run(&self, limits: ResourceLimits, _job: crate::limiter::Job) -> LimitOutcome {
            assert_eq!(limits.memory_limit_mb, Some(64));
            LimitOutcome::Memout
        }
    }

    #[tokio::test]
    async fn bare_loss_has_no_info() {
        let tae = FunctionEvaluator::new(|_config: &Configuration, _ctx: &CallContext| Ok(0.42));
        let result = tae.run(&request()).await.unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.quality, 0.42);
        assert!(result.additional_info.is_empty());
        assert_eq!(result.seed, 7);
    }

    #[tokio::test]
    async fn loss_with_info_is_preserved() {
        let tae = FunctionEvaluator::new(|_config: &Configuration, _ctx: &CallContext| {
            Ok((0.42, json!({"extra": 1})))
        });
        let result = tae.run(&request()).await.unwrap();
        assert_eq!(result.quality, 0.42);
        assert_eq!(result.additional_info.get("extra"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn function_sees_configuration_and_context() {
        let tae = FunctionEvaluator::new(|config: &Configuration, ctx: &CallContext| {
            let x = match config.get("x") {
                Some(ParameterValue::Float(x)) => *x,
                other => anyhow::bail!("unexpected x: {other:?}"),
            };
            assert_eq!(ctx.instance.as_deref(), Some("1"));
            assert_eq!(ctx.budget, Some(5.0));
            Ok(x * x + ctx.seed as f64)
        });
        let result = tae.run(&request().with_budget(5.0)).await.unwrap();
        assert_eq!(result.quality, 11.0);
    }

    #[tokio::test]
    async fn error_becomes_crashed() {
        let tae = FunctionEvaluator::new(|_config: &Configuration, _ctx: &CallContext| {
            Err::<f64, _>(anyhow::anyhow!("training diverged"))
        });
        let result = tae.run(&request()).await.unwrap();
        assert_eq!(result.status, RunStatus::Crashed);
        assert_eq!(result.error_message(), Some("training diverged"));
    }

    #[tokio::test]
    async fn nan_loss_becomes_crashed() {
        let tae = FunctionEvaluator::new(|_config: &Configuration, _ctx: &CallContext| Ok(f64::NAN))
            .with_cost_for_crash(500.0);
        let result = tae.run(&request()).await.unwrap();
        assert_eq!(result.status, RunStatus::Crashed);
        assert_eq!(result.quality, 500.0);
    }

    #[tokio::test]
    async fn slow_function_times_out() {
        let tae = FunctionEvaluator::new(|_config: &Configuration, _ctx: &CallContext| {
            std::thread::sleep(std::time::Duration::from_millis(500));
            Ok(1.0)
        })
        .with_cost_for_crash(500.0);
        let result = tae.run(&request().with_cutoff(0.05)).await.unwrap();
        assert_eq!(result.status, RunStatus::Timeout);
        assert_eq!(result.runtime, 0.05);
        assert_eq!(result.quality, 500.0);
    }

    #[tokio::test]
    async fn negative_cutoff_is_a_configuration_error() {
        let tae = FunctionEvaluator::new(|_config: &Configuration, _ctx: &CallContext| Ok(1.0));
        let err = tae.run(&request().with_cutoff(-5.0)).await.unwrap_err();
        assert!(matches!(err, TaeError::Config(_)));
    }

    #[tokio::test]
    async fn limiter_memout_is_reported() {
        let tae = FunctionEvaluator::new(|_config: &Configuration, _ctx: &CallContext| Ok(1.0))
            .with_limiter(Arc::new(AlwaysMemout))
            .with_memory_limit_mb(64);
        let result = tae.run(&request()).await.unwrap();
        assert_eq!(result.status, RunStatus::Memout);
    }

    #[tokio::test]
    async fn maximize_negates_loss() {
        let accuracy = |_config: &Configuration, _ctx: &CallContext| Ok((0.9, json!({"fold": 3})));
        let tae = FunctionEvaluator::new(maximize(accuracy));
        let result = tae.run(&request()).await.unwrap();
        assert_eq!(result.quality, -0.9);
        assert_eq!(result.additional_info.get("fold"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn array_function_receives_ordered_values() {
        let tae = ArrayFunctionEvaluator::new(
            vec!["n".to_string(), "x".to_string()],
            |x: &[f64], _ctx: &CallContext| Ok(x[0] * 10.0 + x[1]),
        );
        let result = tae.run(&request()).await.unwrap();
        assert_eq!(result.quality, 32.0);
        assert_eq!(tae.name(), "array-function");
    }

    #[tokio::test]
    async fn array_function_rejects_missing_parameter() {
        let tae = ArrayFunctionEvaluator::new(vec!["lr".to_string()], |_x: &[f64], _ctx: &CallContext| {
            Ok(0.0)
        });
        let err = tae.run(&request()).await.unwrap_err();
        assert!(matches!(err, TaeError::InvalidConfiguration { .. }));
    }
}
