//! # tae-evaluator
//!
//! Target algorithm evaluators for hyperparameter optimization.
//!
//! Provides the [`TargetAlgorithmEvaluator`] capability with a command-line
//! implementation (subprocess plus result-line protocol) and in-process
//! implementations for callables taking a configuration as a mapping or as
//! an array, together with resource limiting, run history and an
//! [`EvaluationSession`] that enforces abort semantics.

mod command;
mod evaluator;
mod function;
mod history;
mod limiter;
pub mod parser;
mod session;

pub use command::{CommandLineEvaluator, NO_INSTANCE, UNBOUNDED_CUTOFF};
pub use evaluator::TargetAlgorithmEvaluator;
pub use function::{maximize, ArrayFunctionEvaluator, CallContext, FunctionEvaluator, FunctionOutput};
pub use history::{RunHistory, Stats};
pub use limiter::{job, Job, LimitOutcome, ResourceLimiter, ResourceLimits, TokioLimiter};
pub use parser::{parse_output, ParseOutcome, RESULT_PREFIXES};
pub use session::EvaluationSession;
