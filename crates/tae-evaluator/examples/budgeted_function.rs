use std::sync::Arc;

use serde_json::json;
use tae_evaluator::{maximize, CallContext, EvaluationSession, FunctionEvaluator};
use tae_types::{Configuration, ParameterValue, RunRequest, ScenarioConfig};

/// Stand-in for a training run: "accuracy" improves with the epoch budget and
/// peaks at a learning rate of 0.01.
fn accuracy(config: &Configuration, ctx: &CallContext) -> anyhow::Result<(f64, serde_json::Value)> {
    let lr = match config.get("learning_rate_init") {
        Some(ParameterValue::Float(lr)) => *lr,
        other => anyhow::bail!("learning_rate_init missing or not a float: {other:?}"),
    };
    let epochs = ctx.budget.unwrap_or(1.0).ceil();
    let fit = 1.0 - (lr.log10() + 2.0).abs() / 4.0;
    let score = fit * (1.0 - (-epochs / 10.0).exp());
    Ok((score, json!({ "epochs": epochs })))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Budgeted function evaluation example");

    let tae = FunctionEvaluator::new(maximize(accuracy)).with_name("mlp_from_cfg");
    let scenario = ScenarioConfig::default().with_cutoff(30.0).with_concurrency(4);
    let session = EvaluationSession::new(Arc::new(tae), scenario)?;

    let requests: Vec<RunRequest> = [0.0001, 0.001, 0.01, 0.1]
        .iter()
        .flat_map(|lr| {
            [5.0, 50.0].into_iter().map(move |budget| {
                RunRequest::new(Configuration::new().with("learning_rate_init", *lr))
                    .with_instance("1")
                    .with_budget(budget)
            })
        })
        .collect();

    for outcome in session.evaluate_batch(requests).await {
        let value = outcome?;
        println!(
            "lr={} budget={:?} -> cost {:.4}",
            value.request.configuration.get("learning_rate_init").map(|v| v.to_string()).unwrap_or_default(),
            value.request.budget,
            value.cost
        );
    }

    if let Some(best) = session.history().incumbent() {
        println!("Incumbent cost: {:.4}", best.cost);
    }
    println!("Stats: {:?}", session.history().stats());
    Ok(())
}
