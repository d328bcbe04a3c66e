//! Command-line target algorithm evaluator.
//!
//! The target algorithm is invoked as
//! `<algo> <instance> <instance-specifics> <cutoff> <runlength> <seed> <param> <value> ...`
//! and must print a result line such as
//! `Result for SMAC: SUCCESS, 1.23, 25, 0.99, 12345, 0` on standard output.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tae_types::{config_error, RunRequest, RunResult, RunStatus, ScenarioConfig, TaeResult};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::evaluator::TargetAlgorithmEvaluator;
use crate::parser::{parse_output, ParseOutcome};

/// Cutoff rendered on the command line when a request has none.
pub const UNBOUNDED_CUTOFF: &str = "99999999999999";

/// Instance rendered on the command line when a request has none.
pub const NO_INSTANCE: &str = "0";

/// How much trailing stderr is kept in a crashed run's info.
const STDERR_TAIL_BYTES: usize = 2048;

/// Shortest wait for remaining output once the process is gone.
const MIN_DRAIN: Duration = Duration::from_millis(100);

/// Runs the target algorithm as a subprocess and parses its result line.
#[derive(Debug, Clone)]
pub struct CommandLineEvaluator {
    scenario: ScenarioConfig,
    program: String,
    base_args: Vec<String>,
}

impl CommandLineEvaluator {
    pub fn new(scenario: ScenarioConfig) -> TaeResult<Self> {
        scenario.validate()?;
        let mut tokens = scenario.algo.split_whitespace().map(str::to_string);
        let program = tokens
            .next()
            .ok_or_else(|| config_error!("algo must name the target algorithm to run"))?;
        let base_args = tokens.collect();

        Ok(Self {
            scenario,
            program,
            base_args,
        })
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    /// Full argument vector, program first.
    pub fn command_line(&self, request: &RunRequest) -> Vec<String> {
        let mut argv = Vec::with_capacity(7 + self.base_args.len() + 2 * request.configuration.len());
        argv.push(self.program.clone());
        argv.extend(self.base_args.iter().cloned());
        argv.push(request.instance.clone().unwrap_or_else(|| NO_INSTANCE.to_string()));
        argv.push(request.instance_specific.clone());
        argv.push(match request.cutoff {
            Some(cutoff) => cutoff.to_string(),
            None => UNBOUNDED_CUTOFF.to_string(),
        });
        argv.push(request.runlength.to_string());
        argv.push(request.seed.to_string());
        for (name, value) in request.configuration.iter() {
            argv.push(format!("{}{}", self.scenario.param_prefix, name));
            argv.push(value.to_string());
        }
        argv
    }

    fn crashed(&self, request: &RunRequest, runtime: f64, reason: String) -> RunResult {
        warn!("Target algorithm run crashed: {}", reason);
        RunResult::from_status(RunStatus::Crashed, request)
            .with_runtime(runtime)
            .with_quality(self.scenario.cost_for_crash)
            .with_info("error", reason)
    }
}

#[async_trait]
impl TargetAlgorithmEvaluator for CommandLineEvaluator {
    async fn run(&self, request: &RunRequest) -> TaeResult<RunResult> {
        request.validate()?;
        let limit = request
            .cutoff
            .map(|cutoff| {
                Duration::try_from_secs_f64(cutoff + self.scenario.kill_grace_seconds)
                    .map_err(|e| config_error!("cutoff {cutoff}s cannot be enforced: {e}"))
            })
            .transpose()?;

        let argv = self.command_line(request);
        info!("Running target algorithm: {}", argv.join(" "));

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.scenario.working_dir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("failed to start '{}': {e}", argv[0]);
                return Ok(self.crashed(request, start.elapsed().as_secs_f64(), reason));
            }
        };

        let stdout = child.stdout.take().map(OutputReader::spawn);
        let stderr = child.stderr.take().map(OutputReader::spawn);

        let exit: Option<ExitStatus> = match limit {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    warn!(
                        "Target algorithm exceeded {:.3}s, killing pid {:?}",
                        limit.as_secs_f64(),
                        child.id()
                    );
                    child.kill().await?;
                    None
                }
            },
            None => Some(child.wait().await?),
        };
        let runtime = start.elapsed().as_secs_f64();

        // Background processes may inherit the pipes and keep them open
        // after the algorithm itself is gone.
        let drain = limit.map(|limit| match exit {
            Some(_) => limit.saturating_sub(start.elapsed()).max(MIN_DRAIN),
            None => Duration::try_from_secs_f64(self.scenario.kill_grace_seconds)
                .unwrap_or(MIN_DRAIN)
                .max(MIN_DRAIN),
        });
        let (stdout, stderr) = tokio::join!(
            OutputReader::collect(stdout, drain),
            OutputReader::collect(stderr, drain)
        );

        match parse_output(&stdout, self.scenario.call_format, request) {
            ParseOutcome::Parsed(result) => {
                if let Some(status) = exit.filter(|s| !s.success()) {
                    debug!("Result line found despite abnormal exit ({status})");
                }
                Ok(result)
            }
            outcome => {
                if exit.is_none() {
                    let cutoff = request.cutoff.unwrap_or(runtime);
                    return Ok(RunResult::from_status(RunStatus::Timeout, request)
                        .with_runtime(cutoff)
                        .with_quality(self.scenario.cost_for_crash)
                        .with_info("error", format!("killed after exceeding cutoff of {cutoff}s")));
                }

                let mut reason = match outcome {
                    ParseOutcome::Malformed(e) => format!("malformed result line: {e}"),
                    _ => "no result line found in target algorithm output".to_string(),
                };
                if let Some(status) = exit {
                    reason.push_str(&format!(" ({status})"));
                }
                let stderr_tail = tail(&stderr, STDERR_TAIL_BYTES);
                let mut result = self.crashed(request, runtime, reason);
                if !stderr_tail.is_empty() {
                    result = result.with_info("stderr", stderr_tail);
                }
                Ok(result)
            }
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Accumulates a pipe into a shared buffer so output read before a deadline
/// survives when the reader is abandoned.
struct OutputReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputReader {
    fn spawn<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        warn!("Failed to read target algorithm output: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buffer, task }
    }

    /// Wait for end of stream, at most `limit`, and return what was read.
    async fn collect(reader: Option<Self>, limit: Option<Duration>) -> String {
        let Some(mut reader) = reader else {
            return String::new();
        };
        let joined = match limit {
            Some(limit) => match tokio::time::timeout(limit, &mut reader.task).await {
                Ok(joined) => joined,
                Err(_) => {
                    debug!(
                        "Output still open after {:.3}s, keeping partial output",
                        limit.as_secs_f64()
                    );
                    reader.task.abort();
                    Ok(())
                }
            },
            None => (&mut reader.task).await,
        };
        if let Err(e) = joined {
            warn!("Output reader task failed: {}", e);
        }
        let output = String::from_utf8_lossy(&reader.buffer.lock()).into_owned();
        output
    }
}

/// Last `max_bytes` of `text`, cut at a char boundary.
fn tail(text: &str, max_bytes: usize) -> &str {
    let text = text.trim_end();
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
