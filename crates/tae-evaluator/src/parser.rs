//! Parsing of result lines printed by command-line target algorithms.

use tae_types::{AdditionalInfo, CallFormat, RunRequest, RunResult, RunStatus};
use tracing::{debug, warn};

/// Equivalent prefixes that introduce a result line.
pub const RESULT_PREFIXES: [&str; 3] = [
    "Result of this algorithm run:",
    "Result for SMAC:",
    "Result for ParamILS:",
];

/// What scanning an algorithm's output produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The first valid result line.
    Parsed(RunResult),
    /// No line carried a result prefix.
    Missing,
    /// Result lines were present but none could be parsed; holds the last
    /// parse error.
    Malformed(String),
}

/// Scan `output` line by line and parse the first valid result line.
pub fn parse_output(output: &str, format: CallFormat, request: &RunRequest) -> ParseOutcome {
    let mut parsed: Option<RunResult> = None;
    let mut last_error: Option<String> = None;

    for (line_num, line) in output.lines().enumerate() {
        let Some(payload) = result_payload(line) else {
            continue;
        };

        if parsed.is_some() {
            warn!("Ignoring additional result line {}: {}", line_num + 1, line.trim());
            continue;
        }

        let attempt = match format {
            CallFormat::Legacy => parse_legacy(payload, request),
            CallFormat::Aclib => parse_aclib(payload, request),
        };
        match attempt {
            Ok(result) => {
                debug!("Parsed result line {}: {}", line_num + 1, line.trim());
                parsed = Some(result);
            }
            Err(e) => {
                warn!("Skipping malformed result line {}: {}", line_num + 1, e);
                last_error = Some(e);
            }
        }
    }

    match (parsed, last_error) {
        (Some(result), _) => ParseOutcome::Parsed(result),
        (None, Some(error)) => ParseOutcome::Malformed(error),
        (None, None) => ParseOutcome::Missing,
    }
}

/// Text after the first result prefix found in `line`.
fn result_payload(line: &str) -> Option<&str> {
    RESULT_PREFIXES
        .iter()
        .filter_map(|prefix| line.find(prefix).map(|pos| &line[pos + prefix.len()..]))
        .next()
}

/// `STATUS, runtime, runlength, quality[, seed[, instance-specifics]]`
///
/// The sixth field takes the rest of the line, commas included.
pub fn parse_legacy(payload: &str, request: &RunRequest) -> Result<RunResult, String> {
    let fields: Vec<&str> = payload.splitn(6, ',').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(format!(
            "expected at least 4 comma-separated fields, got {}: '{}'",
            fields.len(),
            payload.trim()
        ));
    }

    let status = RunStatus::parse(fields[0]).map_err(|e| e.to_string())?;
    let runtime = parse_number(fields[1], "running time")?;
    let runlength = parse_number(fields[2], "runlength")?;
    let quality = parse_number(fields[3], "quality")?;
    let seed = match fields.get(4) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<i64>()
            .map_err(|_| format!("invalid seed '{raw}'"))?,
        _ => request.seed,
    };
    let instance_specific = match fields.get(5) {
        Some(raw) => raw.to_string(),
        None => request.instance_specific.clone(),
    };

    Ok(RunResult {
        status,
        runtime,
        runlength,
        quality,
        seed,
        instance_specific,
        additional_info: AdditionalInfo::new(),
    })
}

/// JSON object after the prefix, e.g.
/// `{"status": "SUCCESS", "cost": 0.3, "runtime": 1.2}`.
pub fn parse_aclib(payload: &str, request: &RunRequest) -> Result<RunResult, String> {
    let value: serde_json::Value =
        serde_json::from_str(payload.trim()).map_err(|e| format!("invalid JSON payload: {e}"))?;
    let serde_json::Value::Object(mut fields) = value else {
        return Err("JSON payload is not an object".to_string());
    };

    let status = match fields.remove("status") {
        Some(serde_json::Value::String(word)) => {
            RunStatus::parse(&word).map_err(|e| e.to_string())?
        }
        Some(other) => return Err(format!("status must be a string, got {other}")),
        None => return Err("missing 'status' field".to_string()),
    };

    let quality = take_number(&mut fields, "cost")?
        .or(take_number(&mut fields, "quality")?)
        .unwrap_or(0.0);
    let runtime = take_number(&mut fields, "runtime")?.unwrap_or(0.0);
    let runlength = take_number(&mut fields, "runlength")?.unwrap_or(0.0);
    let seed = match fields.remove("seed") {
        Some(v) => v.as_i64().ok_or_else(|| format!("invalid seed {v}"))?,
        None => request.seed,
    };
    let instance_specific = match fields
        .remove("instance_specifics")
        .or_else(|| fields.remove("misc"))
    {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => request.instance_specific.clone(),
    };

    Ok(RunResult {
        status,
        runtime,
        runlength,
        quality,
        seed,
        instance_specific,
        additional_info: fields,
    })
}

fn parse_number(raw: &str, what: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(format!("{what} must be finite, got '{raw}'")),
        Err(_) => Err(format!("invalid {what} '{raw}'")),
    }
}

fn take_number(fields: &mut AdditionalInfo, key: &str) -> Result<Option<f64>, String> {
    match fields.remove(key) {
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| format!("'{key}' must be a finite number, got {v}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tae_types::Configuration;

    fn request() -> RunRequest {
        RunRequest::new(Configuration::new())
            .with_instance("123")
            .with_seed(12345)
            .with_instance_specific("0")
    }

    fn parsed(outcome: ParseOutcome) -> RunResult {
        match outcome {
            ParseOutcome::Parsed(result) => result,
            other => panic!("expected a parsed result, got {other:?}"),
        }
    }

    #[test]
    fn parses_smac_line() {
        let output = "starting\nResult for SMAC: SUCCESS, 1.23, 25, 0.99, 12345, 0\n";
        let result = parsed(parse_output(output, CallFormat::Legacy, &request()));
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.runtime, 1.23);
        assert_eq!(result.runlength, 25.0);
        assert_eq!(result.quality, 0.99);
        assert_eq!(result.seed, 12345);
        assert_eq!(result.instance_specific, "0");
        assert!(result.additional_info.is_empty());
    }

    #[test]
    fn all_prefixes_are_equivalent() {
        for prefix in RESULT_PREFIXES {
            let output = format!("{prefix} TIMEOUT, 10, 0, 0, 1, x");
            let result = parsed(parse_output(&output, CallFormat::Legacy, &request()));
            assert_eq!(result.status, RunStatus::Timeout);
            assert_eq!(result.seed, 1);
        }
    }

    #[test]
    fn sat_and_unsat_become_success() {
        for word in ["SAT", "UNSAT"] {
            let output = format!("Result of this algorithm run: {word}, 0.5, 3, 0, 7, 0");
            let result = parsed(parse_output(&output, CallFormat::Legacy, &request()));
            assert_eq!(result.status, RunStatus::Success);
        }
    }

    #[test]
    fn first_valid_line_wins() {
        let output = "Result for SMAC: SUCCESS, 1, 0, 0.5, 1, 0\nResult for SMAC: CRASHED, 2, 0, 9, 1, 0";
        let result = parsed(parse_output(output, CallFormat::Legacy, &request()));
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.quality, 0.5);
    }

    #[test]
    fn malformed_line_is_skipped_for_later_valid_one() {
        let output = "Result for SMAC: WHATEVER, 1, 0, 0\nResult for SMAC: SUCCESS, 1, 0, 0.1";
        let result = parsed(parse_output(output, CallFormat::Legacy, &request()));
        assert_eq!(result.quality, 0.1);
    }

    #[test]
    fn missing_seed_and_specifics_echo_request() {
        let output = "Result for ParamILS: SUCCESS, 1.0, 0, 4.5";
        let result = parsed(parse_output(output, CallFormat::Legacy, &request()));
        assert_eq!(result.seed, 12345);
        assert_eq!(result.instance_specific, "0");
    }

    #[test]
    fn instance_specifics_keep_commas() {
        let output = "Result for SMAC: SUCCESS, 1.0, 0, 4.5, 3, a, b,c";
        let result = parsed(parse_output(output, CallFormat::Legacy, &request()));
        assert_eq!(result.instance_specific, "a, b,c");
    }

    #[test]
    fn no_result_line_is_missing() {
        let outcome = parse_output("nothing to see\n", CallFormat::Legacy, &request());
        assert_eq!(outcome, ParseOutcome::Missing);
    }

    #[test]
    fn bad_fields_are_malformed() {
        let outcome = parse_output("Result for SMAC: SUCCESS, fast, 0, 1", CallFormat::Legacy, &request());
        match outcome {
            ParseOutcome::Malformed(msg) => assert!(msg.contains("running time")),
            other => panic!("expected malformed, got {other:?}"),
        }

        let outcome = parse_output("Result for SMAC: SUCCESS, 1", CallFormat::Legacy, &request());
        assert!(matches!(outcome, ParseOutcome::Malformed(_)));
    }

    #[test]
    fn non_finite_numbers_are_malformed() {
        for line in [
            "Result for SMAC: SUCCESS, 0.1, 0, NaN, 1, 0",
            "Result for SMAC: SUCCESS, inf, 0, 0.5, 1, 0",
            "Result for SMAC: SUCCESS, 0.1, -infinity, 0.5, 1, 0",
        ] {
            match parse_output(line, CallFormat::Legacy, &request()) {
                ParseOutcome::Malformed(msg) => assert!(msg.contains("finite"), "{msg}"),
                other => panic!("expected malformed for {line}, got {other:?}"),
            }
        }

        // A later finite line still wins
        let output = "Result for SMAC: SUCCESS, 0.1, 0, NaN, 1, 0\nResult for SMAC: SUCCESS, 0.1, 0, 0.7, 1, 0";
        assert_eq!(parsed(parse_output(output, CallFormat::Legacy, &request())).quality, 0.7);
    }

    #[test]
    fn abort_and_crashed_are_distinct() {
        let abort = parsed(parse_output("Result for SMAC: ABORT, 0, 0, 0, 1, 0", CallFormat::Legacy, &request()));
        let crashed = parsed(parse_output("Result for SMAC: CRASHED, 0, 0, 0, 1, 0", CallFormat::Legacy, &request()));
        assert!(abort.status.is_fatal());
        assert!(!crashed.status.is_fatal());
        assert_ne!(abort.status, crashed.status);
    }

    #[test]
    fn aclib_json_payload() {
        let output = r#"Result of this algorithm run: {"status": "SAT", "cost": 0.3, "runtime": 1.5, "gap": 0.01}"#;
        let result = parsed(parse_output(output, CallFormat::Aclib, &request()));
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.quality, 0.3);
        assert_eq!(result.runtime, 1.5);
        assert_eq!(result.seed, 12345);
        assert_eq!(result.additional_info.get("gap"), Some(&serde_json::json!(0.01)));
    }

    #[test]
    fn aclib_requires_status() {
        let output = r#"Result of this algorithm run: {"cost": 0.3}"#;
        assert!(matches!(
            parse_output(output, CallFormat::Aclib, &request()),
            ParseOutcome::Malformed(_)
        ));
    }
}
