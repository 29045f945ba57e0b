//! Execution trace log (`traces.jsonl`).
//!
//! One line per executed plan. Plans are transcribed speech, so users do
//! read secrets aloud; every string is scrubbed before it is written.

use crate::core::error::PlanGateError;
use crate::core::time;
use crate::engine::specification::ExecutionResult;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

#[derive(Debug, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub ts: String,
    pub actor: String,
    pub op: String,
    pub request: Value,
    pub response: Value,
}

static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(AKIA|ASIA|AGPA|AIDA)[0-9A-Z]{16}", "[AWS_KEY_REDACTED]"),
        (r"(ghp|gho|ghu|ghs|ghr)_[a-zA-Z0-9_]{36,255}", "[GITHUB_TOKEN_REDACTED]"),
        (r"(?i)bearer\s+[a-zA-Z0-9_\-\.]{20,}", "[BEARER_REDACTED]"),
        (
            r#"(?i)(api[_-]?key|apikey|secret[_-]?key)['"]?\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{20,}['"]?"#,
            "[API_KEY_REDACTED]",
        ),
        (
            r#"(?i)(password|passwd|pwd)(\s+is)?['"]?\s*[:=]?\s*['"]?[^\s'"]{8,}['"]?"#,
            "[PASSWORD_REDACTED]",
        ),
        // Card-like digit runs.
        (r"\b(?:\d[ -]?){13,19}\b", "[NUMBER_REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

pub fn redact_string(input: &str) -> String {
    let mut result = input.to_string();
    for (pattern, replacement) in SECRET_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }
    result
}

/// Recursively redacts a JSON value. Sensitive-looking keys are replaced
/// wholesale; strings are scanned for secret patterns.
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                let lower = key.to_lowercase();
                if ["token", "secret", "password", "api_key", "authorization"]
                    .iter()
                    .any(|s| lower.contains(s))
                {
                    out.insert(key, Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(key, redact(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        Value::String(s) => Value::String(redact_string(&s)),
        other => other,
    }
}

/// SHA-256 of the plan's canonical JSON text, hex encoded.
pub fn plan_digest(plan: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plan.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn append_trace(path: &Path, event: TraceEvent) -> Result<(), PlanGateError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let event = TraceEvent {
        request: redact(event.request),
        response: redact(event.response),
        ..event
    };
    writeln!(file, "{}", serde_json::to_string(&event)?)?;
    Ok(())
}

/// Appends the trace for one `run_plan` call, stamped with `now`.
pub fn append_execution(
    path: &Path,
    now: DateTime<Utc>,
    actor: &str,
    plan: &Value,
    result: &ExecutionResult,
) -> Result<(), PlanGateError> {
    append_trace(
        path,
        TraceEvent {
            trace_id: time::new_event_id(),
            ts: time::to_storage(now),
            actor: actor.to_string(),
            op: "plan.execute".to_string(),
            request: json!({
                "plan_digest": plan_digest(plan),
                "plan": plan,
            }),
            response: json!({
                "success": result.success,
                "state": result.state,
                "error": result.error,
                "steps_executed": result.steps_executed,
                "latency_ms": result.latency_ms,
            }),
        },
    )
}

/// Last `n` raw trace lines, oldest first.
pub fn last_traces(path: &Path, n: usize) -> Result<Vec<String>, PlanGateError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn spoken_password_is_redacted() {
        let out = redact_string("remember my password is hunter2hunter2");
        assert!(out.contains("[PASSWORD_REDACTED]"));
        assert!(!out.contains("hunter2hunter2"));
    }

    #[test]
    fn card_numbers_are_redacted() {
        let out = redact_string("pay card 4111 1111 1111 1111 tomorrow");
        assert!(out.contains("[NUMBER_REDACTED]"));
        assert!(!out.contains("4111 1111"));
    }

    #[test]
    fn ordinary_task_text_is_untouched() {
        let input = "Call mom about the 3 tickets";
        assert_eq!(redact_string(input), input);
    }

    #[test]
    fn sensitive_keys_are_replaced() {
        let val = serde_json::json!({"api_key": "abc", "title": "Buy milk"});
        let out = redact(val);
        assert_eq!(out["api_key"], "[REDACTED]");
        assert_eq!(out["title"], "Buy milk");
    }

    #[test]
    fn digest_is_stable() {
        let plan = serde_json::json!({"complexity": "simple"});
        assert_eq!(plan_digest(&plan), plan_digest(&plan.clone()));
        assert_eq!(plan_digest(&plan).len(), 64);
    }

    #[test]
    fn traces_append_redacted_lines() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("logs").join("traces.jsonl");
        append_trace(
            &path,
            TraceEvent {
                trace_id: "t1".into(),
                ts: "now".into(),
                actor: "u1".into(),
                op: "plan.execute".into(),
                request: serde_json::json!({"note": "my password is correcthorse"}),
                response: Value::Null,
            },
        )
        .unwrap();
        let lines = last_traces(&path, 10).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].contains("correcthorse"));
    }
}
