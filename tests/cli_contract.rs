use regex::Regex;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn plangate(root: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_plangate"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("PLANGATE_DB")
        .env_remove("PLANGATE_STEP_CEILING")
        .env("PLANGATE_LOG", "error")
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to execute plangate");
    if let (Some(mut pipe), Some(input)) = (child.stdin.take(), stdin) {
        pipe.write_all(input.as_bytes()).expect("write stdin");
    }
    child.wait_with_output().expect("wait for plangate")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn exec_json(root: &Path, user: &str, plan: &str) -> (i32, Value) {
    let output = plangate(
        root,
        &["exec", "--user", user, "--session", "phone", "--format", "json"],
        Some(plan),
    );
    let value = serde_json::from_str(&stdout(&output)).unwrap_or_else(|e| {
        panic!(
            "exec output is not JSON ({e}): {}\nstderr: {}",
            stdout(&output),
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output.status.code().expect("exit code"), value)
}

#[test]
fn init_writes_config_and_database() {
    let tmp = TempDir::new().expect("tempdir");
    let output = plangate(tmp.path(), &["init"], None);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(tmp.path().join("plangate.toml").exists());
    assert!(tmp.path().join("tasks.db").exists());

    let config = fs::read_to_string(tmp.path().join("plangate.toml")).expect("config");
    assert!(config.contains("interactive_step_ceiling = 5"));
}

#[test]
fn filters_lists_the_whitelist() {
    let tmp = TempDir::new().expect("tempdir");
    let output = plangate(tmp.path(), &["filters", "--format", "json"], None);
    assert!(output.status.success());
    let rows: Vec<Value> = serde_json::from_str(&stdout(&output)).expect("json");
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    for expected in ["is_overdue", "is_today", "priority_min", "keyword", "date_range"] {
        assert!(names.contains(&expected), "missing filter {expected}");
    }

    let text = stdout(&plangate(tmp.path(), &["filters"], None));
    let re = Regex::new(r"(?m)^keyword\s+").expect("valid regex");
    assert!(re.is_match(&text));
}

#[test]
fn validate_reports_kind_and_exit_code() {
    let tmp = TempDir::new().expect("tempdir");
    let good = r#"{"complexity":"simple","steps":[{"operation":"read","filters":[{"name":"is_today"}]}]}"#;
    let output = plangate(tmp.path(), &["validate"], Some(good));
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("valid"));

    let bad = r#"{"complexity":"simple","steps":[{"operation":"read","filters":[{"name":"1=1; DROP TABLE tasks"}]}]}"#;
    let output = plangate(tmp.path(), &["validate", "--format", "json"], Some(bad));
    assert_eq!(output.status.code(), Some(1));
    let body: Value = serde_json::from_str(&stdout(&output)).expect("json");
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "InvalidSpecification");
    assert!(!tmp.path().join("tasks.db").exists());
}

#[test]
fn exec_keeps_ordinals_between_invocations() {
    let tmp = TempDir::new().expect("tempdir");
    let plan_file = tmp.path().join("create.json");
    fs::write(
        &plan_file,
        r#"{"complexity":"multi_step","steps":[
            {"operation":"create","params":{"title":"Call mom"}},
            {"operation":"create","params":{"title":"Buy milk","priority":"high"}}
        ],"natural_response":"Added both."}"#,
    )
    .expect("write plan");
    let plan_arg = plan_file.to_string_lossy().to_string();
    let output = plangate(
        tmp.path(),
        &["exec", "--user", "alice", "--session", "phone", "--plan", &plan_arg],
        None,
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("Created: \"Buy milk\""));

    let (code, listing) = exec_json(
        tmp.path(),
        "alice",
        r#"{"complexity":"simple","steps":[{"operation":"read"}]}"#,
    );
    assert_eq!(code, 0);
    assert_eq!(listing["data"][0]["title"], "Buy milk");
    assert_eq!(listing["data"][1]["title"], "Call mom");

    let (code, updated) = exec_json(
        tmp.path(),
        "alice",
        r#"{"complexity":"simple","steps":[{"operation":"update","target":{"ordinal":2},"params":{"status":"completed"}}]}"#,
    );
    assert_eq!(code, 0, "{updated}");
    assert_eq!(updated["data"]["title"], "Call mom");
    assert_eq!(updated["data"]["status"], "completed");

    let trace = fs::read_to_string(tmp.path().join("traces.jsonl")).expect("traces");
    assert_eq!(trace.lines().count(), 3);
}

#[test]
fn exec_failure_exits_nonzero_with_safe_text() {
    let tmp = TempDir::new().expect("tempdir");
    let (code, result) = exec_json(tmp.path(), "alice", "not json at all");
    assert_eq!(code, 1);
    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "InvalidSpecification");
    assert_eq!(result["steps_executed"], 0);

    let (code, result) = exec_json(
        tmp.path(),
        "bob",
        r#"{"complexity":"simple","steps":[{"operation":"delete","target":{"ordinal":1}}]}"#,
    );
    assert_eq!(code, 1);
    assert_eq!(result["error"], "NotFound");
    assert_eq!(result["natural_response"], "I couldn't find that task.");
}
