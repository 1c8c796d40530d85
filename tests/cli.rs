use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn journey_flow() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("journey-flow"))
}

#[test]
fn validate_reports_ok() {
    journey_flow()
        .args(["validate", "tests/data/signup.json", "tests/data/survey.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK  tests/data/signup.json (signup)"))
        .stdout(predicate::str::contains("All flows valid"));
}

#[test]
fn validate_fails_on_missing_start() {
    journey_flow()
        .args(["validate", "tests/data/no_start.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no start node"));
}

#[test]
fn validate_json_mode_emits_summary() {
    let assert = journey_flow()
        .args(["validate", "--json", "tests/data/signup.json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let payload: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(payload["ok"], Value::Bool(true));
    assert_eq!(payload["flow"]["id"].as_str(), Some("signup"));
    assert_eq!(payload["flow"]["start"].as_str(), Some("start"));
}

#[test]
fn validate_json_mode_reports_schema_pointer() {
    let assert = journey_flow()
        .args(["validate", "--json", "tests/data/bad_node_type.json"])
        .assert()
        .failure();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let payload: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(payload["ok"], Value::Bool(false));
    let errors = payload["errors"].as_array().expect("errors array");
    assert!(
        errors
            .iter()
            .any(|error| error.get("json_pointer").and_then(Value::as_str).is_some()),
        "expected an error with a json_pointer"
    );
}

#[test]
fn validate_json_mode_reports_lint_errors() {
    let assert = journey_flow()
        .args(["validate", "--json", "tests/data/dangling.json"])
        .assert()
        .failure();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let payload: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(payload["flow"]["id"].as_str(), Some("dangling"));
    assert!(!payload["errors"].as_array().unwrap().is_empty());
}

#[test]
fn next_follows_condition() {
    journey_flow()
        .args([
            "next",
            "--flow",
            "tests/data/signup.json",
            "--node",
            "B",
            "--context",
            r#"{"status":"ok"}"#,
        ])
        .assert()
        .success()
        .stdout("end\n");
    journey_flow()
        .args(["next", "--flow", "tests/data/signup.json", "--node", "B"])
        .assert()
        .success()
        .stdout("A\n");
    journey_flow()
        .args(["next", "--flow", "tests/data/signup.json", "--node", "end"])
        .assert()
        .success()
        .stdout("none\n");
}

#[test]
fn next_unknown_node_fails() {
    journey_flow()
        .args(["next", "--flow", "tests/data/signup.json", "--node", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Node 'nope' not found"));
}

#[test]
fn interpolate_prints_rendered_template() {
    journey_flow()
        .args([
            "interpolate",
            "--template",
            "Hi {{ user.name }}, {{missing}}",
            "--context",
            r#"{"user":{"name":"Ada"}}"#,
        ])
        .assert()
        .success()
        .stdout("Hi Ada, undefined\n");
}

#[test]
fn interpolate_rejects_non_object_context() {
    journey_flow()
        .args(["interpolate", "--template", "x", "--context", "[1]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be a JSON object"));
}

#[test]
fn run_prints_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let assert = journey_flow()
        .args([
            "run",
            "--flow",
            "tests/data/linear.json",
            "--answers",
            "tests/data/linear_answers.json",
            "--storage",
        ])
        .arg(dir.path())
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let steps: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let statuses: Vec<(&str, &str)> = steps
        .iter()
        .map(|s| (s["status"].as_str().unwrap(), s["node_id"].as_str().unwrap()))
        .collect();
    assert_eq!(
        statuses,
        vec![("render", "name"), ("render", "thanks"), ("complete", "done")]
    );

    let saved = std::fs::read_to_string(dir.path().join("flow_context_linear.json")).unwrap();
    let saved: Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved["name"].as_str(), Some("Ada"));
}
