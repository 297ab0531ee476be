//! End-to-end tests for the `stepline` binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const REPORT: &str = r#"{
    "id": "report",
    "name": "Report",
    "description": "Render a character sheet",
    "version": "2.0.0",
    "parameters": [
        {"name": "characterName", "type": "string", "required": true},
        {"name": "level", "type": "int", "defaultValue": 1,
         "validation": [{"type": "min", "parameters": {"value": 1}}]}
    ],
    "steps": [
        {"id": "sheet", "type": "data-transform", "connector": "transform", "operation": "to_json",
         "parameters": {"value": {"name": "${input.characterName}", "level": "${input.level}"}}},
        {"id": "title", "type": "data-transform", "connector": "transform", "operation": "to_text",
         "condition": "${sheet.success}",
         "parameters": {"value": "${input.characterName} (level ${input.level})"}}
    ],
    "outputs": {
        "sheet": {"source": "${sheet.result}", "type": "string"},
        "title": {"source": "${title.result}", "type": "string"}
    }
}"#;

struct Env {
    _config_dir: TempDir,
    workflows: TempDir,
    config_dir: std::path::PathBuf,
}

fn env() -> Env {
    let config_dir = TempDir::new().unwrap();
    let workflows = TempDir::new().unwrap();
    std::fs::write(workflows.path().join("report.json"), REPORT).unwrap();
    Env {
        config_dir: config_dir.path().to_path_buf(),
        _config_dir: config_dir,
        workflows,
    }
}

fn stepline(env: &Env) -> Command {
    let mut cmd = Command::cargo_bin("stepline").unwrap();
    cmd.env("STEPLINE_CONFIG_DIR", &env.config_dir)
        .env_remove("STEPLINE_CONFIG")
        .env_remove("RUST_LOG")
        .current_dir(env.workflows.path())
        .arg("--workflows-dir")
        .arg(env.workflows.path());
    cmd
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).unwrap()
}

#[test]
fn list_shows_workflow_tools() {
    let env = env();
    stepline(&env)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("workflow_report"))
        .stdout(predicate::str::contains("Render a character sheet"));
}

#[test]
fn list_verbose_shows_parameters_and_connector_operations() {
    let env = env();
    stepline(&env)
        .args(["list", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("characterName: string (required)"))
        .stdout(predicate::str::contains("Connectors:"))
        .stdout(predicate::str::contains("transform: to_json"))
        .stdout(predicate::str::contains("http: get, post, request"))
        .stdout(predicate::str::contains("llm: generate"));
}

#[test]
fn list_json() {
    let env = env();
    let output = stepline(&env).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let tools = stdout_json(&output.stdout);
    assert_eq!(tools[0]["name"], "workflow_report");
    assert_eq!(tools[0]["inputSchema"]["required"][0], "characterName");
}

#[test]
fn schema_prints_input_schema() {
    let env = env();
    let output = stepline(&env).args(["schema", "report"]).output().unwrap();
    assert!(output.status.success());
    let schema = stdout_json(&output.stdout);
    assert_eq!(schema["properties"]["level"]["type"], "integer");
    assert_eq!(schema["properties"]["level"]["default"], 1);
}

#[test]
fn schema_for_unknown_workflow_fails() {
    let env = env();
    stepline(&env)
        .args(["schema", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Workflow not found: ghost"));
}

#[test]
fn run_executes_workflow() {
    let env = env();
    let output = stepline(&env)
        .args(["run", "report", "--json", "--session", "cli-1"])
        .args(["--input", r#"{"characterName": "Hero", "level": 3}"#])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let response = stdout_json(&output.stdout);
    assert_eq!(response["isError"], false);
    let payload: Value =
        serde_json::from_str(response["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["outputs"]["title"], "Hero (level 3)");
    assert_eq!(
        serde_json::from_str::<Value>(payload["outputs"]["sheet"].as_str().unwrap()).unwrap(),
        serde_json::json!({"name": "Hero", "level": 3})
    );
    assert_eq!(payload["metadata"]["sessionId"], "cli-1");
    assert_eq!(payload["metadata"]["workflowVersion"], "2.0.0");
}

#[test]
fn run_with_invalid_input_fails() {
    let env = env();
    stepline(&env)
        .args(["run", "report", "--input", r#"{"level": 0}"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "missing required parameter 'characterName'",
        ))
        .stdout(predicate::str::contains("parameter 'level' must be >= 1"));
}

#[test]
fn run_rejects_malformed_json_input() {
    let env = env();
    stepline(&env)
        .args(["run", "report", "--input", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input must be a JSON object"));
}

#[test]
fn validate_accepts_good_file() {
    let env = env();
    let file = env.workflows.path().join("report.json");
    stepline(&env)
        .arg("validate")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("report as workflow_report, 2 steps"));
}

#[test]
fn validate_rejects_forward_reference() {
    let env = env();
    let file = env.workflows.path().join("bad.json");
    write_forward_reference(&file);
    stepline(&env)
        .arg("validate")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid workflow"));
}

#[test]
fn config_show_prints_defaults() {
    let env = env();
    stepline(&env)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No config files loaded"))
        .stdout(predicate::str::contains("min_reload_interval_secs = 5"));
}

fn write_forward_reference(path: &Path) {
    let content = r#"{
        "id": "bad", "name": "bad",
        "steps": [
            {"id": "a", "connector": "transform", "operation": "to_text",
             "parameters": {"value": "${b.result}"}},
            {"id": "b", "connector": "transform", "operation": "to_text",
             "parameters": {"value": "x"}}
        ]
    }"#;
    std::fs::write(path, content).unwrap();
}
