//! End-to-end tests for the `ralph` binary.
//!
//! Every test substitutes a shell one-liner for the real agent so the loop,
//! the token window and the workspace files can be checked without network
//! access.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Agent that reads its prompt and reports 120 tokens of usage.
const FAKE_AGENT: &str =
    r#"cat > /dev/null; echo '{"type": "result", "usage": {"input_tokens": 100, "output_tokens": 20}}'"#;

/// Every environment key the binary reads, so the developer's own settings
/// cannot leak into a test run.
const ENV_VARS: &[&str] = &[
    "RALPH_MODEL",
    "RALPH_WORKSPACE",
    "RALPH_WORKSPACE_DIR",
    "RALPH_MAX_ITERATIONS",
    "RALPH_MAX_STEPS",
    "RALPH_TOKEN_LIMIT",
    "RALPH_SAFETY_MARGIN",
    "RALPH_WINDOW_SECONDS",
    "RALPH_WAIT_BUFFER_SECONDS",
    "RALPH_BASE_OVERHEAD_TOKENS",
    "RALPH_TOKENS_PER_TOOL_CALL",
    "RALPH_EXPECTED_TOOL_CALLS",
    "RALPH_PERSIST_TRACKER",
    "RALPH_TRACKER_FILE",
    "RALPH_MIN_ITERATION_INTERVAL_SECS",
    "RALPH_RETRY_ATTEMPTS",
    "RALPH_RETRY_INITIAL_DELAY_SECS",
    "RALPH_AGENT_COMMAND",
    "RALPH_VERBOSE",
    "RUST_LOG",
];

#[allow(deprecated)]
fn ralph_cmd() -> Command {
    let mut cmd = Command::cargo_bin("ralph").expect("Failed to find ralph binary");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

fn workspace_in(temp_dir: &TempDir) -> std::path::PathBuf {
    temp_dir.path().join("ws")
}

fn run_json_files(workspace: &Path) -> usize {
    fs::read_dir(workspace.join(".ralph").join("runs"))
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
                .count()
        })
        .unwrap_or(0)
}

/// Two iterations with a fake agent leave state, tracker and metrics behind.
#[test]
fn test_runs_until_max_iterations() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let workspace = workspace_in(&temp_dir);

    ralph_cmd()
        .current_dir(temp_dir.path())
        .args(["--max-iterations", "2", "--agent-command", FAKE_AGENT])
        .arg("--workspace")
        .arg(&workspace)
        .arg("Write a haiku about tokens")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Iteration 1"))
        .stdout(predicate::str::contains("Iteration 2"))
        .stdout(predicate::str::contains("Tokens this iteration: 120"))
        .stdout(predicate::str::contains("Ralph Session Complete"))
        .stdout(predicate::str::contains("reached maximum iterations (2)"));

    let state = fs::read_to_string(workspace.join("state.md")).expect("state.md should exist");
    assert!(state.contains("Write a haiku about tokens"));
    assert!(workspace.join("output").is_dir());

    let tracker = fs::read_to_string(workspace.join(".ralph_tokens.json")).expect("tracker snapshot should exist");
    assert!(tracker.contains("usage_history"));
    let snapshot: serde_json::Value = serde_json::from_str(&tracker).expect("tracker snapshot is JSON");
    let records = snapshot["usage_history"].as_array().expect("usage_history is an array");
    assert_eq!(records.len(), 2);

    assert_eq!(run_json_files(&workspace), 1);
}

/// A second process sees the tokens the first one spent in the window.
#[test]
fn test_window_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let workspace = workspace_in(&temp_dir);

    let run = || {
        ralph_cmd()
            .current_dir(temp_dir.path())
            .args(["--max-iterations", "1", "--agent-command", FAKE_AGENT])
            .arg("--workspace")
            .arg(&workspace)
            .arg("Count tokens")
            .timeout(std::time::Duration::from_secs(30))
            .assert()
            .success()
    };

    run().stdout(predicate::str::contains("from previous runs").not());
    run().stdout(predicate::str::contains("Found 120 tokens used in the last 60s from previous runs"));

    let tracker = fs::read_to_string(workspace.join(".ralph_tokens.json")).expect("tracker snapshot should exist");
    let snapshot: serde_json::Value = serde_json::from_str(&tracker).expect("tracker snapshot is JSON");
    assert_eq!(snapshot["usage_history"].as_array().map(Vec::len), Some(2));
}

/// An existing state.md at the cap leaves exactly one iteration to run.
#[test]
fn test_resumes_from_state_iteration() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let workspace = workspace_in(&temp_dir);
    fs::create_dir_all(&workspace).expect("Failed to create workspace");
    fs::write(
        workspace.join("state.md"),
        "# Ralph State\n\n## Task\nKeep going\n\n## Iteration\n3\n\n## Status\nin_progress\n",
    )
    .expect("Failed to write state.md");

    ralph_cmd()
        .current_dir(temp_dir.path())
        .args(["--max-iterations", "3", "--agent-command", "echo run >> runs.log"])
        .arg("--workspace")
        .arg(&workspace)
        .arg("Keep going")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Resuming from iteration 3"))
        .stdout(predicate::str::contains("Iteration 3"));

    let log = fs::read_to_string(workspace.join("runs.log")).expect("agent should have run");
    assert_eq!(log.lines().count(), 1);
}

/// Agent failures are reported and the run still finishes cleanly.
#[test]
fn test_failing_agent_does_not_abort_run() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let workspace = workspace_in(&temp_dir);

    ralph_cmd()
        .current_dir(temp_dir.path())
        .args(["--max-iterations", "2", "--agent-command", "echo boom >&2; exit 3"])
        .arg("--workspace")
        .arg(&workspace)
        .arg("Fail politely")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Error in iteration 1"))
        .stdout(predicate::str::contains("Error in iteration 2"))
        .stdout(predicate::str::contains("Failed iterations:    2"));
}

/// `--no-persist` keeps the window in memory.
#[test]
fn test_no_persist_skips_tracker_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let workspace = workspace_in(&temp_dir);

    ralph_cmd()
        .current_dir(temp_dir.path())
        .args(["--max-iterations", "1", "--no-persist", "--agent-command", FAKE_AGENT])
        .arg("--workspace")
        .arg(&workspace)
        .arg("Forget everything")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success();

    assert!(!workspace.join(".ralph_tokens.json").exists());
    assert!(workspace.join("state.md").exists());
}

/// Settings from ralph.toml are picked up from the working directory.
#[test]
fn test_config_file_is_loaded() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        temp_dir.path().join("ralph.toml"),
        "workspace_dir = \"from-config\"\nmax_iterations = 1\nagent_command = \"echo configured >> agent.log\"\n",
    )
    .expect("Failed to write ralph.toml");

    ralph_cmd()
        .current_dir(temp_dir.path())
        .arg("Use the config file")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success();

    let log = fs::read_to_string(temp_dir.path().join("from-config").join("agent.log"))
        .expect("agent should run inside the configured workspace");
    assert_eq!(log.trim(), "configured");
}

#[test]
fn test_negative_max_iterations_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    ralph_cmd()
        .current_dir(temp_dir.path())
        .args(["--max-iterations", "-1", "Anything"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_iterations"));
}

#[test]
fn test_empty_task_from_stdin_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    ralph_cmd()
        .current_dir(temp_dir.path())
        .write_stdin("\n")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("task cannot be empty"));
}

#[test]
fn test_help_lists_budget_options() {
    ralph_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--token-limit"))
        .stdout(predicate::str::contains("--safety-margin"))
        .stdout(predicate::str::contains("--max-iterations"));
}
