//! CLI integration tests

use std::process::{Command, Output};

fn irisctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_irisctl"))
        .args(args)
        .env_remove("IRIS_API_URL")
        .output()
        .expect("Failed to execute irisctl")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = irisctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Iris Classifier"), "Should show app name");
    for command in ["predict", "batch", "model", "health", "metrics", "retrain", "audit"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = irisctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("irisctl"), "Should show binary name");
}

/// Test predict subcommand help
#[test]
fn test_predict_help() {
    let output = irisctl(&["predict", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Predict help should succeed");
    assert!(stdout.contains("--sepal-length"));
    assert!(stdout.contains("--petal-width"));
}

/// Test predict requires all four measurements
#[test]
fn test_predict_requires_measurements() {
    let output = irisctl(&["predict", "--sepal-length", "5.1"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("--sepal-width"));
}

/// Test retrain start subcommand help
#[test]
fn test_retrain_start_help() {
    let output = irisctl(&["retrain", "start", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Retrain start help should succeed");
    assert!(stdout.contains("--wait"), "Should show wait option");
    assert!(stdout.contains("--timeout-secs"), "Should show timeout option");
}

/// Test audit recent subcommand help
#[test]
fn test_audit_recent_help() {
    let output = irisctl(&["audit", "recent", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Audit recent help should succeed");
    assert!(stdout.contains("--limit"));
    assert!(stdout.contains("--class"));
}

/// Test invalid output format
#[test]
fn test_invalid_format() {
    let output = irisctl(&["--format", "yaml", "model"]);
    assert!(!output.status.success(), "Invalid format should fail");
}

/// Test unreachable server reports an error
#[test]
fn test_unreachable_server_fails() {
    let output = irisctl(&["--api-url", "http://127.0.0.1:1", "health"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to send request"));
}
