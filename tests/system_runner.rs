#![cfg(unix)]

use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use kira_db_validator::blast::{SystemToolRunner, ToolRunner};
use kira_db_validator::error::ValidatorError;

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn captures_stdout() {
    let runner = SystemToolRunner::default();
    let output = runner
        .run("sh", &args(&["-c", "echo hello"]), Duration::from_secs(10))
        .unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "hello");
}

#[test]
fn non_zero_exit_carries_stderr() {
    let runner = SystemToolRunner::default();
    let output = runner
        .run("sh", &args(&["-c", "echo broken index >&2; exit 3"]), Duration::from_secs(10))
        .unwrap();
    assert!(!output.success());
    assert_eq!(output.exit_code, Some(3));
    assert_eq!(output.error_text(), "broken index");
}

#[test]
fn slow_process_is_killed_on_timeout() {
    let runner = SystemToolRunner::default();
    let start = Instant::now();
    let err = runner
        .run("sleep", &args(&["5"]), Duration::from_millis(200))
        .unwrap_err();
    assert_matches!(err, ValidatorError::ToolTimeout { .. });
    assert!(err.to_string().contains("timeout"));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn missing_program_is_a_spawn_error() {
    let runner = SystemToolRunner::default();
    assert_eq!(
        runner.missing_tools(&["kira-dbv-no-such-tool"]),
        vec!["kira-dbv-no-such-tool".to_string()]
    );
    let err = runner
        .run("kira-dbv-no-such-tool", &[], Duration::from_secs(1))
        .unwrap_err();
    assert_matches!(err, ValidatorError::ToolSpawn { .. });
}
