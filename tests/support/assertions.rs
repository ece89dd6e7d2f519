//! Assertions over `strongbox` process output.

use std::process::Output;

pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "strongbox exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn assert_failure(output: &Output) {
    assert!(
        !output.status.success(),
        "strongbox succeeded unexpectedly: {}",
        String::from_utf8_lossy(&output.stdout)
    );
}

/// Stdout, lossily decoded.
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Stdout parsed as JSON; panics with the raw text if it is not.
pub fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout(output)))
}

pub fn assert_stdout_contains(output: &Output, expected: &str) {
    let out = stdout(output);
    assert!(out.contains(expected), "'{}' not in stdout: {}", expected, out);
}

pub fn assert_stdout_excludes(output: &Output, excluded: &str) {
    let out = stdout(output);
    assert!(!out.contains(excluded), "'{}' leaked to stdout: {}", excluded, out);
}

pub fn assert_stderr_contains(output: &Output, expected: &str) {
    let err = stderr(output);
    assert!(err.contains(expected), "'{}' not in stderr: {}", expected, err);
}
