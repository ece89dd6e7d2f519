//! Error reporting and argument validation.

use crate::support::*;
use predicates::prelude::*;

#[test]
fn test_missing_filename() {
    let t = Test::new();

    t.cmd()
        .env_remove("STRONGBOX_FILENAME")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--filename"));
}

#[test]
fn test_filename_flag_overrides_env() {
    let t = Test::new();
    let other = t.dir.path().join("other.toml");

    t.cmd()
        .args(["put", "x", "1", "-a", "none", "-f"])
        .arg(&other)
        .assert()
        .success();

    assert!(other.exists());
    assert!(!t.store().exists());
}

#[test]
fn test_list_without_store() {
    let t = Test::new();

    let output = t.list();
    assert_failure(&output);
    assert_stderr_contains(&output, "store file not found");
}

#[test]
fn test_put_without_template() {
    let t = Test::new();

    let output = t.put("token", "abc");
    assert_failure(&output);
    assert_stderr_contains(&output, "no key template");
    assert_stderr_contains(&output, "kms init");
}

#[test]
fn test_reserved_name_rejected() {
    let t = Test::new();

    let output = t.put_plain("_keys", "abc");
    assert_failure(&output);
    assert_stderr_contains(&output, "reserved");
}

#[test]
fn test_unknown_algorithm() {
    let t = Test::new();

    t.cmd()
        .args(["put", "x", "1", "-a", "rot13"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown algorithm: rot13"));
}

#[test]
fn test_invalid_label() {
    let t = Test::new();

    t.cmd()
        .args(["kms", "deprovision", "--label", "no spaces"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid label"));
}

#[test]
fn test_corrupt_store_names_the_file() {
    let t = Test::new();
    std::fs::write(t.store(), "this is = = not toml").unwrap();

    let output = t.list();
    assert_failure(&output);
    assert_stderr_contains(&output, "secrets.toml");
}

#[test]
fn test_completions() {
    let t = Test::new();

    t.cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("strongbox"));
}
