//! Tests for `strongbox put/get/list/export` without a key manager.

use crate::support::*;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_put_and_get_roundtrip() {
    let t = Test::new();

    let output = t.put_plain("database_url", "postgres://localhost/db");
    assert_success(&output);

    let output = t.get("database_url");
    assert_success(&output);
    // Not a terminal: no trailing newline.
    assert_eq!(stdout(&output), "postgres://localhost/db");
}

#[test]
fn test_put_replaces_previous_value() {
    let t = Test::with_plain_secrets(&[("token", "first")]);

    assert_success(&t.put_plain("token", "second"));

    assert_eq!(stdout(&t.get("token")), "second");
    let store = t.read_store();
    assert_eq!(store.matches("[[token]]").count(), 1, "{}", store);
}

#[test]
fn test_store_is_human_readable() {
    let t = Test::with_plain_secrets(&[("token", "abc")]);

    let store = t.read_store();
    assert!(store.contains("[[token]]"), "{}", store);
    assert!(store.contains("algorithm = \"none\""), "{}", store);
    assert!(!store.contains("key_ciphertext"), "{}", store);
}

#[test]
fn test_put_from_file() {
    let t = Test::new();
    let path = t.dir.path().join("cert.pem");
    fs::write(&path, "-----BEGIN-----\nline\n").unwrap();

    t.cmd()
        .args(["put", "cert", "-a", "none", "--from-file"])
        .arg(&path)
        .assert()
        .success();

    assert_eq!(stdout(&t.get("cert")), "-----BEGIN-----\nline\n");
}

#[test]
fn test_put_value_and_file_conflict() {
    let t = Test::new();
    let path = t.dir.path().join("value.txt");
    fs::write(&path, "x").unwrap();

    t.cmd()
        .args(["put", "cert", "inline", "-a", "none", "-i"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("but not both"));
    assert!(!t.store().exists());
}

#[test]
fn test_get_to_output_file() {
    let t = Test::with_plain_secrets(&[("api_key", "sk-test-12345")]);
    let out = t.dir.path().join("out.txt");

    t.cmd()
        .args(["get", "api_key", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert_eq!(fs::read_to_string(out).unwrap(), "sk-test-12345");
}

#[test]
fn test_get_missing_name() {
    let t = Test::with_plain_secrets(&[("present", "x")]);

    let output = t.get("absent");
    assert_failure(&output);
    assert_stderr_contains(&output, "secret not found: absent");
}

#[test]
fn test_list_sorted() {
    let t = Test::with_plain_secrets(STANDARD_SECRETS);

    let output = t.list();
    assert_success(&output);
    assert_eq!(stdout(&output), "api_key\ndatabase_url\njwt_secret\n");
}

#[test]
fn test_list_json() {
    let t = Test::with_plain_secrets(STANDARD_SECRETS);

    let output = t.cmd().args(["list", "--json"]).output().unwrap();
    assert_success(&output);
    assert_eq!(
        stdout_json(&output),
        serde_json::json!(["api_key", "database_url", "jwt_secret"])
    );
}

#[test]
fn test_export_as_toml() {
    let t = Test::with_plain_secrets(STANDARD_SECRETS);

    let output = t.export();
    assert_success(&output);
    let exported: toml::Table = toml::from_str(&stdout(&output)).unwrap();
    assert_eq!(exported.len(), 3);
    assert_eq!(exported["api_key"].as_str(), Some("sk-test-12345"));
    assert_eq!(
        exported["database_url"].as_str(),
        Some("postgres://localhost/mydb")
    );
}

#[test]
fn test_key_less_put_ignores_key_ids() {
    let t = Test::new();

    t.cmd()
        .args(["put", "token", "abc", "-p", "kms", "-a", "none", "-k", "local-a,local-b"])
        .assert()
        .success();

    let store = t.read_store();
    assert!(!store.contains("[[_keys]]"), "{}", store);
    assert!(!store.contains("local-a"), "{}", store);
    assert!(!store.contains("key_manager"), "{}", store);
    assert_eq!(stdout(&t.get("token")), "abc");

    assert_stdout_excludes(&t.list(), "_keys");
    assert_stdout_excludes(&t.export(), "_keys");
}
