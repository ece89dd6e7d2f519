//! Test support utilities for strongbox integration tests.
//!
//! Provides an isolated store file per test and helper commands.

#![allow(dead_code)]

pub mod assertions;
pub mod commands;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;

use std::path::PathBuf;

use tempfile::TempDir;

/// Test environment with its own temp directory.
///
/// The store and the in-memory cloud state both live inside it, so tests can
/// run in parallel.
pub struct Test {
    pub dir: TempDir,
}

impl Test {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        Self { dir }
    }

    /// Test environment with secrets stored under the `none` algorithm.
    pub fn with_plain_secrets(secrets: &[(&str, &str)]) -> Self {
        let t = Self::new();
        for (name, value) in secrets {
            let output = t.put_plain(name, value);
            assert!(
                output.status.success(),
                "Failed to put secret {}: {}",
                name,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        t
    }

    /// Path of the store file.
    pub fn store(&self) -> PathBuf {
        self.dir.path().join("secrets.toml")
    }

    /// Path of the in-memory cloud state.
    pub fn cloud(&self) -> PathBuf {
        self.dir.path().join("cloud.json")
    }

    pub fn read_store(&self) -> String {
        std::fs::read_to_string(self.store()).expect("failed to read store")
    }
}
