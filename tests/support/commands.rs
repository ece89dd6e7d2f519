//! Command helper methods for Test.

use super::Test;
use assert_cmd::Command;
use std::process::Output;

impl Test {
    /// A strongbox command bound to this test's store and cloud state.
    ///
    /// Ambient configuration from the host environment is removed.
    pub fn cmd(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("strongbox").expect("failed to find strongbox binary");
        for var in [
            "AWS_REGION",
            "STRONGBOX_REGIONS",
            "STRONGBOX_LABEL",
            "STRONGBOX_ALGORITHM",
            "STRONGBOX_KEY_MANAGER",
            "STRONGBOX_TIMEOUT",
            "STRONGBOX_LOG",
            "STRONGBOX_TEST_FAIL_REGIONS",
            "VISUAL",
            "EDITOR",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("STRONGBOX_FILENAME", self.store());
        cmd.env("STRONGBOX_TEST_CLOUD", self.cloud());
        cmd.env("NO_COLOR", "1");
        cmd.current_dir(self.dir.path());
        cmd
    }

    /// `strongbox put NAME VALUE -a none`.
    pub fn put_plain(&self, name: &str, value: &str) -> Output {
        self.cmd()
            .args(["put", name, value, "-a", "none"])
            .output()
            .expect("failed to run strongbox put")
    }

    /// `strongbox put NAME VALUE` using the key template.
    pub fn put(&self, name: &str, value: &str) -> Output {
        self.cmd()
            .args(["put", name, value])
            .output()
            .expect("failed to run strongbox put")
    }

    /// `strongbox get NAME`.
    pub fn get(&self, name: &str) -> Output {
        self.cmd()
            .args(["get", name])
            .output()
            .expect("failed to run strongbox get")
    }

    /// `strongbox list`.
    pub fn list(&self) -> Output {
        self.cmd()
            .arg("list")
            .output()
            .expect("failed to run strongbox list")
    }

    /// `strongbox export`.
    pub fn export(&self) -> Output {
        self.cmd()
            .arg("export")
            .output()
            .expect("failed to run strongbox export")
    }

    /// `strongbox kms init` with the given extra arguments.
    pub fn kms_init(&self, args: &[&str]) -> Output {
        self.cmd()
            .args(["kms", "init"])
            .args(args)
            .output()
            .expect("failed to run strongbox kms init")
    }

    /// `strongbox kms ...`.
    pub fn kms(&self, args: &[&str]) -> Output {
        self.cmd()
            .arg("kms")
            .args(args)
            .output()
            .expect("failed to run strongbox kms")
    }
}
