//! Constants used throughout strongbox.
//!
//! Centralizes naming conventions shared by the store and the KMS orchestrator.

use std::time::Duration;

/// Program name, used as the prefix of every AWS resource we create.
pub const PROG_NAME: &str = "strongbox";

/// Reserved store entry holding the default keys for `put`.
pub const KEY_TEMPLATE_NAME: &str = "_keys";

/// Prefix of every KMS alias managed by strongbox (`alias/strongbox-<label>`).
pub const ALIAS_PREFIX: &str = "alias/strongbox-";

/// Prefix of every KMS grant name created by strongbox.
pub const GRANT_PREFIX: &str = "strongbox-";

/// Number of hex characters of the parameter hash kept in a grant name.
pub const GRANT_HASH_LEN: usize = 10;

/// Encryption context key binding a data key to the secret it protects.
pub const SECRET_NAME_CONTEXT_KEY: &str = "SecretName";

/// Stack output carrying the ARN of the provisioned key.
pub const KEY_ARN_OUTPUT: &str = "KeyArn";

/// Regions used when none are given.
pub const DEFAULT_REGIONS: &[&str] = &["us-east-1", "us-west-1", "us-west-2"];

/// Label used when none is given.
pub const DEFAULT_LABEL: &str = "default";

/// Upper bound on waiting for a stack deletion.
pub const STACK_DELETE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Upper bound on waiting for a stack creation.
pub const STACK_CREATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Interval between stack status polls.
pub const STACK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Built-in CloudFormation template for a strongbox key.
pub const KEY_TEMPLATE_BODY: &str = include_str!("../../assets/kms-key.template.yaml");

/// KMS alias name for a label.
pub fn alias_name(label: &str) -> String {
    format!("{}{}", ALIAS_PREFIX, label)
}

/// CloudFormation stack name for a label.
pub fn stack_name(label: &str) -> String {
    format!("{}-{}", PROG_NAME, label)
}
