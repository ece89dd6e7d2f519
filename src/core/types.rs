//! Type aliases for domain concepts.
//!
//! Provides semantic type aliases to make function signatures more descriptive.

/// Name of a secret in the store.
pub type SecretName = String;

/// AWS region identifier (e.g., us-west-2).
pub type Region = String;

/// Full KMS alias name (e.g., alias/strongbox-default).
pub type AliasName = String;
