//! External services the KMS orchestrator and key manager talk to.
//!
//! Each service is a trait so the orchestrator can be driven by the AWS SDK
//! in production and by an in-memory fake in tests.
//!
//! ## Implementations
//!
//! - **aws**: AWS KMS, CloudFormation and STS. Enable with `--features aws`.
//! - **memory**: in-process fake with failure injection. Compiled for tests
//!   and with `--features test-kms`.
//!
//! Stack status polling shared by the implementations lives in `wait`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::core::context::Context;
use crate::core::domain::{GrantEntry, GrantHandle, GrantRequest};
use crate::error::Result;

#[cfg(feature = "aws")]
mod aws;
#[cfg(any(test, feature = "test-kms"))]
pub mod memory;
pub mod wait;

#[cfg(feature = "aws")]
pub use aws::AwsCloud;

/// Key/value pairs bound into every data key.
pub type EncryptionContext = BTreeMap<String, String>;

/// A freshly generated data key.
pub struct DataKey {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub ciphertext: Vec<u8>,
    /// ARN of the key that wrapped it
    pub key_id: String,
}

/// An alias as listed by the key service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub name: String,
    pub arn: String,
    pub target_key_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMetadata {
    pub key_id: String,
    pub arn: String,
    pub enabled: bool,
}

/// Where a stack template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackTemplate {
    Body(String),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct StackRequest {
    pub name: String,
    pub template: StackTemplate,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
}

/// Key management in one region.
#[async_trait]
pub trait KeyService: Send + Sync {
    fn region(&self) -> &str;

    /// Generate a 32-byte data key wrapped under `key_id`.
    async fn generate_data_key(&self, key_id: &str, context: &EncryptionContext)
        -> Result<DataKey>;

    /// Unwrap a data key.
    ///
    /// Fails with `KeyManagerError::ContextMismatch` when `context` differs
    /// from the one used at generation.
    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Zeroizing<Vec<u8>>>;

    /// Aliases in the region, optionally only those targeting `key_id`.
    async fn list_aliases(&self, key_id: Option<&str>) -> Result<Vec<AliasEntry>>;
    async fn create_alias(&self, alias: &str, key_id: &str) -> Result<()>;
    async fn delete_alias(&self, alias: &str) -> Result<()>;

    async fn describe_key(&self, key_id: &str) -> Result<KeyMetadata>;
    async fn get_key_policy(&self, key_id: &str) -> Result<String>;
    async fn put_key_policy(&self, key_id: &str, policy: &str) -> Result<()>;

    async fn create_grant(&self, key_id: &str, request: &GrantRequest) -> Result<GrantHandle>;
    async fn list_grants(&self, key_id: &str) -> Result<Vec<GrantEntry>>;
    async fn retire_grant(&self, key_id: &str, grant_id: &str) -> Result<()>;
}

/// Infrastructure stacks in one region.
#[async_trait]
pub trait StackService: Send + Sync {
    async fn stack_exists(&self, name: &str) -> Result<bool>;

    /// Create a stack and wait until it completes, returning its outputs.
    async fn create_stack(
        &self,
        ctx: &Context,
        request: &StackRequest,
    ) -> Result<BTreeMap<String, String>>;

    /// Delete a stack and wait until it is gone, for at most `timeout`.
    async fn delete_stack(&self, ctx: &Context, name: &str, timeout: Duration) -> Result<()>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn caller_identity(&self) -> Result<CallerIdentity>;
}

/// Hands out per-region clients.
pub trait Cloud: Send + Sync {
    fn kms(&self, region: &str) -> Arc<dyn KeyService>;
    fn stacks(&self, region: &str) -> Arc<dyn StackService>;
    fn identity(&self) -> Arc<dyn IdentityService>;
}
