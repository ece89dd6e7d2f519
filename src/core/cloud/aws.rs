//! AWS bindings.
//!
//! One SDK configuration is loaded per invocation; per-region clients are
//! derived from it. Credentials come from the default provider chain.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudformation::types::{Capability, Parameter, StackStatus};
use aws_sdk_kms::error::ProvideErrorMetadata;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{DataKeySpec, GrantConstraints};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use super::wait::{self, StackPhase};
use super::{
    AliasEntry, CallerIdentity, Cloud, DataKey, EncryptionContext, IdentityService, KeyMetadata,
    KeyService, StackRequest, StackService, StackTemplate,
};
use crate::core::constants::{SECRET_NAME_CONTEXT_KEY, STACK_CREATE_TIMEOUT, STACK_POLL_INTERVAL};
use crate::core::context::Context;
use crate::core::domain::{GrantEntry, GrantHandle, GrantOperation, GrantRequest};
use crate::error::{CloudError, KeyManagerError, Result};

const POLICY_NAME: &str = "default";

/// AWS-backed `Cloud`.
#[derive(Clone)]
pub struct AwsCloud {
    config: SdkConfig,
}

impl AwsCloud {
    /// Load configuration from the environment.
    pub async fn connect() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self { config }
    }
}

impl Cloud for AwsCloud {
    fn kms(&self, region: &str) -> Arc<dyn KeyService> {
        let conf = aws_sdk_kms::config::Builder::from(&self.config)
            .region(Region::new(region.to_string()))
            .build();
        Arc::new(AwsKms {
            client: aws_sdk_kms::Client::from_conf(conf),
            region: region.to_string(),
        })
    }

    fn stacks(&self, region: &str) -> Arc<dyn StackService> {
        let conf = aws_sdk_cloudformation::config::Builder::from(&self.config)
            .region(Region::new(region.to_string()))
            .build();
        Arc::new(AwsStacks {
            client: aws_sdk_cloudformation::Client::from_conf(conf),
        })
    }

    fn identity(&self) -> Arc<dyn IdentityService> {
        Arc::new(AwsIdentity {
            client: aws_sdk_sts::Client::new(&self.config),
        })
    }
}

struct AwsKms {
    client: aws_sdk_kms::Client,
    region: String,
}

fn to_hash_map(context: &EncryptionContext) -> HashMap<String, String> {
    context
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl KeyService for AwsKms {
    fn region(&self) -> &str {
        &self.region
    }

    async fn generate_data_key(
        &self,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey> {
        trace!(region = %self.region, key_id, "generating data key");
        let out = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .key_spec(DataKeySpec::Aes256)
            .set_encryption_context(Some(to_hash_map(context)))
            .send()
            .await
            .map_err(|e| CloudError::service("GenerateDataKey", e.into_service_error()))?;

        let plaintext = out
            .plaintext()
            .ok_or_else(|| CloudError::service("GenerateDataKey", "no plaintext returned"))?;
        let ciphertext = out
            .ciphertext_blob()
            .ok_or_else(|| CloudError::service("GenerateDataKey", "no ciphertext returned"))?;
        Ok(DataKey {
            plaintext: Zeroizing::new(plaintext.as_ref().to_vec()),
            ciphertext: ciphertext.as_ref().to_vec(),
            key_id: out.key_id().unwrap_or(key_id).to_string(),
        })
    }

    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Zeroizing<Vec<u8>>> {
        trace!(region = %self.region, key_id, "decrypting data key");
        let out = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(ciphertext))
            .set_encryption_context(Some(to_hash_map(context)))
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_invalid_ciphertext_exception() {
                    KeyManagerError::ContextMismatch {
                        key_id: key_id.to_string(),
                        secret_name: context
                            .get(SECRET_NAME_CONTEXT_KEY)
                            .cloned()
                            .unwrap_or_default(),
                    }
                    .into()
                } else if err.is_incorrect_key_exception()
                    || err.is_disabled_exception()
                    || err.code() == Some("AccessDeniedException")
                {
                    KeyManagerError::DecryptionDenied {
                        key_id: key_id.to_string(),
                        reason: err.to_string(),
                    }
                    .into()
                } else {
                    crate::error::Error::from(CloudError::service("Decrypt", err))
                }
            })?;

        let plaintext = out
            .plaintext()
            .ok_or_else(|| CloudError::service("Decrypt", "no plaintext returned"))?;
        Ok(Zeroizing::new(plaintext.as_ref().to_vec()))
    }

    async fn list_aliases(&self, key_id: Option<&str>) -> Result<Vec<AliasEntry>> {
        let mut aliases = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .client
                .list_aliases()
                .set_key_id(key_id.map(str::to_string))
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| CloudError::service("ListAliases", e.into_service_error()))?;
            for alias in out.aliases() {
                aliases.push(AliasEntry {
                    name: alias.alias_name().unwrap_or_default().to_string(),
                    arn: alias.alias_arn().unwrap_or_default().to_string(),
                    target_key_id: alias.target_key_id().map(str::to_string),
                });
            }
            match out.next_marker() {
                Some(next) if out.truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(aliases)
    }

    async fn create_alias(&self, alias: &str, key_id: &str) -> Result<()> {
        self.client
            .create_alias()
            .alias_name(alias)
            .target_key_id(key_id)
            .send()
            .await
            .map_err(|e| CloudError::service("CreateAlias", e.into_service_error()))?;
        Ok(())
    }

    async fn delete_alias(&self, alias: &str) -> Result<()> {
        self.client
            .delete_alias()
            .alias_name(alias)
            .send()
            .await
            .map_err(|e| CloudError::service("DeleteAlias", e.into_service_error()))?;
        Ok(())
    }

    async fn describe_key(&self, key_id: &str) -> Result<KeyMetadata> {
        let out = self
            .client
            .describe_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|e| CloudError::service("DescribeKey", e.into_service_error()))?;
        let meta = out
            .key_metadata()
            .ok_or_else(|| CloudError::service("DescribeKey", "no key metadata returned"))?;
        Ok(KeyMetadata {
            key_id: meta.key_id().to_string(),
            arn: meta.arn().unwrap_or_default().to_string(),
            enabled: meta.enabled(),
        })
    }

    async fn get_key_policy(&self, key_id: &str) -> Result<String> {
        let out = self
            .client
            .get_key_policy()
            .key_id(key_id)
            .policy_name(POLICY_NAME)
            .send()
            .await
            .map_err(|e| CloudError::service("GetKeyPolicy", e.into_service_error()))?;
        Ok(out.policy().unwrap_or_default().to_string())
    }

    async fn put_key_policy(&self, key_id: &str, policy: &str) -> Result<()> {
        self.client
            .put_key_policy()
            .key_id(key_id)
            .policy_name(POLICY_NAME)
            .policy(policy)
            .send()
            .await
            .map_err(|e| CloudError::service("PutKeyPolicy", e.into_service_error()))?;
        Ok(())
    }

    async fn create_grant(&self, key_id: &str, request: &GrantRequest) -> Result<GrantHandle> {
        let constraints = (!request.constraints.is_empty()).then(|| {
            GrantConstraints::builder()
                .set_encryption_context_subset(Some(to_hash_map(&request.constraints)))
                .build()
        });
        let operations = request
            .operations
            .iter()
            .map(|op| aws_sdk_kms::types::GrantOperation::from(op.as_str()))
            .collect();

        let out = self
            .client
            .create_grant()
            .key_id(key_id)
            .name(&request.name)
            .grantee_principal(&request.grantee_principal)
            .set_retiring_principal(request.retiring_principal.clone())
            .set_operations(Some(operations))
            .set_constraints(constraints)
            .send()
            .await
            .map_err(|e| CloudError::service("CreateGrant", e.into_service_error()))?;
        Ok(GrantHandle {
            grant_id: out.grant_id().unwrap_or_default().to_string(),
            grant_token: out.grant_token().unwrap_or_default().to_string(),
        })
    }

    async fn list_grants(&self, key_id: &str) -> Result<Vec<GrantEntry>> {
        let mut grants = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .client
                .list_grants()
                .key_id(key_id)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| CloudError::service("ListGrants", e.into_service_error()))?;
            for grant in out.grants() {
                let operations = grant
                    .operations()
                    .iter()
                    .filter_map(|op| op.as_str().parse::<GrantOperation>().ok())
                    .collect();
                let constraints = grant
                    .constraints()
                    .and_then(|c| c.encryption_context_subset())
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                grants.push(GrantEntry {
                    name: grant.name().unwrap_or_default().to_string(),
                    grant_id: grant.grant_id().unwrap_or_default().to_string(),
                    operations,
                    grantee_principal: grant.grantee_principal().unwrap_or_default().to_string(),
                    retiring_principal: grant.retiring_principal().map(str::to_string),
                    constraints,
                });
            }
            match out.next_marker() {
                Some(next) if out.truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(grants)
    }

    async fn retire_grant(&self, key_id: &str, grant_id: &str) -> Result<()> {
        self.client
            .retire_grant()
            .key_id(key_id)
            .grant_id(grant_id)
            .send()
            .await
            .map_err(|e| CloudError::service("RetireGrant", e.into_service_error()))?;
        Ok(())
    }
}

struct AwsStacks {
    client: aws_sdk_cloudformation::Client,
}

impl AwsStacks {
    /// Current status of a stack, `None` once it no longer exists.
    async fn status(&self, name: &str) -> Result<Option<(StackStatus, BTreeMap<String, String>)>> {
        let out = match self.client.describe_stacks().stack_name(name).send().await {
            Ok(out) => out,
            Err(e) => {
                let err = e.into_service_error();
                if err.message().is_some_and(|m| m.contains("does not exist")) {
                    return Ok(None);
                }
                return Err(CloudError::service("DescribeStacks", err).into());
            }
        };
        let Some(stack) = out.stacks().first() else {
            return Ok(None);
        };
        let Some(status) = stack.stack_status().cloned() else {
            return Ok(None);
        };
        let outputs = stack
            .outputs()
            .iter()
            .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
            .collect();
        Ok(Some((status, outputs)))
    }

    async fn creation_phase(&self, name: &str) -> Result<StackPhase> {
        Ok(match self.status(name).await? {
            Some((status, outputs)) => wait::creation_phase(Some(status.as_str()), outputs),
            None => wait::creation_phase(None, BTreeMap::new()),
        })
    }

    async fn deletion_phase(&self, name: &str) -> Result<StackPhase> {
        let status = self.status(name).await?;
        Ok(wait::deletion_phase(status.as_ref().map(|(s, _)| s.as_str())))
    }
}

#[async_trait]
impl StackService for AwsStacks {
    async fn stack_exists(&self, name: &str) -> Result<bool> {
        Ok(self.status(name).await?.is_some())
    }

    async fn create_stack(
        &self,
        ctx: &Context,
        request: &StackRequest,
    ) -> Result<BTreeMap<String, String>> {
        let parameters = request
            .parameters
            .iter()
            .map(|(k, v)| Parameter::builder().parameter_key(k).parameter_value(v).build())
            .collect();
        let mut create = self
            .client
            .create_stack()
            .stack_name(&request.name)
            .set_parameters(Some(parameters))
            .capabilities(Capability::CapabilityIam);
        create = match &request.template {
            StackTemplate::Body(body) => create.template_body(body),
            StackTemplate::Url(url) => create.template_url(url),
        };
        create
            .send()
            .await
            .map_err(|e| CloudError::service("CreateStack", e.into_service_error()))?;
        debug!(stack = %request.name, "stack creation started");

        let name = request.name.as_str();
        wait::wait_for_stack(
            ctx,
            "CreateStack",
            name,
            STACK_CREATE_TIMEOUT,
            STACK_POLL_INTERVAL,
            move || self.creation_phase(name),
        )
        .await
    }

    async fn delete_stack(&self, ctx: &Context, name: &str, timeout: Duration) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| CloudError::service("DeleteStack", e.into_service_error()))?;
        debug!(stack = %name, "stack deletion started");

        wait::wait_for_stack(
            ctx,
            "DeleteStack",
            name,
            timeout,
            STACK_POLL_INTERVAL,
            move || self.deletion_phase(name),
        )
        .await?;
        Ok(())
    }
}

struct AwsIdentity {
    client: aws_sdk_sts::Client,
}

#[async_trait]
impl IdentityService for AwsIdentity {
    async fn caller_identity(&self) -> Result<CallerIdentity> {
        let out = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| CloudError::service("GetCallerIdentity", e.into_service_error()))?;
        Ok(CallerIdentity {
            account: out.account().unwrap_or_default().to_string(),
            arn: out.arn().unwrap_or_default().to_string(),
        })
    }
}
