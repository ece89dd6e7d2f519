//! Grant lifecycle.
//!
//! Grants are created on every regional copy of the keys a secret is
//! encrypted under. Their names are derived from their parameters and the
//! caller, so creating the same grant twice yields the same name, and the
//! second call finds the first grant instead of adding a duplicate.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::MultiRegionKey;
use crate::core::arn::{self, Arn};
use crate::core::cloud::{CallerIdentity, Cloud, KeyService};
use crate::core::constants::{GRANT_HASH_LEN, GRANT_PREFIX, SECRET_NAME_CONTEXT_KEY};
use crate::core::context::Context;
use crate::core::domain::{
    GrantEntry, GrantHandle, GrantOperation, GrantRequest, GrantSummary, ValueList,
};
use crate::core::fanout::fan_out;
use crate::core::keymanager::KMS_LABEL;
use crate::core::types::{AliasName, Region};
use crate::error::{KmsError, Result, ValidationError};

/// Grant parameters as given by the user.
#[derive(Debug, Clone)]
pub struct GrantSpec {
    pub grantee_principal: String,
    pub retiring_principal: Option<String>,
    pub operations: Vec<GrantOperation>,
    /// Allow every secret under the keys, not only the named one
    pub all_names: bool,
}

/// Grants created for one secret: alias -> region -> handle.
#[derive(Debug, Clone, Serialize)]
pub struct GrantsCreated {
    pub name: String,
    pub aliases: BTreeMap<AliasName, BTreeMap<Region, GrantHandle>>,
}

/// Deterministic grant name for a set of parameters and a caller.
///
/// Operation order and duplicates don't affect the name.
pub fn grant_name(
    operations: &[GrantOperation],
    grantee_principal: &str,
    retiring_principal: Option<&str>,
    constraints: &BTreeMap<String, String>,
    caller_arn: &str,
) -> String {
    let mut ops: Vec<&str> = operations.iter().map(GrantOperation::as_str).collect();
    ops.sort_unstable();
    ops.dedup();
    let canonical = serde_json::json!({
        "operations": ops,
        "grantee_principal": grantee_principal,
        "retiring_principal": retiring_principal,
        "constraints": constraints,
        "caller": caller_arn,
    });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    let hex = hex::encode(digest);
    format!("{}{}", GRANT_PREFIX, &hex[..GRANT_HASH_LEN])
}

/// Normalize principals, scope to the secret, and name the grant.
pub fn build_grant_request(
    spec: &GrantSpec,
    secret_name: &str,
    caller: &CallerIdentity,
) -> Result<GrantRequest> {
    let grantee = arn::normalize_principal(&caller.account, &spec.grantee_principal);
    if grantee.is_empty() {
        return Err(ValidationError::EmptyGrantee.into());
    }
    let retiring = spec
        .retiring_principal
        .as_deref()
        .map(|p| arn::normalize_principal(&caller.account, p))
        .filter(|p| !p.is_empty());

    let mut operations = if spec.operations.is_empty() {
        GrantOperation::DEFAULT.to_vec()
    } else {
        spec.operations.clone()
    };
    operations.sort();
    operations.dedup();

    let constraints = if spec.all_names {
        BTreeMap::new()
    } else {
        BTreeMap::from([(SECRET_NAME_CONTEXT_KEY.to_string(), secret_name.to_string())])
    };

    let name = grant_name(
        &operations,
        &grantee,
        retiring.as_deref(),
        &constraints,
        &caller.arn,
    );
    Ok(GrantRequest {
        name,
        operations,
        grantee_principal: grantee,
        retiring_principal: retiring,
        constraints,
    })
}

/// Map a secret's KMS values to the aliases (and regions) behind them.
///
/// Key ARNs are resolved to the alias targeting them in their region.
///
/// # Errors
///
/// `KmsError::NoAliasForKey` if a key ARN has no alias,
/// `ValidationError::InvalidArn` for ids that are not KMS ARNs.
pub async fn resolve_aliases(
    ctx: &Context,
    cloud: &dyn Cloud,
    values: &ValueList,
) -> Result<BTreeMap<AliasName, Vec<Region>>> {
    let mut aliases: BTreeMap<AliasName, Vec<Region>> = BTreeMap::new();
    for value in values {
        let parsed: Arn = value.key_id.parse()?;
        let alias = if parsed.is_kms_alias() {
            parsed.resource.clone()
        } else if let Some(key_id) = parsed.kms_key_id() {
            let found = ctx
                .guard(cloud.kms(&parsed.region).list_aliases(Some(key_id)))
                .await?;
            found
                .into_iter()
                .find(|a| a.target_key_id.as_deref() == Some(key_id))
                .map(|a| a.name)
                .ok_or_else(|| KmsError::NoAliasForKey {
                    key_id: value.key_id.clone(),
                    region: parsed.region.clone(),
                })?
        } else {
            return Err(ValidationError::InvalidArn(value.key_id.clone()).into());
        };
        let regions = aliases.entry(alias).or_default();
        if !regions.contains(&parsed.region) {
            regions.push(parsed.region);
        }
    }
    debug!(aliases = aliases.len(), "resolved values to aliases");
    Ok(aliases)
}

fn kms_values(secret_name: &str, values: &ValueList) -> Result<ValueList> {
    let values = values.filter_by_key_manager(KMS_LABEL);
    if values.is_empty() {
        return Err(ValidationError::NoKmsValues(secret_name.to_string()).into());
    }
    Ok(values)
}

/// Group grants from every region by name.
///
/// Grants without a name are keyed by their id.
pub fn merge_grants(per_region: BTreeMap<Region, Vec<GrantEntry>>) -> BTreeMap<String, GrantSummary> {
    let mut merged: BTreeMap<String, GrantSummary> = BTreeMap::new();
    for (region, grants) in per_region {
        for grant in grants {
            let key = if grant.name.is_empty() {
                grant.grant_id.clone()
            } else {
                grant.name.clone()
            };
            merged
                .entry(key)
                .or_insert_with(|| GrantSummary {
                    grantee_principal: grant.grantee_principal.clone(),
                    retiring_principal: grant.retiring_principal.clone(),
                    encryption_context_subset: grant.constraints.clone(),
                    operations: grant.operations.clone(),
                    grant_ids: BTreeMap::new(),
                })
                .grant_ids
                .insert(region.clone(), grant.grant_id);
        }
    }
    merged
}

async fn add_grant_in_region(
    region: Region,
    key_arn: String,
    kms: Arc<dyn KeyService>,
    request: GrantRequest,
) -> Result<GrantHandle> {
    let existing = kms.list_grants(&key_arn).await?;
    if let Some(grant) = existing.iter().find(|g| g.name == request.name) {
        if !request.matches(grant) {
            return Err(KmsError::GrantConflict {
                name: request.name,
                region,
            }
            .into());
        }
        debug!(region = %region, grant = %grant.grant_id, "grant already exists");
        // Tokens are only returned when a grant is created.
        return Ok(GrantHandle {
            grant_id: grant.grant_id.clone(),
            grant_token: String::new(),
        });
    }
    kms.create_grant(&key_arn, &request).await
}

async fn retire_in_region(
    key_arn: String,
    kms: Arc<dyn KeyService>,
    grant_name: String,
) -> Result<bool> {
    let ids: Vec<String> = kms
        .list_grants(&key_arn)
        .await?
        .into_iter()
        .filter(|g| g.name == grant_name)
        .map(|g| g.grant_id)
        .collect();
    for id in &ids {
        kms.retire_grant(&key_arn, id).await?;
    }
    Ok(!ids.is_empty())
}

impl MultiRegionKey {
    /// Create the grant in every region, reusing identical existing grants.
    ///
    /// # Errors
    ///
    /// A region holding a grant with the same name but other parameters fails
    /// with `KmsError::GrantConflict`.
    pub async fn add_grant(
        &self,
        ctx: &Context,
        request: &GrantRequest,
    ) -> Result<BTreeMap<Region, GrantHandle>> {
        let clients = self.clients();
        let created = fan_out(ctx, clients.keys().cloned(), |region| {
            let (key_arn, kms) = clients[&region].clone();
            add_grant_in_region(region, key_arn, kms, request.clone())
        })
        .await
        .all_or_partial()?;
        Ok(created.into_iter().collect())
    }

    /// Every grant on the key, per region.
    pub async fn grants(&self, ctx: &Context) -> Result<BTreeMap<Region, Vec<GrantEntry>>> {
        let clients = self.clients();
        let listed = fan_out(ctx, clients.keys().cloned(), |region| {
            let (key_arn, kms) = clients[&region].clone();
            async move { kms.list_grants(&key_arn).await }
        })
        .await
        .all_or_partial()?;
        Ok(listed.into_iter().collect())
    }

    /// Retire the named grant wherever it exists.
    ///
    /// Regions without it are skipped. Returns the regions it was retired in.
    pub async fn retire_grant(&self, ctx: &Context, grant_name: &str) -> Result<Vec<Region>> {
        let clients = self.clients();
        let retired = fan_out(ctx, clients.keys().cloned(), |region| {
            let (key_arn, kms) = clients[&region].clone();
            retire_in_region(key_arn, kms, grant_name.to_string())
        })
        .await
        .all_or_partial()?;
        Ok(retired
            .into_iter()
            .filter(|(_, found)| *found)
            .map(|(region, _)| region)
            .collect())
    }
}

/// Grant access to a secret on every key it is encrypted under.
pub async fn create_grants(
    ctx: &Context,
    cloud: Arc<dyn Cloud>,
    secret_name: &str,
    values: &ValueList,
    spec: &GrantSpec,
) -> Result<GrantsCreated> {
    let values = kms_values(secret_name, values)?;
    let aliases = resolve_aliases(ctx, cloud.as_ref(), &values).await?;
    let caller = ctx.guard(cloud.identity().caller_identity()).await?;
    let request = build_grant_request(spec, secret_name, &caller)?;

    let mut created = GrantsCreated {
        name: request.name.clone(),
        aliases: BTreeMap::new(),
    };
    for (alias, regions) in aliases {
        let key = MultiRegionKey::resolve(ctx, cloud.clone(), &alias, &regions).await?;
        let handles = key.add_grant(ctx, &request).await?;
        info!(alias = %alias, grant = %request.name, regions = handles.len(), "grant created");
        created.aliases.insert(alias, handles);
    }
    Ok(created)
}

/// Grants on every key a secret is encrypted under: alias -> name -> grant.
///
/// Aliases without grants are left out.
pub async fn list_grants(
    ctx: &Context,
    cloud: Arc<dyn Cloud>,
    secret_name: &str,
    values: &ValueList,
) -> Result<BTreeMap<AliasName, BTreeMap<String, GrantSummary>>> {
    let values = kms_values(secret_name, values)?;
    let aliases = resolve_aliases(ctx, cloud.as_ref(), &values).await?;
    let mut out = BTreeMap::new();
    for (alias, regions) in aliases {
        let key = MultiRegionKey::resolve(ctx, cloud.clone(), &alias, &regions).await?;
        let merged = merge_grants(key.grants(ctx).await?);
        if !merged.is_empty() {
            out.insert(alias, merged);
        }
    }
    Ok(out)
}

/// Retire a grant on every key a secret is encrypted under.
pub async fn retire_grants(
    ctx: &Context,
    cloud: Arc<dyn Cloud>,
    secret_name: &str,
    values: &ValueList,
    grant_name: &str,
) -> Result<BTreeMap<AliasName, Vec<Region>>> {
    let values = kms_values(secret_name, values)?;
    let aliases = resolve_aliases(ctx, cloud.as_ref(), &values).await?;
    let mut out = BTreeMap::new();
    for (alias, regions) in aliases {
        let key = MultiRegionKey::resolve(ctx, cloud.clone(), &alias, &regions).await?;
        out.insert(alias, key.retire_grant(ctx, grant_name).await?);
    }
    Ok(out)
}
