//! Provisioning keys with CloudFormation.
//!
//! Each region gets a stack built from the key template. Its `KeyArn` output
//! is then aliased as `alias/strongbox-<label>`. Regions are inspected first:
//! a stack that exists without its alias is left over from an incomplete
//! deletion and must be cleaned up by hand.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::{find_alias, normalize_regions, validate_label};
use crate::core::arn::normalize_principals;
use crate::core::cloud::{Cloud, StackRequest, StackTemplate};
use crate::core::constants::{
    alias_name, stack_name, KEY_ARN_OUTPUT, KEY_TEMPLATE_BODY, KEY_TEMPLATE_NAME,
};
use crate::core::context::Context;
use crate::core::domain::{Key, Value, ValueList};
use crate::core::fanout::fan_out;
use crate::core::keymanager::KMS_LABEL;
use crate::core::store::Store;
use crate::core::types::Region;
use crate::error::{Error, KmsError, Result, StoreError, ValidationError};

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub label: String,
    pub regions: Vec<Region>,
    pub create_missing_keys: bool,
    pub administrators: Vec<String>,
    pub users: Vec<String>,
    pub create_simple_roles: bool,
    pub disable_iam_policies: bool,
    pub template_url: Option<String>,
}

/// Existing aliases and the regions that lack one.
#[derive(Debug, Default)]
pub struct RegionInfo {
    /// region -> alias ARN
    pub existing: BTreeMap<Region, String>,
    pub missing: Vec<Region>,
}

#[derive(Debug, Default)]
pub struct Provisioned {
    /// region -> alias ARN, for every requested region
    pub aliases: BTreeMap<Region, String>,
    pub created: Vec<Region>,
}

async fn inspect_region(
    cloud: Arc<dyn Cloud>,
    region: Region,
    stack: String,
    alias: String,
) -> Result<Option<String>> {
    let kms = cloud.kms(&region);
    let stack_exists = cloud.stacks(&region).stack_exists(&stack).await?;
    let found = find_alias(kms.as_ref(), &alias).await?;

    let Some(entry) = found else {
        if stack_exists {
            return Err(KmsError::StackWithoutAlias {
                stack,
                alias,
                region,
            }
            .into());
        }
        return Ok(None);
    };
    let target = entry.target_key_id.as_deref().unwrap_or(&alias);
    if !kms.describe_key(target).await?.enabled {
        return Err(KmsError::KeyDisabled { alias, region }.into());
    }
    Ok(Some(entry.arn))
}

/// Inspect every region for the label's stack and alias.
///
/// # Errors
///
/// `Error::PartialFailure` listing every region that could not be inspected
/// or needs manual remediation.
pub async fn collect_region_info(
    ctx: &Context,
    cloud: Arc<dyn Cloud>,
    label: &str,
    regions: &[Region],
) -> Result<RegionInfo> {
    let stack = stack_name(label);
    let alias = alias_name(label);
    let results = fan_out(ctx, regions.iter().cloned(), |region| {
        inspect_region(cloud.clone(), region, stack.clone(), alias.clone())
    })
    .await
    .all_or_partial()?;

    let mut info = RegionInfo::default();
    for (region, alias_arn) in results {
        match alias_arn {
            Some(arn) => {
                info.existing.insert(region, arn);
            }
            None => info.missing.push(region),
        }
    }
    Ok(info)
}

async fn create_key_in_region(
    ctx: Context,
    cloud: Arc<dyn Cloud>,
    region: Region,
    request: StackRequest,
    alias: String,
) -> Result<String> {
    info!(region = %region, stack = %request.name, "creating stack, this may take a while");
    let outputs = cloud.stacks(&region).create_stack(&ctx, &request).await?;
    let key_arn = outputs
        .get(KEY_ARN_OUTPUT)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| KmsError::MissingStackOutput {
            stack: request.name.clone(),
            output: KEY_ARN_OUTPUT.to_string(),
        })?;

    let kms = cloud.kms(&region);
    info!(region = %region, alias = %alias, key = %key_arn, "creating alias");
    kms.create_alias(&alias, key_arn).await?;
    let entry = find_alias(kms.as_ref(), &alias).await?.ok_or_else(|| {
        Error::from(KmsError::AliasNotFound {
            alias: alias.clone(),
            regions: vec![region.clone()],
        })
    })?;
    Ok(entry.arn)
}

fn bool_param(value: bool) -> String {
    value.to_string()
}

/// Find or create the label's key in every requested region.
///
/// Regions that already have the alias are reused. When some regions have it
/// and others don't, the rest are only provisioned with
/// `create_missing_keys`.
pub async fn provision(
    ctx: &Context,
    cloud: Arc<dyn Cloud>,
    request: &ProvisionRequest,
) -> Result<Provisioned> {
    validate_label(&request.label)?;
    let regions = normalize_regions(&request.regions)?;
    let info = collect_region_info(ctx, cloud.clone(), &request.label, &regions).await?;

    if !info.existing.is_empty() && !info.missing.is_empty() && !request.create_missing_keys {
        return Err(KmsError::RegionsAlreadyProvisioned {
            requested: regions.len(),
            provisioned: info.existing.len(),
            label: request.label.clone(),
        }
        .into());
    }
    if !info.existing.is_empty() {
        info!(count = info.existing.len(), "found pre-existing keys");
    }

    let mut provisioned = Provisioned {
        aliases: info.existing,
        created: Vec::new(),
    };
    if info.missing.is_empty() {
        return Ok(provisioned);
    }

    let caller = ctx.guard(cloud.identity().caller_identity()).await?;
    let with_caller = |principals: &[String]| {
        let mut all = principals.to_vec();
        all.push(caller.arn.clone());
        normalize_principals(&caller.account, &all)
    };
    let administrators = with_caller(&request.administrators);
    if administrators.is_empty() {
        return Err(ValidationError::NoPrincipals("administrator").into());
    }
    let users = with_caller(&request.users);
    if users.is_empty() {
        return Err(ValidationError::NoPrincipals("user").into());
    }

    let stack_request = StackRequest {
        name: stack_name(&request.label),
        template: match &request.template_url {
            Some(url) => StackTemplate::Url(url.clone()),
            None => StackTemplate::Body(KEY_TEMPLATE_BODY.to_string()),
        },
        parameters: BTreeMap::from([
            ("AdministratorPrincipals".to_string(), administrators.join(",")),
            ("UserPrincipals".to_string(), users.join(",")),
            (
                "KeyDescription".to_string(),
                format!("Key used for securing secrets ({}).", request.label),
            ),
            (
                "CreateSimpleRoles".to_string(),
                bool_param(request.create_simple_roles),
            ),
            (
                "AllowIAMPoliciesToControlKeyAccess".to_string(),
                bool_param(!request.disable_iam_policies),
            ),
        ]),
    };
    let alias = alias_name(&request.label);

    let created = fan_out(ctx, info.missing, |region| {
        create_key_in_region(
            ctx.clone(),
            cloud.clone(),
            region,
            stack_request.clone(),
            alias.clone(),
        )
    })
    .await
    .all_or_partial()?;

    for (region, alias_arn) in created {
        provisioned.created.push(region.clone());
        provisioned.aliases.insert(region, alias_arn);
    }
    Ok(provisioned)
}

/// Add the provisioned aliases to a template.
///
/// Entries for the same key id are replaced, so the algorithm can change
/// without duplicating keys. Other entries are kept.
pub fn merge_template(
    existing: ValueList,
    aliases: &BTreeMap<Region, String>,
    algorithm: &str,
) -> ValueList {
    let mut by_key: BTreeMap<(String, String), Value> = existing
        .into_iter()
        .map(|v| ((v.key_manager.clone(), v.key_id.clone()), v))
        .collect();
    for alias_arn in aliases.values() {
        let key = Key::new(KMS_LABEL, alias_arn, algorithm);
        by_key.insert(
            (key.key_manager.clone(), key.key_id.clone()),
            Value::from_key(&key),
        );
    }
    by_key.into_values().collect()
}

/// Merge the provisioned aliases into the store's template and save it.
pub fn update_template(
    store: &dyn Store,
    aliases: &BTreeMap<Region, String>,
    algorithm: &str,
) -> Result<ValueList> {
    let existing = match store.get(KEY_TEMPLATE_NAME) {
        Ok(values) => values,
        Err(Error::Store(StoreError::FileNotFound(_) | StoreError::NameNotFound(_))) => {
            ValueList::default()
        }
        Err(e) => return Err(e),
    };
    let template = merge_template(existing, aliases, algorithm);
    store.put(KEY_TEMPLATE_NAME, template.clone())?;
    Ok(template)
}
