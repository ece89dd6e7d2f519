//! Multi-region KMS keys.
//!
//! One logical key is a KMS key per region, all reachable through the same
//! alias (`alias/strongbox-<label>`). This module keeps those regional copies
//! consistent: it resolves the alias everywhere, checks and edits the key
//! policy in every region at once, provisions and deprovisions the backing
//! CloudFormation stacks, and manages grants.
//!
//! Every multi-region operation runs one task per region through
//! [`fan_out`](crate::core::fanout::fan_out). Regions never wait on each
//! other, and a failure in one region is reported alongside the others rather
//! than aborting them.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::core::cloud::{AliasEntry, Cloud, KeyService};
use crate::core::context::Context;
use crate::core::fanout::fan_out;
use crate::core::types::{AliasName, Region};
use crate::error::{KmsError, Result, ValidationError};

mod deprovision;
mod grants;
mod policy;
mod provision;

pub use deprovision::{deprovision, DeprovisionReport, RegionFindings};
pub use grants::{
    build_grant_request, create_grants, grant_name, list_grants, merge_grants, resolve_aliases,
    retire_grants, GrantSpec, GrantsCreated,
};
pub use policy::{canonicalize, check_consistency, prettify};
pub use provision::{
    collect_region_info, merge_template, provision, update_template, ProvisionRequest,
    Provisioned, RegionInfo,
};

/// One region's view of a multi-region key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionKey {
    pub key_arn: String,
    pub alias_arn: String,
    pub policy: String,
}

/// A key alias resolved in every region of a set.
///
/// Construction fails unless the alias exists in all of them.
pub struct MultiRegionKey {
    alias_name: AliasName,
    regions: BTreeMap<Region, RegionKey>,
    cloud: Arc<dyn Cloud>,
}

impl std::fmt::Debug for MultiRegionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiRegionKey")
            .field("alias_name", &self.alias_name)
            .field("regions", &self.regions)
            .finish()
    }
}

/// Check a label against `^[a-zA-Z0-9_-]+$`.
pub fn validate_label(label: &str) -> Result<()> {
    let valid = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ValidationError::InvalidLabel(label.to_string()).into());
    }
    Ok(())
}

/// Sorted, de-duplicated, non-empty region list.
pub(crate) fn normalize_regions<S: AsRef<str>>(regions: &[S]) -> Result<Vec<Region>> {
    let mut out: Vec<Region> = regions
        .iter()
        .map(|r| r.as_ref().trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    out.sort();
    out.dedup();
    if out.is_empty() {
        return Err(ValidationError::EmptyRegions.into());
    }
    Ok(out)
}

/// Look up an alias by name in one region.
pub(crate) async fn find_alias(kms: &dyn KeyService, alias_name: &str) -> Result<Option<AliasEntry>> {
    Ok(kms
        .list_aliases(None)
        .await?
        .into_iter()
        .find(|a| a.name == alias_name))
}

async fn resolve_region(
    kms: Arc<dyn KeyService>,
    alias_name: String,
) -> Result<Option<RegionKey>> {
    let Some(alias) = find_alias(kms.as_ref(), &alias_name).await? else {
        return Ok(None);
    };
    let target = alias.target_key_id.unwrap_or_else(|| alias_name.clone());
    let key = kms.describe_key(&target).await?;
    let policy = kms.get_key_policy(&key.arn).await?;
    Ok(Some(RegionKey {
        key_arn: key.arn,
        alias_arn: alias.arn,
        policy,
    }))
}

impl MultiRegionKey {
    /// Resolve `alias_name` in every region concurrently.
    ///
    /// # Errors
    ///
    /// `KmsError::AliasNotFound` naming every region without the alias, or
    /// `Error::PartialFailure` if a region could not be queried.
    pub async fn resolve<S: AsRef<str>>(
        ctx: &Context,
        cloud: Arc<dyn Cloud>,
        alias_name: &str,
        regions: &[S],
    ) -> Result<Self> {
        let regions = normalize_regions(regions)?;
        let resolved = fan_out(ctx, regions, |region| {
            resolve_region(cloud.kms(&region), alias_name.to_string())
        })
        .await
        .all_or_partial()?;

        let mut found = BTreeMap::new();
        let mut missing = Vec::new();
        for (region, key) in resolved {
            match key {
                Some(key) => {
                    found.insert(region, key);
                }
                None => missing.push(region),
            }
        }
        if !missing.is_empty() {
            return Err(KmsError::AliasNotFound {
                alias: alias_name.to_string(),
                regions: missing,
            }
            .into());
        }
        debug!(alias = alias_name, regions = found.len(), "resolved multi-region key");
        Ok(Self {
            alias_name: alias_name.to_string(),
            regions: found,
            cloud,
        })
    }

    pub fn alias_name(&self) -> &str {
        &self.alias_name
    }

    pub fn region_keys(&self) -> &BTreeMap<Region, RegionKey> {
        &self.regions
    }

    pub fn regions(&self) -> Vec<Region> {
        self.regions.keys().cloned().collect()
    }

    /// Key ARN and client for every region.
    fn clients(&self) -> BTreeMap<Region, (String, Arc<dyn KeyService>)> {
        self.regions
            .iter()
            .map(|(region, key)| {
                (
                    region.clone(),
                    (key.key_arn.clone(), self.cloud.kms(region)),
                )
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::core::cloud::memory::MemoryCloud;
    use crate::core::constants::alias_name;

    pub const REGIONS: [&str; 3] = ["us-east-1", "us-west-1", "us-west-2"];

    /// A key aliased as `alias/strongbox-default` in every region.
    pub fn provisioned(policy: &str) -> (MemoryCloud, Vec<String>) {
        let cloud = MemoryCloud::new();
        let keys = REGIONS
            .iter()
            .map(|region| {
                let key = cloud.add_key(region, policy);
                cloud.add_alias(region, &alias_name("default"), &key);
                key
            })
            .collect();
        (cloud, keys)
    }
}
