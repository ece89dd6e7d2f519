//! Removing a label's aliases and stacks.

use std::sync::Arc;

use tracing::info;

use super::{find_alias, normalize_regions, validate_label};
use crate::core::cloud::Cloud;
use crate::core::constants::{alias_name, stack_name, STACK_DELETE_TIMEOUT};
use crate::core::context::Context;
use crate::core::fanout::fan_out;
use crate::core::types::Region;
use crate::error::{Error, RegionFailure, Result};

/// What was found (and removed) in one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFindings {
    pub region: Region,
    /// Key the alias pointed at, if the alias existed
    pub alias_target: Option<String>,
    pub stack_found: bool,
    pub alias_deleted: bool,
    pub stack_deleted: bool,
}

#[derive(Debug, Default)]
pub struct DeprovisionReport {
    pub findings: Vec<RegionFindings>,
    pub failed: Vec<RegionFailure>,
}

impl DeprovisionReport {
    /// `Error::PartialFailure` if any region failed.
    pub fn into_result(self) -> Result<Vec<RegionFindings>> {
        if self.failed.is_empty() {
            Ok(self.findings)
        } else {
            Err(Error::PartialFailure {
                failed: self.failed,
            })
        }
    }
}

async fn deprovision_region(
    ctx: Context,
    cloud: Arc<dyn Cloud>,
    region: Region,
    label: String,
    destructive: bool,
) -> Result<RegionFindings> {
    let alias = alias_name(&label);
    let stack = stack_name(&label);
    let kms = cloud.kms(&region);
    let mut findings = RegionFindings {
        region: region.clone(),
        ..RegionFindings::default()
    };

    if let Some(entry) = find_alias(kms.as_ref(), &alias).await? {
        findings.alias_target = Some(entry.target_key_id.unwrap_or_default());
        if destructive {
            info!(region = %region, alias = %alias, "deleting alias");
            kms.delete_alias(&alias).await?;
            findings.alias_deleted = true;
        }
    }

    let stacks = cloud.stacks(&region);
    findings.stack_found = stacks.stack_exists(&stack).await?;
    if findings.stack_found && destructive {
        info!(region = %region, stack = %stack, "deleting stack, this may take a while");
        stacks
            .delete_stack(&ctx, &stack, STACK_DELETE_TIMEOUT)
            .await?;
        findings.stack_deleted = true;
    }
    Ok(findings)
}

/// Find, and with `destructive` delete, the label's alias and stack in every
/// region.
///
/// Regions are independent: a failure in one never stops the others, and
/// every failure is in the report.
pub async fn deprovision<S: AsRef<str>>(
    ctx: &Context,
    cloud: Arc<dyn Cloud>,
    label: &str,
    regions: &[S],
    destructive: bool,
) -> Result<DeprovisionReport> {
    validate_label(label)?;
    let regions = normalize_regions(regions)?;
    let (ok, failed) = fan_out(ctx, regions, |region| {
        deprovision_region(
            ctx.clone(),
            cloud.clone(),
            region,
            label.to_string(),
            destructive,
        )
    })
    .await
    .split();

    Ok(DeprovisionReport {
        findings: ok.into_iter().map(|(_, f)| f).collect(),
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::core::cloud::memory::MemoryCloud;
    use crate::core::constants::alias_name;
    use crate::core::kms::{provision, ProvisionRequest};

    async fn provisioned_with_stacks() -> MemoryCloud {
        let cloud = MemoryCloud::new();
        let request = ProvisionRequest {
            label: "default".into(),
            regions: REGIONS.iter().map(|r| r.to_string()).collect(),
            create_missing_keys: false,
            administrators: Vec::new(),
            users: Vec::new(),
            create_simple_roles: false,
            disable_iam_policies: false,
            template_url: None,
        };
        provision(&Context::new(), Arc::new(cloud.clone()), &request)
            .await
            .unwrap();
        cloud
    }

    #[tokio::test]
    async fn test_dry_run_only_reports() {
        let cloud = provisioned_with_stacks().await;
        let report = deprovision(&Context::new(), Arc::new(cloud.clone()), "default", &REGIONS, false)
            .await
            .unwrap();
        let findings = report.into_result().unwrap();
        assert_eq!(findings.len(), 3);
        assert!(findings
            .iter()
            .all(|f| f.alias_target.is_some() && f.stack_found && !f.alias_deleted));
        assert!(cloud.has_stack("us-east-1", "strongbox-default"));
    }

    #[tokio::test]
    async fn test_destructive_removes_everything() {
        let cloud = provisioned_with_stacks().await;
        deprovision(&Context::new(), Arc::new(cloud.clone()), "default", &REGIONS, true)
            .await
            .unwrap()
            .into_result()
            .unwrap();
        for region in REGIONS {
            assert!(cloud.alias_target(region, &alias_name("default")).is_none());
            assert!(!cloud.has_stack(region, "strongbox-default"));
        }
    }

    #[tokio::test]
    async fn test_failed_region_does_not_stop_others() {
        let cloud = provisioned_with_stacks().await;
        cloud.fail_region("us-west-1");
        let report = deprovision(&Context::new(), Arc::new(cloud.clone()), "default", &REGIONS, true)
            .await
            .unwrap();

        let done: Vec<&str> = report.findings.iter().map(|f| f.region.as_str()).collect();
        assert_eq!(done, vec!["us-east-1", "us-west-2"]);
        assert!(!cloud.has_stack("us-west-2", "strongbox-default"));

        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("us-west-1"));
    }

    #[tokio::test]
    async fn test_alias_without_stack() {
        let (cloud, _) = provisioned("{}");
        let report = deprovision(&Context::new(), Arc::new(cloud), "default", &["us-east-1"], true)
            .await
            .unwrap();
        let findings = report.into_result().unwrap();
        assert!(findings[0].alias_deleted);
        assert!(!findings[0].stack_found);
    }
}
