//! Key policy consistency and editing.

use std::collections::BTreeMap;

use tracing::info;

use super::MultiRegionKey;
use crate::core::context::Context;
use crate::core::editor::Editor;
use crate::core::fanout::fan_out;
use crate::core::types::Region;
use crate::error::{KmsError, Result, ValidationError};

/// Parse a policy and re-serialize it with sorted keys and no whitespace.
pub fn canonicalize(policy: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(policy).map_err(ValidationError::InvalidPolicy)?;
    Ok(value.to_string())
}

/// Pretty-print a policy for editing.
pub fn prettify(policy: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(policy).map_err(ValidationError::InvalidPolicy)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Pick the policy every region agrees on.
///
/// With `force_region` the check is skipped and that region's policy is
/// returned. Otherwise the first region (in sorted order) is the reference
/// and the first region whose canonical policy differs is reported.
pub fn check_consistency(
    policies: &BTreeMap<Region, String>,
    force_region: Option<&str>,
) -> Result<(Region, String)> {
    if let Some(forced) = force_region {
        return policies
            .get_key_value(forced)
            .map(|(r, p)| (r.clone(), p.clone()))
            .ok_or_else(|| {
                ValidationError::UnknownRegion {
                    region: forced.to_string(),
                    regions: policies.keys().cloned().collect::<Vec<_>>().join(", "),
                }
                .into()
            });
    }

    let mut iter = policies.iter();
    let (reference, reference_policy) = iter.next().ok_or(ValidationError::EmptyRegions)?;
    let canonical = canonicalize(reference_policy)?;
    for (region, policy) in iter {
        if canonicalize(policy)? != canonical {
            return Err(KmsError::PolicyMismatch {
                reference: reference.clone(),
                divergent: region.clone(),
            }
            .into());
        }
    }
    Ok((reference.clone(), reference_policy.clone()))
}

impl MultiRegionKey {
    /// Policy shared by every region.
    pub fn policy(&self, force_region: Option<&str>) -> Result<(Region, String)> {
        let policies: BTreeMap<Region, String> = self
            .regions
            .iter()
            .map(|(region, key)| (region.clone(), key.policy.clone()))
            .collect();
        check_consistency(&policies, force_region)
    }

    /// Write `policy` to the key in every region.
    pub async fn set_policy(&mut self, ctx: &Context, policy: &str) -> Result<()> {
        canonicalize(policy)?;
        let clients = self.clients();
        fan_out(ctx, clients.keys().cloned(), |region| {
            let (key_arn, kms) = clients[&region].clone();
            let policy = policy.to_string();
            async move { kms.put_key_policy(&key_arn, &policy).await }
        })
        .await
        .all_or_partial()?;

        for key in self.regions.values_mut() {
            key.policy = policy.to_string();
        }
        info!(alias = %self.alias_name, regions = self.regions.len(), "key policy updated");
        Ok(())
    }

    /// Check consistency, let the user edit the policy, and save it everywhere.
    ///
    /// Returns the saved policy.
    pub async fn edit_policy(
        &mut self,
        ctx: &Context,
        editor: &dyn Editor,
        force_region: Option<&str>,
    ) -> Result<String> {
        let (_, current) = self.policy(force_region)?;
        let edited = editor.edit(&prettify(&current)?)?;
        let policy = prettify(&edited)?;
        self.set_policy(ctx, &policy).await?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::core::cloud::Cloud;
    use crate::core::constants::alias_name;
    use crate::error::{EditorError, Error};
    use std::cell::RefCell;
    use std::sync::Arc;

    const X: &str = r#"{"Version": "2012-10-17", "Statement": []}"#;
    const Y: &str = r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Deny"}]}"#;

    fn policies(entries: &[(&str, &str)]) -> BTreeMap<Region, String> {
        entries
            .iter()
            .map(|(r, p)| (r.to_string(), p.to_string()))
            .collect()
    }

    struct ScriptedEditor {
        reply: Result<String>,
        seen: RefCell<Option<String>>,
    }

    impl Editor for ScriptedEditor {
        fn edit(&self, content: &str) -> Result<String> {
            *self.seen.borrow_mut() = Some(content.to_string());
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(EditorError::Unchanged.into()),
            }
        }
    }

    #[test]
    fn test_divergent_region_is_named() {
        let p = policies(&[("us-east-1", X), ("us-west-1", X), ("us-west-2", Y)]);
        let err = check_consistency(&p, None).unwrap_err();
        match err {
            Error::Kms(KmsError::PolicyMismatch {
                reference,
                divergent,
            }) => {
                assert_eq!(reference, "us-east-1");
                assert_eq!(divergent, "us-west-2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forced_region_wins() {
        let p = policies(&[("us-east-1", X), ("us-west-1", X), ("us-west-2", Y)]);
        let (region, policy) = check_consistency(&p, Some("us-west-2")).unwrap();
        assert_eq!(region, "us-west-2");
        assert_eq!(policy, Y);
    }

    #[test]
    fn test_forced_region_must_be_selected() {
        let p = policies(&[("us-east-1", X)]);
        assert!(matches!(
            check_consistency(&p, Some("eu-west-1")),
            Err(Error::Validation(ValidationError::UnknownRegion { .. }))
        ));
    }

    #[test]
    fn test_formatting_differences_are_ignored() {
        let compact = r#"{"Statement":[],"Version":"2012-10-17"}"#;
        let p = policies(&[("us-east-1", X), ("us-west-1", compact)]);
        assert!(check_consistency(&p, None).is_ok());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let p = policies(&[("us-east-1", "{not json")]);
        assert!(matches!(
            check_consistency(&p, None),
            Err(Error::Validation(ValidationError::InvalidPolicy(_)))
        ));
    }

    #[tokio::test]
    async fn test_edit_policy_writes_every_region() {
        let (cloud, keys) = provisioned(X);
        let mut key = MultiRegionKey::resolve(
            &Context::new(),
            Arc::new(cloud.clone()),
            &alias_name("default"),
            &REGIONS,
        )
        .await
        .unwrap();
        let editor = ScriptedEditor {
            reply: Ok(Y.to_string()),
            seen: RefCell::new(None),
        };

        let saved = key
            .edit_policy(&Context::new(), &editor, None)
            .await
            .unwrap();

        assert_eq!(editor.seen.borrow().as_deref(), Some(prettify(X).unwrap().as_str()));
        assert_eq!(saved, prettify(Y).unwrap());
        for (region, arn) in REGIONS.iter().zip(&keys) {
            assert_eq!(cloud.policy(region, arn).unwrap(), saved);
        }
    }

    #[tokio::test]
    async fn test_edit_rejects_invalid_json_without_writing() {
        let (cloud, keys) = provisioned(X);
        let mut key = MultiRegionKey::resolve(
            &Context::new(),
            Arc::new(cloud.clone()),
            &alias_name("default"),
            &REGIONS,
        )
        .await
        .unwrap();
        let editor = ScriptedEditor {
            reply: Ok("{ nope".to_string()),
            seen: RefCell::new(None),
        };
        let err = key
            .edit_policy(&Context::new(), &editor, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::InvalidPolicy(_))));
        assert_eq!(cloud.policy("us-east-1", &keys[0]).unwrap(), X);
    }

    #[tokio::test]
    async fn test_edit_refuses_divergent_policies() {
        let (cloud, keys) = provisioned(X);
        cloud
            .kms("us-west-2")
            .put_key_policy(&keys[2], Y)
            .await
            .unwrap();

        let mut key = MultiRegionKey::resolve(
            &Context::new(),
            Arc::new(cloud),
            &alias_name("default"),
            &REGIONS,
        )
        .await
        .unwrap();
        let editor = ScriptedEditor {
            reply: Err(EditorError::Unchanged.into()),
            seen: RefCell::new(None),
        };
        let err = key
            .edit_policy(&Context::new(), &editor, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Kms(KmsError::PolicyMismatch { .. })));
        assert!(editor.seen.borrow().is_none());
    }
}
