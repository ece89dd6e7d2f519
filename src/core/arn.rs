//! ARN parsing and principal normalization.
//!
//! Pure functions only; nothing here talks to AWS so it can be tested without
//! credentials.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ValidationError};

/// A parsed Amazon Resource Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub resource: String,
}

impl Arn {
    /// True for `arn:<p>:kms:<r>:<a>:alias/<name>`.
    pub fn is_kms_alias(&self) -> bool {
        self.service == "kms" && self.resource.starts_with("alias/")
    }

    /// True for `arn:<p>:kms:<r>:<a>:key/<id>`.
    pub fn is_kms_key(&self) -> bool {
        self.service == "kms" && self.resource.starts_with("key/")
    }

    /// Key id (the part after `key/`) of a key ARN.
    pub fn kms_key_id(&self) -> Option<&str> {
        self.resource.strip_prefix("key/")
    }
}

impl FromStr for Arn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" || parts[2].is_empty() || parts[5].is_empty() {
            return Err(ValidationError::InvalidArn(s.to_string()).into());
        }
        Ok(Self {
            partition: parts[1].to_string(),
            service: parts[2].to_string(),
            region: parts[3].to_string(),
            account: parts[4].to_string(),
            resource: parts[5].to_string(),
        })
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

/// Region embedded in a key identifier, if it is an ARN.
pub fn region_of(key_id: &str) -> Option<String> {
    key_id
        .parse::<Arn>()
        .ok()
        .map(|arn| arn.region)
        .filter(|r| !r.is_empty())
}

/// Expand a principal reference into a full ARN.
///
/// - `""` stays empty
/// - `arn:...` passes through, except STS assumed-role ARNs which collapse to
///   the IAM role they were assumed from
/// - `*.amazonaws.com` service principals pass through
/// - `user/x` and `role/x` become IAM ARNs in `account`
/// - a bare name is treated as an IAM user in `account`
pub fn normalize_principal(account: &str, principal: &str) -> String {
    let principal = principal.trim();
    if principal.is_empty() {
        return String::new();
    }
    if let Ok(arn) = principal.parse::<Arn>() {
        if arn.service == "sts" {
            if let Some(rest) = arn.resource.strip_prefix("assumed-role/") {
                let role = rest.split('/').next().unwrap_or(rest);
                return format!("arn:{}:iam::{}:role/{}", arn.partition, arn.account, role);
            }
        }
        return principal.to_string();
    }
    if principal.ends_with(".amazonaws.com") {
        return principal.to_string();
    }
    if principal.starts_with("user/") || principal.starts_with("role/") {
        return format!("arn:aws:iam::{}:{}", account, principal);
    }
    format!("arn:aws:iam::{}:user/{}", account, principal)
}

/// Normalize a list of principals, dropping empties and duplicates.
///
/// Order of first appearance is kept.
pub fn normalize_principals<S: AsRef<str>>(account: &str, principals: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in principals {
        let arn = normalize_principal(account, p.as_ref());
        if !arn.is_empty() && !out.contains(&arn) {
            out.push(arn);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alias_arn() {
        let arn: Arn = "arn:aws:kms:us-east-1:123456789012:alias/strongbox-default"
            .parse()
            .unwrap();
        assert_eq!(arn.region, "us-east-1");
        assert_eq!(arn.account, "123456789012");
        assert!(arn.is_kms_alias());
        assert!(!arn.is_kms_key());
        assert_eq!(arn.resource, "alias/strongbox-default");
    }

    #[test]
    fn test_parse_key_arn() {
        let arn: Arn = "arn:aws:kms:us-west-2:123456789012:key/1234abcd-12ab"
            .parse()
            .unwrap();
        assert!(arn.is_kms_key());
        assert_eq!(arn.kms_key_id(), Some("1234abcd-12ab"));
        assert_eq!(
            arn.to_string(),
            "arn:aws:kms:us-west-2:123456789012:key/1234abcd-12ab"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("alias/strongbox-default".parse::<Arn>().is_err());
        assert!("arn:aws:kms".parse::<Arn>().is_err());
        assert!("".parse::<Arn>().is_err());
    }

    #[test]
    fn test_region_of() {
        assert_eq!(
            region_of("arn:aws:kms:eu-west-1:1:key/abc").as_deref(),
            Some("eu-west-1")
        );
        assert_eq!(region_of("alias/strongbox-default"), None);
        assert_eq!(region_of("arn:aws:iam::1:user/bob"), None);
    }

    #[test]
    fn test_normalize_bare_user() {
        assert_eq!(
            normalize_principal("123", "jeff"),
            "arn:aws:iam::123:user/jeff"
        );
    }

    #[test]
    fn test_normalize_prefixed() {
        assert_eq!(
            normalize_principal("123", "role/webserver"),
            "arn:aws:iam::123:role/webserver"
        );
        assert_eq!(
            normalize_principal("123", "user/jeff"),
            "arn:aws:iam::123:user/jeff"
        );
    }

    #[test]
    fn test_normalize_passthrough() {
        let arn = "arn:aws:iam::999:role/other-account";
        assert_eq!(normalize_principal("123", arn), arn);
        assert_eq!(
            normalize_principal("123", "ec2.amazonaws.com"),
            "ec2.amazonaws.com"
        );
        assert_eq!(normalize_principal("123", "  "), "");
    }

    #[test]
    fn test_normalize_assumed_role() {
        assert_eq!(
            normalize_principal("123", "arn:aws:sts::123:assumed-role/Deployer/ci-session"),
            "arn:aws:iam::123:role/Deployer"
        );
    }

    #[test]
    fn test_normalize_list_dedups_in_order() {
        let list = normalize_principals("123", &["bob", "", "role/x", "user/bob"]);
        assert_eq!(
            list,
            vec![
                "arn:aws:iam::123:user/bob".to_string(),
                "arn:aws:iam::123:role/x".to_string()
            ]
        );
    }
}
