//! Grant records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::types::Region;
use crate::error::{Error, ValidationError};

/// A KMS operation a grant can permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GrantOperation {
    Decrypt,
    Encrypt,
    GenerateDataKey,
    GenerateDataKeyWithoutPlaintext,
    ReEncryptFrom,
    ReEncryptTo,
    Sign,
    Verify,
    GetPublicKey,
    CreateGrant,
    RetireGrant,
    DescribeKey,
    GenerateDataKeyPair,
    GenerateDataKeyPairWithoutPlaintext,
    GenerateMac,
    VerifyMac,
}

impl GrantOperation {
    pub const ALL: &'static [GrantOperation] = &[
        Self::Decrypt,
        Self::Encrypt,
        Self::GenerateDataKey,
        Self::GenerateDataKeyWithoutPlaintext,
        Self::ReEncryptFrom,
        Self::ReEncryptTo,
        Self::Sign,
        Self::Verify,
        Self::GetPublicKey,
        Self::CreateGrant,
        Self::RetireGrant,
        Self::DescribeKey,
        Self::GenerateDataKeyPair,
        Self::GenerateDataKeyPairWithoutPlaintext,
        Self::GenerateMac,
        Self::VerifyMac,
    ];

    /// Operations granted when none are requested.
    pub const DEFAULT: &'static [GrantOperation] = &[Self::Decrypt, Self::RetireGrant];

    /// Name as used by the KMS API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decrypt => "Decrypt",
            Self::Encrypt => "Encrypt",
            Self::GenerateDataKey => "GenerateDataKey",
            Self::GenerateDataKeyWithoutPlaintext => "GenerateDataKeyWithoutPlaintext",
            Self::ReEncryptFrom => "ReEncryptFrom",
            Self::ReEncryptTo => "ReEncryptTo",
            Self::Sign => "Sign",
            Self::Verify => "Verify",
            Self::GetPublicKey => "GetPublicKey",
            Self::CreateGrant => "CreateGrant",
            Self::RetireGrant => "RetireGrant",
            Self::DescribeKey => "DescribeKey",
            Self::GenerateDataKeyPair => "GenerateDataKeyPair",
            Self::GenerateDataKeyPairWithoutPlaintext => "GenerateDataKeyPairWithoutPlaintext",
            Self::GenerateMac => "GenerateMac",
            Self::VerifyMac => "VerifyMac",
        }
    }
}

impl fmt::Display for GrantOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownGrantOperation(s.to_string()).into())
    }
}

/// Parameters of a grant, identical in every region it is created in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantRequest {
    pub name: String,
    pub operations: Vec<GrantOperation>,
    pub grantee_principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retiring_principal: Option<String>,
    /// Encryption context subset the grant is restricted to
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, String>,
}

impl GrantRequest {
    /// Whether an existing grant carries the same effective parameters.
    pub fn matches(&self, entry: &GrantEntry) -> bool {
        let mut mine = self.operations.clone();
        mine.sort();
        mine.dedup();
        let mut theirs = entry.operations.clone();
        theirs.sort();
        theirs.dedup();
        mine == theirs
            && self.grantee_principal == entry.grantee_principal
            && self.retiring_principal == entry.retiring_principal
            && self.constraints == entry.constraints
    }
}

/// Identifiers of a grant in one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantHandle {
    pub grant_id: String,
    pub grant_token: String,
}

/// A grant as listed by the key service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEntry {
    pub name: String,
    pub grant_id: String,
    pub operations: Vec<GrantOperation>,
    pub grantee_principal: String,
    pub retiring_principal: Option<String>,
    pub constraints: BTreeMap<String, String>,
}

/// One logical grant merged across regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantSummary {
    pub grantee_principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retiring_principal: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub encryption_context_subset: BTreeMap<String, String>,
    pub operations: Vec<GrantOperation>,
    pub grant_ids: BTreeMap<Region, String>,
}
