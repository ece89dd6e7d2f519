//! Stored values.
//!
//! A secret is stored as a list of values, each one the same plaintext
//! encrypted under a different key. Any single value is enough to recover it.

use std::ops::Deref;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::core::arn;
use crate::error::{Result, StoreError};

/// One way to encrypt a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    /// Key manager label (empty for algorithms without keys)
    pub key_manager: String,
    /// Key manager specific identifier, usually a KMS ARN
    pub key_id: String,
    /// Algorithm name
    pub algorithm: String,
}

impl Key {
    pub fn new(key_manager: &str, key_id: &str, algorithm: &str) -> Self {
        Self {
            key_manager: key_manager.to_string(),
            key_id: key_id.to_string(),
            algorithm: algorithm.to_string(),
        }
    }
}

/// One encrypted representation of a secret.
///
/// Empty strings are omitted when written, so template entries carry only
/// their key fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_manager: String,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_ciphertext: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ciphertext: String,
}

impl Value {
    /// A value with key fields only, as stored in the template.
    pub fn from_key(key: &Key) -> Self {
        Self {
            key_id: key.key_id.clone(),
            key_manager: key.key_manager.clone(),
            algorithm: key.algorithm.clone(),
            ..Self::default()
        }
    }

    /// The key this value was encrypted under.
    pub fn key(&self) -> Key {
        Key::new(&self.key_manager, &self.key_id, &self.algorithm)
    }

    /// Decoded cipher output.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.ciphertext)
            .map_err(|source| StoreError::InvalidBase64 {
                field: "ciphertext",
                source,
            }
            .into())
    }

    /// Decoded wrapped data key.
    pub fn key_ciphertext_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.key_ciphertext)
            .map_err(|source| StoreError::InvalidBase64 {
                field: "key_ciphertext",
                source,
            }
            .into())
    }

    pub fn set_ciphertext(&mut self, bytes: &[u8]) {
        self.ciphertext = STANDARD.encode(bytes);
    }

    pub fn set_key_ciphertext(&mut self, bytes: &[u8]) {
        self.key_ciphertext = STANDARD.encode(bytes);
    }
}

/// All values stored for one secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueList(Vec<Value>);

impl ValueList {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Values whose key manager is `label`.
    pub fn filter_by_key_manager(&self, label: &str) -> ValueList {
        self.0
            .iter()
            .filter(|v| v.key_manager == label)
            .cloned()
            .collect()
    }

    /// Reorder so values in earlier priority regions come first.
    ///
    /// Values without a region, or in a region missing from `priorities`, keep
    /// their relative order at the end.
    pub fn sort_by_region<S: AsRef<str>>(&mut self, priorities: &[S]) {
        self.0.sort_by_key(|v| {
            arn::region_of(&v.key_id)
                .and_then(|r| priorities.iter().position(|p| p.as_ref() == r))
                .unwrap_or(usize::MAX)
        });
    }

    /// Distinct keys referenced by the list, in order.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = Vec::new();
        for v in &self.0 {
            let key = v.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

impl Deref for ValueList {
    type Target = [Value];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<Value> for ValueList {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ValueList {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
