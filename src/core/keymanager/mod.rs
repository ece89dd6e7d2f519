//! Key managers.
//!
//! A key manager owns the master keys and wraps/unwraps the per-value data
//! keys used by the keyed algorithms. Each data key is bound to the name of
//! the secret it protects, so a ciphertext copied under another name fails to
//! decrypt.
//!
//! ## Key Managers
//!
//! - **none**: for algorithms that need no key.
//! - **kms**: AWS KMS, one data key per value, wrapped under the value's key.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::core::context::Context;
use crate::error::{KeyManagerError, Result};

mod kms;
mod none;

pub use kms::{KmsKeyManager, LABEL as KMS_LABEL};
pub use none::{NoKeyManager, LABEL as NONE_LABEL};

/// A data key minted for one value.
pub struct EnvelopeKey {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub ciphertext: Vec<u8>,
    /// Canonical id of the wrapping key, stored with the value
    pub resolved_id: String,
}

#[async_trait]
pub trait KeyManager: Send + Sync {
    fn label(&self) -> &'static str;

    /// Mint a data key wrapped under `key_id`, bound to `secret_name`.
    async fn generate_envelope_key(
        &self,
        ctx: &Context,
        key_id: &str,
        secret_name: &str,
    ) -> Result<EnvelopeKey>;

    /// Unwrap a data key produced by `generate_envelope_key`.
    ///
    /// # Errors
    ///
    /// `KeyManagerError::DecryptionDenied` if the key refuses, or
    /// `KeyManagerError::ContextMismatch` if `secret_name` is not the name the
    /// key was bound to.
    async fn decrypt(
        &self,
        ctx: &Context,
        key_id: &str,
        wrapped: &[u8],
        secret_name: &str,
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// Registry of key managers by label.
#[derive(Clone, Default)]
pub struct KeyManagers {
    entries: BTreeMap<String, Arc<dyn KeyManager>>,
}

impl KeyManagers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with only the no-op manager.
    pub fn standard() -> Self {
        let mut managers = Self::new();
        managers
            .entries
            .insert(none::LABEL.to_string(), Arc::new(NoKeyManager));
        managers
    }

    /// # Errors
    ///
    /// Returns `KeyManagerError::DuplicateLabel` if the label is taken.
    pub fn register(&mut self, manager: Arc<dyn KeyManager>) -> Result<()> {
        let label = manager.label();
        if self.entries.contains_key(label) {
            return Err(KeyManagerError::DuplicateLabel(label.to_string()).into());
        }
        self.entries.insert(label.to_string(), manager);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `KeyManagerError::UnknownKeyManager` for unregistered labels.
    pub fn get(&self, label: &str) -> Result<Arc<dyn KeyManager>> {
        self.entries.get(label).cloned().ok_or_else(|| {
            KeyManagerError::UnknownKeyManager {
                label: label.to_string(),
                available: self.labels().join(", "),
            }
            .into()
        })
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_standard_has_none_only() {
        let managers = KeyManagers::standard();
        assert_eq!(managers.labels(), vec!["none"]);
        assert!(matches!(
            managers.get("kms"),
            Err(Error::KeyManager(KeyManagerError::UnknownKeyManager { .. }))
        ));
    }

    #[test]
    fn test_duplicate_label() {
        let mut managers = KeyManagers::standard();
        let err = managers.register(Arc::new(NoKeyManager)).unwrap_err();
        assert!(matches!(err, Error::KeyManager(KeyManagerError::DuplicateLabel(l)) if l == "none"));
    }
}
