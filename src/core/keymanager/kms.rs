//! AWS KMS key manager.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroizing;

use super::{EnvelopeKey, KeyManager};
use crate::core::arn;
use crate::core::cloud::{Cloud, EncryptionContext, KeyService};
use crate::core::constants::SECRET_NAME_CONTEXT_KEY;
use crate::core::context::Context;
use crate::error::{KeyManagerError, Result};

pub const LABEL: &str = "kms";

/// Wraps data keys with KMS in the region named by each key ARN.
///
/// Key ids that are not ARNs use `default_region`.
pub struct KmsKeyManager {
    cloud: Arc<dyn Cloud>,
    default_region: Option<String>,
}

impl KmsKeyManager {
    pub fn new(cloud: Arc<dyn Cloud>, default_region: Option<String>) -> Self {
        Self {
            cloud,
            default_region,
        }
    }

    fn client(&self, key_id: &str) -> Result<Arc<dyn KeyService>> {
        let region = arn::region_of(key_id)
            .or_else(|| self.default_region.clone())
            .ok_or_else(|| KeyManagerError::InvalidKeyId(key_id.to_string()))?;
        Ok(self.cloud.kms(&region))
    }
}

fn context_for(secret_name: &str) -> EncryptionContext {
    BTreeMap::from([(SECRET_NAME_CONTEXT_KEY.to_string(), secret_name.to_string())])
}

#[async_trait]
impl KeyManager for KmsKeyManager {
    fn label(&self) -> &'static str {
        LABEL
    }

    async fn generate_envelope_key(
        &self,
        ctx: &Context,
        key_id: &str,
        secret_name: &str,
    ) -> Result<EnvelopeKey> {
        let client = self.client(key_id)?;
        let data_key = ctx
            .guard(client.generate_data_key(key_id, &context_for(secret_name)))
            .await?;
        debug!(key_id, resolved = %data_key.key_id, "generated data key");
        Ok(EnvelopeKey {
            plaintext: data_key.plaintext,
            ciphertext: data_key.ciphertext,
            resolved_id: data_key.key_id,
        })
    }

    async fn decrypt(
        &self,
        ctx: &Context,
        key_id: &str,
        wrapped: &[u8],
        secret_name: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let client = self.client(key_id)?;
        ctx.guard(client.decrypt(key_id, wrapped, &context_for(secret_name)))
            .await
    }
}
