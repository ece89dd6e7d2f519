//! Key manager for algorithms that need no key.

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::{EnvelopeKey, KeyManager};
use crate::core::context::Context;
use crate::error::Result;

pub const LABEL: &str = "none";

pub struct NoKeyManager;

#[async_trait]
impl KeyManager for NoKeyManager {
    fn label(&self) -> &'static str {
        LABEL
    }

    async fn generate_envelope_key(
        &self,
        _ctx: &Context,
        _key_id: &str,
        _secret_name: &str,
    ) -> Result<EnvelopeKey> {
        Ok(EnvelopeKey {
            plaintext: Zeroizing::new(Vec::new()),
            ciphertext: Vec::new(),
            resolved_id: String::new(),
        })
    }

    async fn decrypt(
        &self,
        _ctx: &Context,
        _key_id: &str,
        _wrapped: &[u8],
        _secret_name: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(Vec::new()))
    }
}
