//! XChaCha20-Poly1305.
//!
//! Output layout: `nonce (24 bytes) || ciphertext || tag`.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::XNonce;
use tracing::trace;
use zeroize::Zeroizing;

use super::{check_key_len, split_nonce, Algorithm};
use crate::error::{CipherError, Result};

pub(super) const NAME: &str = "xchacha20poly1305";

const NONCE_LEN: usize = 24;

/// XChaCha20-Poly1305 AEAD with random extended nonces.
#[derive(Debug, Clone, Copy)]
pub struct XChaCha20Poly1305;

impl XChaCha20Poly1305 {
    fn cipher(key: &[u8]) -> Result<chacha20poly1305::XChaCha20Poly1305> {
        check_key_len(key)?;
        chacha20poly1305::XChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| CipherError::EncryptionFailed(e.to_string()).into())
    }
}

impl Algorithm for XChaCha20Poly1305 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn needs_key(&self) -> bool {
        true
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Self::cipher(key)?;
        let nonce = chacha20poly1305::XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CipherError::EncryptionFailed(format!("xchacha20poly1305: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        trace!(len = out.len(), "sealed with xchacha20poly1305");
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = Self::cipher(key)?;
        let (nonce, sealed) = split_nonce(ciphertext, NONCE_LEN)?;
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|e| CipherError::DecryptionFailed(format!("xchacha20poly1305: {}", e)))?;
        Ok(Zeroizing::new(plaintext))
    }
}
