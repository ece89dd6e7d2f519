//! AES-256-GCM.
//!
//! Output layout: `nonce (12 bytes) || ciphertext || tag`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::{check_key_len, split_nonce, Algorithm};
use crate::error::{CipherError, Result};

pub(super) const NAME: &str = "aesgcm256";

const NONCE_LEN: usize = 12;

/// AES-256-GCM with random 96-bit nonces.
///
/// Each data key encrypts exactly one value, so nonce reuse under a key
/// cannot happen in practice.
#[derive(Debug, Clone, Copy)]
pub struct AesGcm256;

impl AesGcm256 {
    fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
        check_key_len(key)?;
        Aes256Gcm::new_from_slice(key).map_err(|e| CipherError::EncryptionFailed(e.to_string()).into())
    }
}

impl Algorithm for AesGcm256 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn needs_key(&self) -> bool {
        true
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Self::cipher(key)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CipherError::EncryptionFailed(format!("aesgcm256: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = Self::cipher(key)?;
        let (nonce, sealed) = split_nonce(ciphertext, NONCE_LEN)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| CipherError::DecryptionFailed(format!("aesgcm256: {}", e)))?;
        Ok(Zeroizing::new(plaintext))
    }
}
