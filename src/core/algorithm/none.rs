//! Passthrough algorithm for values that are deliberately stored unencrypted.

use zeroize::Zeroizing;

use super::Algorithm;
use crate::error::Result;

pub(super) const NAME: &str = "none";

/// Stores plaintext unchanged. Needs no key.
#[derive(Debug, Clone, Copy)]
pub struct Plain;

impl Algorithm for Plain {
    fn name(&self) -> &'static str {
        NAME
    }

    fn needs_key(&self) -> bool {
        false
    }

    fn encrypt(&self, _key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _key: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(ciphertext.to_vec()))
    }
}
