//! Symmetric algorithms and their registry.
//!
//! Every stored value names the algorithm that produced its ciphertext. The
//! registry maps that name back to an implementation so the rest of the crate
//! never branches on which algorithm is in use.
//!
//! ## Algorithms
//!
//! - **xchacha20poly1305**: default. XChaCha20-Poly1305 with a random 24-byte nonce.
//! - **aesgcm256**: AES-256-GCM with a random 12-byte nonce.
//! - **none**: stores the plaintext as-is. For deliberately public values.
//!
//! ## Adding a New Algorithm
//!
//! 1. Implement the `Algorithm` trait in a new file
//! 2. Register it in `Algorithms::standard`

use std::collections::BTreeMap;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::error::{CipherError, Result};

mod aesgcm;
mod none;
mod xchacha;

pub use aesgcm::AesGcm256;
pub use none::Plain;
pub use xchacha::XChaCha20Poly1305;

/// Length of every data key handed to a keyed algorithm.
pub const DATA_KEY_LEN: usize = 32;

/// Name of the algorithm used when none is requested.
pub const DEFAULT_ALGORITHM: &str = xchacha::NAME;

/// A symmetric encryption algorithm.
pub trait Algorithm: Send + Sync {
    /// Name stored alongside each ciphertext.
    fn name(&self) -> &'static str;

    /// Whether the algorithm needs a data key from a key manager.
    fn needs_key(&self) -> bool;

    /// Encrypt plaintext under `key`.
    ///
    /// The returned bytes carry everything `decrypt` needs besides the key
    /// (nonces are prefixed).
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt ciphertext produced by `encrypt` under the same key.
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Registry of algorithms by name.
///
/// Built once at startup and passed by reference; tests can build their own
/// with fakes registered.
#[derive(Clone, Default)]
pub struct Algorithms {
    entries: BTreeMap<String, Arc<dyn Algorithm>>,
}

impl Algorithms {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in algorithm.
    pub fn standard() -> Self {
        let builtin: [Arc<dyn Algorithm>; 3] = [
            Arc::new(XChaCha20Poly1305),
            Arc::new(AesGcm256),
            Arc::new(Plain),
        ];
        let entries = builtin
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect();
        Self { entries }
    }

    /// Register an algorithm under `name`.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::DuplicateName` if the name is taken.
    pub fn register(&mut self, name: &str, algorithm: Arc<dyn Algorithm>) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(CipherError::DuplicateName(name.to_string()).into());
        }
        self.entries.insert(name.to_string(), algorithm);
        Ok(())
    }

    /// Look up an algorithm.
    ///
    /// # Errors
    ///
    /// Returns `CipherError::UnknownAlgorithm` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Algorithm>> {
        self.entries.get(name).cloned().ok_or_else(|| {
            CipherError::UnknownAlgorithm {
                name: name.to_string(),
                available: self.names().join(", "),
            }
            .into()
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

fn check_key_len(key: &[u8]) -> Result<()> {
    if key.len() != DATA_KEY_LEN {
        return Err(CipherError::InvalidKeyLength {
            expected: DATA_KEY_LEN,
            actual: key.len(),
        }
        .into());
    }
    Ok(())
}

/// Split `nonce || sealed` into its parts.
fn split_nonce(ciphertext: &[u8], nonce_len: usize) -> Result<(&[u8], &[u8])> {
    if ciphertext.len() < nonce_len {
        return Err(CipherError::DecryptionFailed(format!(
            "ciphertext is {} bytes, shorter than the {}-byte nonce",
            ciphertext.len(),
            nonce_len
        ))
        .into());
    }
    Ok(ciphertext.split_at(nonce_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use proptest::prelude::*;

    fn key() -> Vec<u8> {
        (0..DATA_KEY_LEN as u8).collect()
    }

    #[test]
    fn test_standard_registry_names() {
        let algorithms = Algorithms::standard();
        assert_eq!(
            algorithms.names(),
            vec!["aesgcm256", "none", "xchacha20poly1305"]
        );
        assert!(algorithms.get(DEFAULT_ALGORITHM).unwrap().needs_key());
        assert!(!algorithms.get("none").unwrap().needs_key());
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut algorithms = Algorithms::standard();
        let err = algorithms
            .register("none", Arc::new(Plain))
            .unwrap_err();
        assert!(matches!(err, Error::Cipher(CipherError::DuplicateName(n)) if n == "none"));
    }

    #[test]
    fn test_register_under_new_name() {
        let mut algorithms = Algorithms::new();
        algorithms.register("plain-alias", Arc::new(Plain)).unwrap();
        assert!(algorithms.get("plain-alias").is_ok());
    }

    #[test]
    fn test_unknown_algorithm() {
        let algorithms = Algorithms::standard();
        let err = algorithms.get("rot13").err().unwrap();
        assert!(err.to_string().contains("rot13"));
        assert!(err.to_string().contains("aesgcm256"));
    }

    #[test]
    fn test_keyed_algorithms_reject_short_keys() {
        let algorithms = Algorithms::standard();
        for name in ["aesgcm256", "xchacha20poly1305"] {
            let alg = algorithms.get(name).unwrap();
            assert!(alg.encrypt(&[1, 2, 3], b"x").is_err(), "{}", name);
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let algorithms = Algorithms::standard();
        for name in ["aesgcm256", "xchacha20poly1305"] {
            let alg = algorithms.get(name).unwrap();
            let ct = alg.encrypt(&key(), b"secret").unwrap();
            let other = vec![7u8; DATA_KEY_LEN];
            assert!(alg.decrypt(&other, &ct).is_err(), "{}", name);
        }
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let algorithms = Algorithms::standard();
        for name in ["aesgcm256", "xchacha20poly1305"] {
            let alg = algorithms.get(name).unwrap();
            assert!(alg.decrypt(&key(), &[0u8; 4]).is_err(), "{}", name);
        }
    }

    #[test]
    fn test_nonces_are_fresh() {
        let alg = Algorithms::standard().get(DEFAULT_ALGORITHM).unwrap();
        let a = alg.encrypt(&key(), b"same").unwrap();
        let b = alg.encrypt(&key(), b"same").unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_every_algorithm(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let algorithms = Algorithms::standard();
            for name in algorithms.names() {
                let alg = algorithms.get(name).unwrap();
                let k = if alg.needs_key() { key() } else { Vec::new() };
                let ct = alg.encrypt(&k, &plaintext).unwrap();
                let pt = alg.decrypt(&k, &ct).unwrap();
                prop_assert_eq!(pt.as_slice(), plaintext.as_slice());
            }
        }
    }
}
