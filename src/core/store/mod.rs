//! Secret store.
//!
//! Maps secret names to their encrypted value lists, plus the reserved
//! template entry that lists the default keys for `put`.
//!
//! ## Adding a New Storage Backend
//!
//! 1. Implement the `Store` trait
//! 2. Add the implementation in a new file (e.g., `s3.rs`)
//! 3. Re-export from this module

use std::collections::BTreeMap;

use crate::core::constants::KEY_TEMPLATE_NAME;
use crate::core::domain::{Key, ValueList};
use crate::core::types::SecretName;
use crate::error::{Error, Result, StoreError};

mod fs;

pub use fs::FileStore;

/// Secret storage trait.
///
/// Every call reads or rewrites the whole document; there is no locking
/// between concurrent writers.
pub trait Store: Send + Sync {
    /// Values stored for `name`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NameNotFound` if the name is absent, or
    /// `StoreError::FileNotFound` if the store does not exist yet.
    fn get(&self, name: &str) -> Result<ValueList>;

    /// Every entry, including the template.
    fn get_all(&self) -> Result<BTreeMap<SecretName, ValueList>>;

    /// Replace the values stored for every name in `entries` with a single
    /// document update. Names not in `entries` are left alone.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if the store cannot be persisted.
    fn put_entries(&self, entries: BTreeMap<SecretName, ValueList>) -> Result<()>;

    /// Replace the values stored for `name`.
    fn put(&self, name: &str, values: ValueList) -> Result<()> {
        self.put_entries(BTreeMap::from([(name.to_string(), values)]))
    }

    /// Keys listed in the template.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NameNotFound` if there is no template yet, even
    /// when the store file itself is missing.
    fn key_ids(&self) -> Result<Vec<Key>> {
        match self.get(KEY_TEMPLATE_NAME) {
            Ok(values) => Ok(values.keys()),
            Err(Error::Store(StoreError::FileNotFound(_))) => {
                Err(StoreError::NameNotFound(KEY_TEMPLATE_NAME.to_string()).into())
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the template entry exists.
    fn has_template(&self) -> Result<bool> {
        match self.get(KEY_TEMPLATE_NAME) {
            Ok(_) => Ok(true),
            Err(Error::Store(StoreError::FileNotFound(_) | StoreError::NameNotFound(_))) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether `name` is the reserved template entry.
pub fn is_template(name: &str) -> bool {
    name == KEY_TEMPLATE_NAME
}
