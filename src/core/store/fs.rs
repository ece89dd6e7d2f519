//! File-backed store.
//!
//! The document is TOML: each top-level key is a secret name holding an
//! array of value tables.
//!
//! ```toml
//! [[_keys]]
//! key_id = "arn:aws:kms:us-east-1:123456789012:alias/strongbox-default"
//! key_manager = "kms"
//! algorithm = "xchacha20poly1305"
//!
//! [[database_password]]
//! key_id = "arn:aws:kms:us-east-1:123456789012:key/0b3e..."
//! key_manager = "kms"
//! algorithm = "xchacha20poly1305"
//! key_ciphertext = "AQIDAHh..."
//! ciphertext = "mX0x..."
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Store;
use crate::core::domain::ValueList;
use crate::core::types::SecretName;
use crate::error::{Result, StoreError};

type Document = BTreeMap<SecretName, ValueList>;

/// Store persisted in a single TOML file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Document> {
        if !self.path.exists() {
            return Err(StoreError::FileNotFound(self.path.clone()).into());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let doc: Document = toml::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), entries = doc.len(), "store loaded");
        Ok(doc)
    }

    fn read_or_empty(&self) -> Result<Document> {
        if self.path.exists() {
            self.read()
        } else {
            Ok(Document::new())
        }
    }

    /// Write the document through a temporary file in the same directory so a
    /// failed write never leaves a truncated store behind.
    fn write(&self, doc: &Document) -> Result<()> {
        let contents = toml::to_string_pretty(doc).map_err(StoreError::Serialize)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(contents.as_bytes()).map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!(path = %self.path.display(), entries = doc.len(), "store saved");
        Ok(())
    }
}

impl Store for FileStore {
    fn get(&self, name: &str) -> Result<ValueList> {
        let mut doc = self.read()?;
        doc.remove(name)
            .ok_or_else(|| StoreError::NameNotFound(name.to_string()).into())
    }

    fn get_all(&self) -> Result<BTreeMap<SecretName, ValueList>> {
        self.read()
    }

    fn put_entries(&self, entries: BTreeMap<SecretName, ValueList>) -> Result<()> {
        let mut doc = self.read_or_empty()?;
        doc.extend(entries);
        self.write(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::KEY_TEMPLATE_NAME;
    use crate::core::domain::{Key, Value};
    use crate::error::Error;
    use tempfile::TempDir;

    fn kms_value() -> Value {
        Value {
            key_id: "arn:aws:kms:us-east-1:123456789012:key/abc".into(),
            key_manager: "kms".into(),
            algorithm: "aesgcm256".into(),
            key_ciphertext: "a2V5".into(),
            ciphertext: "Y2lwaGVy".into(),
        }
    }

    fn plain_value() -> Value {
        Value {
            algorithm: "none".into(),
            ciphertext: "aGVsbG8=".into(),
            ..Value::default()
        }
    }

    #[test]
    fn test_roundtrip_preserves_values() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("secrets.toml"));
        let values = ValueList::new(vec![kms_value(), plain_value()]);

        store.put("db_password", values.clone()).unwrap();
        let reread = store.get("db_password").unwrap();

        assert_eq!(reread, values);
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.toml");
        let store = FileStore::new(&path);
        store
            .put("public", ValueList::new(vec![plain_value()]))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[[public]]"));
        assert!(!contents.contains("key_id"));
        assert!(!contents.contains("key_ciphertext"));
    }

    #[test]
    fn test_put_replaces_entirely() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("s.toml"));
        store
            .put("x", ValueList::new(vec![kms_value(), kms_value()]))
            .unwrap();
        store.put("x", ValueList::new(vec![plain_value()])).unwrap();
        assert_eq!(store.get("x").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_name_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("s.toml"));

        assert!(matches!(
            store.get("x"),
            Err(Error::Store(StoreError::FileNotFound(_)))
        ));

        store.put("y", ValueList::new(vec![plain_value()])).unwrap();
        assert!(matches!(
            store.get("x"),
            Err(Error::Store(StoreError::NameNotFound(n))) if n == "x"
        ));
    }

    #[test]
    fn test_key_ids_without_template() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("s.toml"));
        assert!(matches!(
            store.key_ids(),
            Err(Error::Store(StoreError::NameNotFound(n))) if n == KEY_TEMPLATE_NAME
        ));
        assert!(!store.has_template().unwrap());
    }

    #[test]
    fn test_key_ids_from_template() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("s.toml"));
        let key = Key::new("kms", "arn:aws:kms:us-west-2:1:alias/strongbox-default", "aesgcm256");
        store
            .put(KEY_TEMPLATE_NAME, ValueList::new(vec![Value::from_key(&key)]))
            .unwrap();
        assert_eq!(store.key_ids().unwrap(), vec![key]);
    }

    #[test]
    fn test_put_entries_writes_all_names_at_once() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("s.toml"));
        store.put("kept", ValueList::new(vec![plain_value()])).unwrap();
        store.put("db", ValueList::new(vec![plain_value()])).unwrap();

        let entries = BTreeMap::from([
            (
                KEY_TEMPLATE_NAME.to_string(),
                ValueList::new(vec![Value::from_key(&Key::new("kms", "k", "aesgcm256"))]),
            ),
            ("db".to_string(), ValueList::new(vec![kms_value()])),
        ]);
        store.put_entries(entries).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 3);
        assert!(store.has_template().unwrap());
        assert_eq!(all["db"], ValueList::new(vec![kms_value()]));
        assert_eq!(all["kept"].len(), 1);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let err = FileStore::new(&path).get_all().unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_names_needing_quotes() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("s.toml"));
        store
            .put("service.api key", ValueList::new(vec![plain_value()]))
            .unwrap();
        assert_eq!(store.get("service.api key").unwrap().len(), 1);
    }
}
