//! Secret operations (put, get, list, export).
//!
//! Writing encrypts the plaintext once per key, concurrently, and replaces the
//! stored list only when every key succeeded. Reading tries the stored values
//! in region priority order and returns the first one that decrypts.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::core::algorithm::{Algorithm, Algorithms};
use crate::core::constants::KEY_TEMPLATE_NAME;
use crate::core::context::Context;
use crate::core::domain::{Key, Value, ValueList};
use crate::core::fanout::spawn_all;
use crate::core::keymanager::{KeyManager, KeyManagers};
use crate::core::store::{self, Store};
use crate::error::{Error, Result, StoreError, ValidationError};

/// Name-to-implementation registries, built once per invocation.
#[derive(Clone, Default)]
pub struct Registries {
    pub algorithms: Algorithms,
    pub key_managers: KeyManagers,
}

impl Registries {
    /// Built-in algorithms and the no-op key manager.
    pub fn standard() -> Self {
        Self {
            algorithms: Algorithms::standard(),
            key_managers: KeyManagers::standard(),
        }
    }
}

/// How `put` picks its keys.
#[derive(Debug, Clone)]
pub struct KeySelection {
    /// Explicit key ids; empty means use the template
    pub key_ids: Vec<String>,
    pub key_manager: String,
    pub algorithm: String,
}

/// Result of decrypting every secret.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub secrets: BTreeMap<String, String>,
    pub failed: Vec<(String, Error)>,
}

/// Keys a `put` encrypts under.
///
/// A key-less algorithm always gets a single key with no manager and no id,
/// whatever key ids were given. Otherwise explicit key ids win over the
/// template.
///
/// # Errors
///
/// Returns `StoreError::NameNotFound` for the template if there is none.
pub fn choose_keys(
    store: &dyn Store,
    algorithms: &Algorithms,
    selection: &KeySelection,
) -> Result<Vec<Key>> {
    if !algorithms.get(&selection.algorithm)?.needs_key() {
        if !selection.key_ids.is_empty() {
            debug!(algorithm = %selection.algorithm, "ignoring key ids for key-less algorithm");
        }
        return Ok(vec![Key::new("", "", &selection.algorithm)]);
    }
    if !selection.key_ids.is_empty() {
        return Ok(selection
            .key_ids
            .iter()
            .map(|id| Key::new(&selection.key_manager, id, &selection.algorithm))
            .collect());
    }
    store.key_ids()
}

async fn encrypt_one(
    ctx: Context,
    algorithm: Arc<dyn Algorithm>,
    manager: Option<Arc<dyn KeyManager>>,
    key: Key,
    name: String,
    plaintext: Arc<Zeroizing<Vec<u8>>>,
) -> Result<Value> {
    let mut value = Value::from_key(&key);
    match manager {
        Some(manager) => {
            let envelope = manager
                .generate_envelope_key(&ctx, &key.key_id, &name)
                .await?;
            value.set_ciphertext(&algorithm.encrypt(&envelope.plaintext, &plaintext)?);
            value.set_key_ciphertext(&envelope.ciphertext);
            if !envelope.resolved_id.is_empty() {
                value.key_id = envelope.resolved_id;
            }
        }
        None => value.set_ciphertext(&algorithm.encrypt(&[], &plaintext)?),
    }
    Ok(value)
}

/// Encrypt `plaintext` under every key concurrently.
///
/// All-or-nothing: the first failure (in key order) is returned, and every
/// failure is logged.
pub async fn encrypt_all(
    ctx: &Context,
    registries: &Registries,
    keys: &[Key],
    name: &str,
    plaintext: &[u8],
) -> Result<ValueList> {
    let plaintext = Arc::new(Zeroizing::new(plaintext.to_vec()));
    let mut tasks = Vec::with_capacity(keys.len());
    for key in keys {
        let algorithm = registries.algorithms.get(&key.algorithm)?;
        let manager = if algorithm.needs_key() {
            Some(registries.key_managers.get(&key.key_manager)?)
        } else {
            None
        };
        let label = if key.key_id.is_empty() {
            key.algorithm.clone()
        } else {
            key.key_id.clone()
        };
        let fut = encrypt_one(
            ctx.clone(),
            algorithm,
            manager,
            key.clone(),
            name.to_string(),
            plaintext.clone(),
        );
        tasks.push((label, fut));
    }

    let values = spawn_all(ctx, tasks).await.all()?;
    Ok(values.into_iter().map(|(_, v)| v).collect())
}

/// Encrypt and store a secret, replacing any previous values.
///
/// When the store has no template yet and keys were given explicitly, they
/// become the template. The template and the secret land in one store update.
pub async fn put_secret(
    ctx: &Context,
    registries: &Registries,
    store: &dyn Store,
    name: &str,
    plaintext: &[u8],
    selection: &KeySelection,
) -> Result<ValueList> {
    if store::is_template(name) {
        return Err(ValidationError::ReservedName(name.to_string()).into());
    }
    let keys = choose_keys(store, &registries.algorithms, selection)?;
    debug!(name, keys = keys.len(), "encrypting");
    let values = encrypt_all(ctx, registries, &keys, name, plaintext).await?;

    let mut entries: BTreeMap<String, ValueList> = BTreeMap::new();
    let explicit = !selection.key_ids.is_empty() && keys.iter().all(|k| !k.key_id.is_empty());
    if explicit && !store.has_template()? {
        info!("seeding key template from --key-id");
        entries.insert(
            KEY_TEMPLATE_NAME.to_string(),
            keys.iter().map(Value::from_key).collect(),
        );
    }
    entries.insert(name.to_string(), values.clone());
    store.put_entries(entries)?;
    Ok(values)
}

/// Decrypt a single value.
pub async fn decrypt_value(
    ctx: &Context,
    registries: &Registries,
    name: &str,
    value: &Value,
) -> Result<Zeroizing<Vec<u8>>> {
    let algorithm = registries.algorithms.get(&value.algorithm)?;
    let ciphertext = value.ciphertext_bytes()?;
    if !algorithm.needs_key() {
        return algorithm.decrypt(&[], &ciphertext);
    }
    let manager = registries.key_managers.get(&value.key_manager)?;
    let wrapped = value.key_ciphertext_bytes()?;
    let data_key = manager.decrypt(ctx, &value.key_id, &wrapped, name).await?;
    algorithm.decrypt(&data_key, &ciphertext)
}

/// Decrypt the first value that works, trying `priorities` regions first.
///
/// Each failed attempt is logged. If none succeed the last error is returned.
pub async fn decrypt_with_failover<S: AsRef<str>>(
    ctx: &Context,
    registries: &Registries,
    name: &str,
    values: &ValueList,
    priorities: &[S],
) -> Result<Zeroizing<Vec<u8>>> {
    let mut ordered = values.clone();
    ordered.sort_by_region(priorities);

    let mut last = None;
    for value in &ordered {
        match decrypt_value(ctx, registries, name, value).await {
            Ok(plaintext) => return Ok(plaintext),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!(
                    key_manager = %value.key_manager,
                    key_id = %value.key_id,
                    error = %e,
                    "unable to decrypt, trying the next value"
                );
                last = Some(e);
            }
        }
    }
    Err(last.unwrap_or_else(|| StoreError::NameNotFound(name.to_string()).into()))
}

/// Look up and decrypt one secret.
pub async fn get_secret<S: AsRef<str>>(
    ctx: &Context,
    registries: &Registries,
    store: &dyn Store,
    name: &str,
    priorities: &[S],
) -> Result<Zeroizing<Vec<u8>>> {
    let values = store.get(name)?;
    decrypt_with_failover(ctx, registries, name, &values, priorities).await
}

/// Secret names, sorted, without the template.
pub fn list_names(store: &dyn Store) -> Result<Vec<String>> {
    Ok(store
        .get_all()?
        .into_keys()
        .filter(|name| !store::is_template(name))
        .collect())
}

/// Decrypt every secret, collecting failures instead of stopping.
pub async fn export_all<S: AsRef<str>>(
    ctx: &Context,
    registries: &Registries,
    store: &dyn Store,
    priorities: &[S],
) -> Result<ExportReport> {
    let mut report = ExportReport::default();
    for (name, values) in store.get_all()? {
        if store::is_template(&name) {
            continue;
        }
        match decrypt_with_failover(ctx, registries, &name, &values, priorities).await {
            Ok(plaintext) => match String::from_utf8(plaintext.to_vec()) {
                Ok(text) => {
                    report.secrets.insert(name, text);
                }
                Err(e) => {
                    // The rejected copy holds the plaintext too.
                    drop(Zeroizing::new(e.into_bytes()));
                    warn!(name = %name, "secret is not valid UTF-8, leaving it out of the export");
                    report.failed.push((name.clone(), ValidationError::NotUtf8(name).into()));
                }
            },
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!(name = %name, error = %e, "unable to decrypt secret");
                report.failed.push((name, e));
            }
        }
    }
    Ok(report)
}
