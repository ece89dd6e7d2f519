//! Put command.

use std::path::PathBuf;

use tracing::info;

use crate::cli::{output, session};
use crate::core::algorithm::DEFAULT_ALGORITHM;
use crate::core::constants::KEY_TEMPLATE_NAME;
use crate::core::context::Context;
use crate::core::keymanager::KMS_LABEL;
use crate::core::secrets::{self, KeySelection};
use crate::error::{Error, Result, StoreError, ValidationError};

#[derive(clap::Args)]
pub struct Args {
    /// Secret name
    pub name: String,

    /// Secret value
    pub value: Option<String>,

    /// Keys to encrypt under: full ARNs, or aliases and key ids when AWS_REGION
    /// is set. Defaults to the key template in the store
    #[arg(short, long, value_delimiter = ',', value_name = "KEY_IDS")]
    pub key_id: Vec<String>,

    /// Source of envelope encryption keys
    #[arg(short = 'p', long, env = "STRONGBOX_KEY_MANAGER", default_value = KMS_LABEL)]
    pub key_manager: String,

    /// Encryption algorithm
    #[arg(short, long, env = "STRONGBOX_ALGORITHM", default_value = DEFAULT_ALGORITHM)]
    pub algorithm: String,

    /// Read the secret from FILE instead of the command line
    #[arg(short = 'i', long, value_name = "FILE")]
    pub from_file: Option<PathBuf>,
}

fn plaintext(args: &Args) -> Result<Vec<u8>> {
    match (&args.from_file, &args.value) {
        (Some(_), Some(_)) => Err(ValidationError::ConflictingValue.into()),
        (Some(path), None) => Ok(std::fs::read(path)?),
        (None, value) => Ok(value.as_deref().unwrap_or_default().as_bytes().to_vec()),
    }
}

/// Encrypt a secret under every selected key and store it.
pub async fn execute(ctx: &Context, filename: Option<PathBuf>, args: Args) -> Result<()> {
    let store = session::store(filename)?;
    let plaintext = zeroize::Zeroizing::new(plaintext(&args)?);
    let registries = session::registries().await?;
    let selection = KeySelection {
        key_ids: args
            .key_id
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect(),
        key_manager: args.key_manager,
        algorithm: args.algorithm,
    };

    let values =
        match secrets::put_secret(ctx, &registries, &store, &args.name, &plaintext, &selection)
            .await
        {
            Err(Error::Store(StoreError::NameNotFound(name))) if name == KEY_TEMPLATE_NAME => {
                return Err(ValidationError::NoKeyTemplate(store.path().to_path_buf()).into());
            }
            other => other?,
        };

    info!(name = %args.name, values = values.len(), "stored secret");
    output::success(&format!(
        "stored {} under {} key(s)",
        args.name,
        values.len()
    ));
    Ok(())
}
