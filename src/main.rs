//! Strongbox - envelope-encrypted secrets stored next to your code.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strongbox::cli::output;
use strongbox::cli::{execute, Cli};
use strongbox::error::{CloudError, EditorError, Error, KeyManagerError, KmsError, StoreError};

fn hint(error: &Error) -> Option<&'static str> {
    match error {
        Error::Store(StoreError::FileNotFound(_)) => {
            Some("run: strongbox kms init, or pass --key-id to put")
        }
        Error::Editor(EditorError::NoEditor) => Some("set VISUAL or EDITOR"),
        Error::Kms(KmsError::PolicyMismatch { .. }) => {
            Some("pick the authoritative policy with --force-region")
        }
        Error::Cloud(CloudError::NotCompiled) => Some("rebuild with --features aws"),
        Error::KeyManager(KeyManagerError::UnknownKeyManager { label, .. }) if label == "kms" => {
            Some("rebuild with --features aws to use KMS keys")
        }
        _ => None,
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("STRONGBOX_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("strongbox=debug")
        } else {
            EnvFilter::new("strongbox=warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = execute(cli) {
        output::error(&e.to_string());
        if let Some(hint) = hint(&e) {
            output::hint(hint);
        }
        std::process::exit(1);
    }
}
