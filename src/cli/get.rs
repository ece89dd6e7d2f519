//! Get command.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use tracing::info;

use crate::cli::{output, session};
use crate::core::context::Context;
use crate::core::secrets;
use crate::error::Result;

#[derive(clap::Args)]
pub struct Args {
    /// Secret name
    pub name: String,

    /// Write the secret to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Regions whose keys are tried first when decrypting
    #[arg(
        short = 'p',
        long,
        env = "AWS_REGION",
        value_delimiter = ',',
        value_name = "REGIONS"
    )]
    pub aws_region_priority: Vec<String>,
}

/// Decrypt one secret.
///
/// A trailing newline is added only when printing to a terminal.
pub async fn execute(ctx: &Context, filename: Option<PathBuf>, args: Args) -> Result<()> {
    let store = session::store(filename)?;
    let registries = session::registries().await?;
    let plaintext = secrets::get_secret(
        ctx,
        &registries,
        &store,
        &args.name,
        &args.aws_region_priority,
    )
    .await?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, plaintext.as_slice())?;
            info!(path = %path.display(), "wrote secret");
        }
        None => {
            output::raw(&plaintext)?;
            if io::stdout().is_terminal() {
                println!();
            }
        }
    }
    Ok(())
}
