//! Export command.

use std::path::PathBuf;

use crate::cli::{output, session};
use crate::core::context::Context;
use crate::core::secrets;
use crate::error::{Error, Result};

#[derive(clap::Args)]
pub struct Args {
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

/// Print every secret as a TOML table of `name = "value"`.
///
/// Secrets that fail to decrypt are reported and skipped; the command still
/// fails afterwards.
pub async fn execute(ctx: &Context, filename: Option<PathBuf>, args: Args) -> Result<()> {
    let store = session::store(filename)?;
    let registries = session::registries().await?;
    let report =
        secrets::export_all(ctx, &registries, &store, &args.aws_region_priority).await?;

    let document = toml::to_string(&report.secrets).map_err(crate::error::StoreError::from)?;
    output::raw(document.as_bytes())?;

    if report.failed.is_empty() {
        return Ok(());
    }
    for (name, err) in &report.failed {
        output::error(&format!("{}: {}", name, err));
    }
    Err(Error::ExportIncomplete(report.failed.len()))
}
