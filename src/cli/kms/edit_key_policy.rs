//! `kms edit-key-policy`: edit one policy and apply it in every region.

use std::sync::Arc;

use super::KeyArgs;
use crate::cli::{output, session};
use crate::core::constants::alias_name;
use crate::core::context::Context;
use crate::core::editor::SystemEditor;
use crate::core::kms::{self, MultiRegionKey};
use crate::error::Result;

#[derive(clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Treat this region's policy as authoritative when regions disagree
    #[arg(long, value_name = "REGION")]
    pub force_region: Option<String>,
}

pub async fn execute(ctx: &Context, args: Args) -> Result<()> {
    kms::validate_label(&args.key.label)?;
    let cloud = session::connect().await?;
    let alias = alias_name(&args.key.label);
    let mut key = MultiRegionKey::resolve(ctx, Arc::clone(&cloud), &alias, &args.key.regions).await?;

    key.edit_policy(ctx, &SystemEditor::from_env(), args.force_region.as_deref())
        .await?;
    for region in key.regions() {
        output::kv(&output::region(&region), "policy updated");
    }
    output::success(&format!("key policy for {} saved", alias));
    Ok(())
}
