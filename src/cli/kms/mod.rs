//! `kms` commands: key provisioning, key policies and grants.

pub mod deprovision;
pub mod edit_key_policy;
pub mod grants;
pub mod init;

use std::path::PathBuf;

use clap::Subcommand;

use crate::cli::{output, session};
use crate::core::constants::DEFAULT_LABEL;
use crate::core::context::Context;
use crate::error::Result;

/// Regions and label selecting one multi-region key.
#[derive(clap::Args, Debug, Clone)]
pub struct KeyArgs {
    /// Comma-separated regions the key lives in
    #[arg(
        short,
        long,
        env = "STRONGBOX_REGIONS",
        value_delimiter = ',',
        default_value = "us-east-1,us-west-1,us-west-2"
    )]
    pub regions: Vec<String>,

    /// Label identifying the key across regions
    #[arg(short, long, env = "STRONGBOX_LABEL", default_value = DEFAULT_LABEL)]
    pub label: String,
}

#[derive(Subcommand)]
pub enum KmsCommand {
    /// Provision keys and add them to the store's key template
    Init(init::Args),

    /// Find and optionally delete the keys for a label
    Deprovision(deprovision::Args),

    /// Edit the key policy in every region at once
    EditKeyPolicy(edit_key_policy::Args),

    /// Manage grants on the keys protecting a secret
    Grants {
        #[command(subcommand)]
        action: grants::GrantsCommand,
    },

    /// Print the account and ARN of the current credentials
    GetCallerIdentity,
}

pub async fn execute(ctx: &Context, filename: Option<PathBuf>, command: KmsCommand) -> Result<()> {
    match command {
        KmsCommand::Init(args) => init::execute(ctx, filename, args).await,
        KmsCommand::Deprovision(args) => deprovision::execute(ctx, args).await,
        KmsCommand::EditKeyPolicy(args) => edit_key_policy::execute(ctx, args).await,
        KmsCommand::Grants { action } => grants::execute(ctx, filename, action).await,
        KmsCommand::GetCallerIdentity => caller_identity(ctx).await,
    }
}

async fn caller_identity(ctx: &Context) -> Result<()> {
    let cloud = session::connect().await?;
    let caller = ctx.guard(cloud.identity().caller_identity()).await?;
    output::json(&serde_json::json!({
        "account": caller.account,
        "arn": caller.arn,
    }))
}
