//! `kms init`: provision a multi-region key and record it in the template.

use std::path::PathBuf;

use tracing::info;

use super::KeyArgs;
use crate::cli::{output, session};
use crate::core::algorithm::DEFAULT_ALGORITHM;
use crate::core::context::Context;
use crate::core::kms::{self, ProvisionRequest};
use crate::error::Result;

#[derive(clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Provision regions that lack a key even when others already have one
    #[arg(long)]
    pub create_missing_keys: bool,

    /// Comma-separated principals allowed to administer the key. The caller
    /// is always included
    #[arg(short = 'd', long, value_delimiter = ',')]
    pub administrators: Vec<String>,

    /// Comma-separated principals allowed to encrypt and decrypt. The caller
    /// is always included
    #[arg(short, long, value_delimiter = ',')]
    pub users: Vec<String>,

    /// Also create roles for the administrators and users
    #[arg(long)]
    pub create_simple_roles: bool,

    /// Do not let IAM policies grant access to the key
    #[arg(long)]
    pub disable_iam_policies: bool,

    /// Use this CloudFormation template instead of the built-in one
    #[arg(long, value_name = "URL")]
    pub cloudformation_template_url: Option<String>,

    /// Algorithm recorded in the key template
    #[arg(short, long, env = "STRONGBOX_ALGORITHM", default_value = DEFAULT_ALGORITHM)]
    pub algorithm: String,
}

pub async fn execute(ctx: &Context, filename: Option<PathBuf>, args: Args) -> Result<()> {
    let store = session::store(filename)?;
    crate::core::secrets::Registries::standard()
        .algorithms
        .get(&args.algorithm)?;
    let cloud = session::connect().await?;

    let request = ProvisionRequest {
        label: args.key.label,
        regions: args.key.regions,
        create_missing_keys: args.create_missing_keys,
        administrators: args.administrators,
        users: args.users,
        create_simple_roles: args.create_simple_roles,
        disable_iam_policies: args.disable_iam_policies,
        template_url: args.cloudformation_template_url,
    };
    let provisioned = kms::provision(ctx, cloud, &request).await?;
    for (region, alias) in &provisioned.aliases {
        let state = if provisioned.created.contains(region) {
            "created"
        } else {
            "existing"
        };
        output::kv(&output::region(region), format!("{} ({})", alias, state));
    }

    let template = kms::update_template(&store, &provisioned.aliases, &args.algorithm)?;
    info!(keys = template.len(), "key template updated");
    output::success(&format!(
        "{} now lists {} key(s)",
        store.path().display(),
        template.len()
    ));
    Ok(())
}
