//! `kms grants`: grants on the keys protecting one secret.

use std::path::PathBuf;

use clap::Subcommand;

use crate::cli::{output, session};
use crate::core::context::Context;
use crate::core::domain::GrantOperation;
use crate::core::kms::{self, GrantSpec};
use crate::core::store::Store;
use crate::error::Result;

#[derive(Subcommand)]
pub enum GrantsCommand {
    /// Allow a principal to use the keys a secret is encrypted under
    Create {
        /// Secret name
        name: String,

        /// Principal receiving the grant: an ARN, `role/x`, `user/x` or a user name
        #[arg(short, long)]
        grantee_principal: String,

        /// Principal allowed to retire the grant
        #[arg(short = 'e', long)]
        retiring_principal: Option<String>,

        /// Comma-separated KMS operations to allow
        #[arg(short, long, value_delimiter = ',', default_value = "Decrypt,RetireGrant")]
        operations: Vec<GrantOperation>,

        /// Allow decrypting every secret under these keys, not only this one
        #[arg(long)]
        all_names: bool,
    },

    /// List grants on the keys a secret is encrypted under
    List {
        /// Secret name
        name: String,
    },

    /// Retire a grant from every key a secret is encrypted under
    Retire {
        /// Secret name
        name: String,

        /// Name of the grant to retire
        #[arg(long)]
        grant_name: String,
    },
}

pub async fn execute(
    ctx: &Context,
    filename: Option<PathBuf>,
    command: GrantsCommand,
) -> Result<()> {
    let store = session::store(filename)?;
    match command {
        GrantsCommand::Create {
            name,
            grantee_principal,
            retiring_principal,
            operations,
            all_names,
        } => {
            let values = store.get(&name)?;
            let cloud = session::connect().await?;
            let spec = GrantSpec {
                grantee_principal,
                retiring_principal,
                operations,
                all_names,
            };
            let created = kms::create_grants(ctx, cloud, &name, &values, &spec).await?;
            output::json(&created)
        }
        GrantsCommand::List { name } => {
            let values = store.get(&name)?;
            let cloud = session::connect().await?;
            let grants = kms::list_grants(ctx, cloud, &name, &values).await?;
            output::json(&grants)
        }
        GrantsCommand::Retire { name, grant_name } => {
            let values = store.get(&name)?;
            let cloud = session::connect().await?;
            let retired = kms::retire_grants(ctx, cloud, &name, &values, &grant_name).await?;
            for (alias, regions) in &retired {
                if regions.is_empty() {
                    output::kv(alias, "no such grant");
                } else {
                    output::kv(alias, format!("retired in {}", regions.join(", ")));
                }
            }
            output::success(&format!("grant {} retired", grant_name));
            Ok(())
        }
    }
}
