//! `kms deprovision`: remove the alias and stack behind a label.

use std::io::{self, IsTerminal};

use dialoguer::Confirm;

use super::KeyArgs;
use crate::cli::{output, session};
use crate::core::context::Context;
use crate::core::kms::{self, RegionFindings};
use crate::error::{Error, Result};

#[derive(clap::Args)]
pub struct Args {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Actually delete the resources instead of listing them
    #[arg(long)]
    pub destructive: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

fn print_findings(findings: &RegionFindings, alias: &str, stack: &str) {
    let region = output::region(&findings.region);
    match &findings.alias_target {
        Some(target) if findings.alias_deleted => {
            output::kv(&region, format!("deleted alias {} (was {})", alias, target))
        }
        Some(target) => output::kv(&region, format!("found alias {} for {}", alias, target)),
        None => output::kv(&region, format!("no alias {}", alias)),
    }
    if findings.stack_deleted {
        output::kv(&region, format!("deleted stack {}", stack));
    } else if findings.stack_found {
        output::kv(&region, format!("found stack {}", stack));
    } else {
        output::kv(&region, format!("no stack {}", stack));
    }
}

pub async fn execute(ctx: &Context, args: Args) -> Result<()> {
    kms::validate_label(&args.key.label)?;
    if args.destructive && !args.yes && io::stdin().is_terminal() {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete the keys labelled '{}' in {}?",
                args.key.label,
                args.key.regions.join(", ")
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            return Err(Error::Cancelled);
        }
    }

    let cloud = session::connect().await?;
    let report = kms::deprovision(
        ctx,
        cloud,
        &args.key.label,
        &args.key.regions,
        args.destructive,
    )
    .await?;

    let alias = crate::core::constants::alias_name(&args.key.label);
    let stack = crate::core::constants::stack_name(&args.key.label);
    for findings in &report.findings {
        print_findings(findings, &alias, &stack);
    }
    if !args.destructive {
        output::hint(&format!(
            "to delete these resources, re-run with {}",
            output::cmd("--destructive")
        ));
    }
    report.into_result().map(|_| ())
}
