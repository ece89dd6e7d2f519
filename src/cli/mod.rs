//! Command-line interface.

pub mod completions;
pub mod export;
pub mod get;
pub mod kms;
pub mod list;
pub mod output;
pub mod put;
mod session;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::core::context::Context;
use crate::error::Result;

/// Strongbox - envelope-encrypted secrets stored next to your code.
#[derive(Parser)]
#[command(
    name = "strongbox",
    about = "Envelope-encrypted secrets stored next to your code",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// File storing the secrets
    #[arg(short, long, global = true, env = "STRONGBOX_FILENAME")]
    pub filename: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, global = true, env = "STRONGBOX_TIMEOUT", value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Command {
    /// Read a secret
    Get(get::Args),

    /// Write a secret
    #[command(alias = "write")]
    Put(put::Args),

    /// List secret names
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print every secret in plaintext as TOML
    Export(export::Args),

    /// Manage AWS KMS keys, policies and grants
    Kms {
        #[command(subcommand)]
        action: kms::KmsCommand,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Execute a parsed command line.
///
/// Builds the async runtime and a context that is cancelled on Ctrl-C or
/// when `--timeout` elapses.
pub fn execute(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        return completions::execute(shell);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let ctx = Context::new();
        let watcher = ctx.watch(cli.timeout.map(Duration::from_secs));
        let result = dispatch(&ctx, cli.filename, cli.command).await;
        watcher.abort();
        debug!(ok = result.is_ok(), "command finished");
        result
    })
}

async fn dispatch(ctx: &Context, filename: Option<PathBuf>, command: Command) -> Result<()> {
    match command {
        Command::Get(args) => get::execute(ctx, filename, args).await,
        Command::Put(args) => put::execute(ctx, filename, args).await,
        Command::List { json } => list::execute(filename, json),
        Command::Export(args) => export::execute(ctx, filename, args).await,
        Command::Kms { action } => kms::execute(ctx, filename, action).await,
        Command::Completions { shell } => completions::execute(shell),
    }
}
