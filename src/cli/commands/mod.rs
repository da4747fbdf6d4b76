mod acl;
mod check;
mod promulgate;
mod publish;
mod resolve;
mod upload;

use std::process::ExitCode;

use clap::Subcommand;
use serde::Serialize;

use super::{Args, store};

#[derive(Subcommand)]
pub(super) enum Commands {
    /// Upload a new charm or bundle revision.
    ///
    /// The archive is copied into the blob store and a new revision is created
    /// under the owner named in the URL:
    ///
    /// - `~user/series/name` uploads a single-series charm
    /// - `~user/name --supports s1,s2` uploads a multi-series charm
    /// - `~user/bundle/name` uploads a bundle
    #[command(verbatim_doc_comment)]
    Upload(upload::Args),
    /// Release a revision on one or more channels.
    ///
    /// Every series the revision supports is pointed at it, replacing
    /// whatever was released there before.
    #[command(verbatim_doc_comment)]
    Publish(publish::Args),
    /// Grant or revoke the user-less alias for a name.
    Promulgate(promulgate::Args),
    /// Resolve a reference to exactly one stored revision.
    Resolve(resolve::Args),
    /// List every stored URL a reference could mean.
    Expand(resolve::ExpandArgs),
    /// Show or change channel permissions.
    #[command(subcommand)]
    Acl(acl::Command),
    /// Report invariant violations across the whole store.
    Check,
}

/// Run the selected subcommand against the configured store.
pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let opened = store::open(args.store.as_deref()).await?;
    match args.command {
        Commands::Upload(args) => upload::run(&opened, args).await?,
        Commands::Publish(args) => publish::run(&opened.store, args).await?,
        Commands::Promulgate(args) => promulgate::run(&opened.store, args).await?,
        Commands::Resolve(args) => resolve::run(&opened.store, args).await?,
        Commands::Expand(args) => resolve::expand(&opened.store, args).await?,
        Commands::Acl(command) => acl::run(&opened.store, command).await?,
        Commands::Check => return check::run(&opened.store).await,
    }
    Ok(ExitCode::SUCCESS)
}

/// Write `value` to stdout as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
