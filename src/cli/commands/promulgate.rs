use charm::{Reference, Store};
use clap::Parser;

/// The `promulgate` subcommand.
#[derive(Parser, Debug)]
pub(super) struct Args {
    /// The owned base URL, e.g. `~alice/foo`
    base: Reference,
    /// Revoke the alias instead of granting it
    #[arg(long)]
    revoke: bool,
}

pub(super) async fn run(store: &Store, args: Args) -> anyhow::Result<()> {
    store.set_promulgated(&args.base, !args.revoke).await?;
    Ok(())
}
