use charm::{Reference, Store};
use clap::Parser;

/// The `publish` subcommand.
#[derive(Parser, Debug)]
pub(super) struct Args {
    /// The revision to release
    url: Reference,
    /// The channels to release it on
    #[arg(required = true, value_name = "CHANNEL")]
    channels: Vec<String>,
}

pub(super) async fn run(store: &Store, args: Args) -> anyhow::Result<()> {
    store.publish(&args.url, &args.channels).await?;
    Ok(())
}
