use charm::{Channel, Reference, Store};
use clap::Parser;

/// The `resolve` subcommand.
#[derive(Parser, Debug)]
pub(super) struct Args {
    /// The reference to resolve
    url: Reference,
    /// The channel to resolve unrevisioned references in [default: stable]
    #[arg(long, short)]
    channel: Option<Channel>,
    /// Require a revision and skip channel resolution entirely
    #[arg(long, conflicts_with = "channel")]
    exact: bool,
}

/// The `expand` subcommand.
#[derive(Parser, Debug)]
pub(super) struct ExpandArgs {
    /// The reference to expand
    url: Reference,
}

pub(super) async fn run(store: &Store, args: Args) -> anyhow::Result<()> {
    let url = args.url.with_channel(args.channel);
    let entity = if args.exact {
        store.find_entity(&url).await?
    } else {
        store.find_best_entity(&url).await?
    };
    tracing::debug!(%url, resolved = %entity.url);
    super::print_json(&entity)
}

pub(super) async fn expand(store: &Store, args: ExpandArgs) -> anyhow::Result<()> {
    for url in store.expand_url(&args.url).await? {
        println!("{url}");
    }
    Ok(())
}
