use charm::{Acl, Channel, Reference, Store};
use clap::{Parser, Subcommand};

#[derive(Subcommand, Debug)]
pub(super) enum Command {
    /// Show the permissions of a channel.
    Get(GetArgs),
    /// Replace the permissions of one or more channels.
    Set(SetArgs),
}

#[derive(Parser, Debug)]
pub(super) struct GetArgs {
    /// The owned base URL
    base: Reference,
    /// The channel to show
    #[arg(long, short, default_value_t = Channel::Unpublished)]
    channel: Channel,
}

#[derive(Parser, Debug)]
pub(super) struct SetArgs {
    /// The owned base URL
    base: Reference,
    /// The channels to write
    #[arg(long = "channel", short, required = true, value_name = "CHANNEL")]
    channels: Vec<String>,
    /// Users and groups allowed to read; `everyone` grants public access
    #[arg(long, value_delimiter = ',')]
    read: Vec<String>,
    /// Users and groups allowed to write
    #[arg(long, value_delimiter = ',')]
    write: Vec<String>,
}

pub(super) async fn run(store: &Store, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Get(args) => super::print_json(&store.acl(&args.base, args.channel).await?),
        Command::Set(args) => {
            let acl = Acl {
                read: args.read,
                write: args.write,
            };
            store.set_acl(&args.base, &args.channels, acl).await?;
            Ok(())
        },
    }
}
