//! The main entry point for the charmstore CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use charmstore::cli::{self, Args};
use clap::Parser;

//================================================================================================
// Functions
//================================================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(cli::change_directory());
    let _guard = cli::init_global_subscriber(args.log);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl+C received, terminating...");
            ExitCode::FAILURE
        }
        res = cli::run(args) => match res {
            Ok(status) => status,
            Err(e) => {
                charmstore::fatal!(e);
                ExitCode::FAILURE
            },
        }
    }
}
