use std::path::PathBuf;

use charm::blob::BlobStore;
use charm::entity::{BundleMeta, CharmMeta};
use charm::{Kind, Reference, Series};
use clap::Parser;

use crate::cli::store::Opened;

/// The `upload` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Upload Options")]
pub(super) struct Args {
    /// The owned URL to upload as, optionally with an explicit revision
    url: Reference,
    /// The archive to upload
    archive: PathBuf,
    /// The series a multi-series charm supports
    #[arg(long, value_delimiter = ',', value_name = "SERIES")]
    supports: Vec<Series>,
    /// A one line summary of the charm
    #[arg(long, default_value = "")]
    summary: String,
}

pub(super) async fn run(opened: &Opened, args: Args) -> anyhow::Result<()> {
    let kind = match args.url.series() {
        Some(series) if series.is_bundle() => Kind::Bundle {
            meta: BundleMeta::default(),
        },
        Some(series) => Kind::Charm {
            supported_series: vec![series.clone()],
            meta: CharmMeta {
                summary: args.summary,
                subordinate: false,
            },
        },
        None => Kind::Charm {
            supported_series: args.supports,
            meta: CharmMeta {
                summary: args.summary,
                subordinate: false,
            },
        },
    };

    let bytes = tokio::fs::read(&args.archive).await?;
    let blob = opened.blobs.put(&bytes).await?;
    let entity = opened.store.add_revision(&args.url, kind, blob).await?;
    tracing::info!(url = %entity.url, archive = %args.archive.display(), "uploaded");
    super::print_json(&entity)
}
