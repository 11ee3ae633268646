//! Backfill control binary: populates the `content_tag` relation from the
//! legacy array mirrors. Exits non-zero on unrecoverable error (including a
//! missing or corrupt checkpoint when resuming).

use clap::Parser;
use sea_orm::Database;
use tracing::info;

use server::modules::tags::{BackfillConfig, BackfillMigrator, BackfillMode, ContentSource};

#[derive(Parser, Debug)]
#[command(
    name = "backfill",
    about = "Populate the content_tag relation from the legacy tag arrays"
)]
struct Args {
    /// Content source to process (regular|auto); omitted means both
    #[arg(long)]
    content_source: Option<ContentSource>,

    /// Content rows per batch
    #[arg(long)]
    batch_size: Option<u64>,

    /// Resume from the persisted checkpoint (the default; fails if none exists)
    #[arg(long, conflicts_with = "restart")]
    resume: bool,

    /// Discard the checkpoint and start from the beginning
    #[arg(long)]
    restart: bool,

    /// Database connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = BackfillConfig::from_env();
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    let mode = match (args.resume, args.restart) {
        (_, true) => BackfillMode::Restart,
        _ => BackfillMode::Resume,
    };

    let sources = match args.content_source {
        Some(source) => vec![source],
        None => ContentSource::ALL.to_vec(),
    };

    let db = Database::connect(&args.database_url).await?;
    let migrator = BackfillMigrator::new(db, config);

    for source in sources {
        let report = migrator.run(source, mode).await?;
        info!(
            source = %source,
            rows = report.rows_processed,
            edges = report.edges_inserted,
            batches = report.batches,
            "Backfill finished for source"
        );
    }

    Ok(())
}
