//! imgapi-migrate: convert image `tags` objects into `tag` arrays.
//!
//! Reads the IMGAPI config, picks the UFDS or local database backend, and
//! rewrites every image's legacy `tags` field as `key=value` strings. Stops
//! at the first error and exits non-zero.

use std::path::PathBuf;

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod migrate;

use config::Config;
use migrate::Migrator;

#[derive(Parser)]
#[command(name = "imgapi-migrate")]
#[command(about = "Migrate image `tags` objects to `tag` key=value arrays", long_about = None)]
struct Cli {
    /// Path to imgapi.config.json (defaults to the deployment's config)
    #[arg(long, env = "IMGAPI_CONFIG")]
    config: Option<PathBuf>,

    /// Preview changes without applying them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "imgapi_migrate=info,imgapi_store=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let backend = Config::load(&config_path)?.backend()?;

    let store = migrate::open_store(&backend).await?;
    let mut migrator = Migrator::new(store).with_dry_run(cli.dry_run);
    let report = migrator.run().await?;
    tracing::debug!(phase = ?migrator.phase(), "run finished");
    let backend = migrator.store().kind();

    if cli.dry_run {
        println!(
            "Dry-run ({}): {} of {} image(s) would be updated",
            backend, report.records_updated, report.records_listed
        );
        for change in &report.changes {
            println!("  - {}", change);
        }
    } else {
        println!(
            "Applied ({}): {} image(s) updated, {} without tags",
            backend, report.records_updated, report.records_skipped
        );
    }

    Ok(())
}
