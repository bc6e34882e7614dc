//! Ingest Lane CLI
//!
//! Entry point for the `ingest-lane` command: one pass over every tarball
//! currently in the staging bucket.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use ingest_lane::{enumerate, Lane, LaneConfig, RunLock, StoreKind};
use ingest_remote::{DirStore, GitHubHost, ObjectStore, S3Store};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ingest-lane")]
#[command(about = "Move staged tarballs through review and ingestion", version)]
struct Cli {
    /// Path to config file (default: ingest-lane.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(message) = run(cli) {
        tracing::error!("{}", message);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let (config, source) =
        LaneConfig::load(cli.config.as_deref()).map_err(|e| format!("cannot load configuration: {}", e))?;
    match &source {
        Some(source) => tracing::info!(path = %source.path, digest = %source.digest, "configuration loaded"),
        None => tracing::info!("no configuration file, using built-in defaults"),
    }

    let token = config
        .read_token()
        .map_err(|e| format!("cannot read API token: {}", e))?;

    let _lock = RunLock::acquire(&config.lock_path(), config.lock_timeout())
        .map_err(|e| format!("cannot acquire run lock: {}", e))?;

    let store: Box<dyn ObjectStore> = match config.object_store.kind {
        StoreKind::S3 => Box::new(S3Store::new(&config.object_store.endpoint, config.http_timeout())),
        StoreKind::Dir => {
            let root = config
                .object_store
                .root
                .clone()
                .ok_or_else(|| "object_store.root is required for kind = \"dir\"".to_string())?;
            Box::new(DirStore::new(root))
        }
    };
    let host = GitHubHost::new(
        &config.github.api_url,
        &config.github.repository,
        token,
        config.http_timeout(),
    )
    .map_err(|e| format!("cannot create hosting client: {}", e))?;

    let artifacts = enumerate(store.as_ref(), &config.bucket, &config.metadata_suffix)
        .map_err(|e| format!("cannot list bucket {}: {}", config.bucket, e))?;

    let lane = Lane::new(&config, store.as_ref(), &host);
    let summary = lane.run_all(&artifacts);
    tracing::info!(
        failures = summary.failures(),
        duration_ms = summary.duration_ms().unwrap_or(0),
        "{}",
        summary.human_summary
    );

    if let Some(path) = &config.summary_path {
        match summary.write_to_file(path) {
            Ok(()) => tracing::info!(path = %path.display(), "run summary written"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot write run summary"),
        }
    }
    Ok(())
}
