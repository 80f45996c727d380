//! Shiplite command-line entry point.
//!
//! `shiplite build` assembles the runtime image at build time; `shiplite
//! boot` is the container entry process that applies migrations and then
//! execs into serving. Exit codes follow the pipeline contract: 0 for a
//! cleanly terminated service, the migration tool's own status for a failed
//! migration, 124 for a migration timeout, 1 for build-time failures.

use clap::{Parser, Subcommand};
use shiplite::boot::{BootSequencer, spawn_signal_listener};
use shiplite::build::{BuildTarget, ImageBuilder};
use shiplite::config::{BuildConfig, RuntimeConfig};
use shiplite::ShipliteResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "shiplite",
    version,
    about = "Container build-and-boot pipeline for database-backed services"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the runtime image from the locked dependency set.
    Build {
        /// Build configuration file (JSON).
        #[arg(long)]
        config: PathBuf,
        /// Also export the image as a tar.gz beside it.
        #[arg(long)]
        export: bool,
    },
    /// Apply pending migrations, then start the service process.
    Boot {
        /// Runtime configuration file (JSON).
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "shiplite failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run(cli: Cli) -> ShipliteResult<()> {
    match cli.command {
        Commands::Build { config, export } => {
            let config = BuildConfig::load(&config)?;
            let target = if export {
                BuildTarget::Archive
            } else {
                BuildTarget::Tree
            };
            let report = ImageBuilder::new(config, target)?.build().await?;
            tracing::info!(
                image = %report.image.root().display(),
                build_id = %report.image.metadata().build_id,
                "build finished"
            );
            if let Some(archive) = report.archive {
                tracing::info!(archive = %archive.display(), "archive written");
            }
            Ok(())
        }
        Commands::Boot { config } => {
            let mut config = RuntimeConfig::load(&config)?;
            config.apply_env()?;

            let (sequencer, handle) = BootSequencer::new(config);
            spawn_signal_listener(handle);

            let outcome = sequencer.run().await?;
            tracing::info!(?outcome, "boot sequence finished");
            Ok(())
        }
    }
}
