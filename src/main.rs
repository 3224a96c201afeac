//! # Gamedata Sync CLI (`gds`)
//!
//! ## Usage
//!
//! ```bash
//! gds --config ./config/sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gds init` | Create the SQLite database and run schema migrations |
//! | `gds sources` | List configured sources and their last revision |
//! | `gds update` | Run one update pass |
//! | `gds watch` | Startup pass, then one pass per interval |
//! | `gds stats` | Record counts per game and type |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use gamedata_sync::config;
use gamedata_sync::ingest::{self, PassOptions, Updater};
use gamedata_sync::logging;
use gamedata_sync::migrate;
use gamedata_sync::progress::ProgressMode;
use gamedata_sync::sources;
use gamedata_sync::stats;
use gamedata_sync_core::models::Game;

/// Gamedata Sync: keeps a canonical multilingual game content catalog in
/// step with its upstream data dumps.
#[derive(Parser)]
#[command(name = "gds", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List configured sources with their last synchronized revision.
    Sources,

    /// Run one update pass.
    ///
    /// Sources whose upstream revision is unchanged are skipped unless
    /// `--force` is given.
    Update {
        /// Only update this source: `genshin`, `starrail` or `zzz`.
        #[arg(long)]
        source: Option<Game>,

        /// Run even when the upstream revision is unchanged or unknown.
        #[arg(long)]
        force: bool,

        /// Overwrite existing records (merge unless --replace).
        #[arg(long)]
        rebuild: bool,

        /// With --rebuild, replace whole documents; also re-fetch icons.
        #[arg(long)]
        replace: bool,

        /// Reuse cached raw files instead of downloading.
        #[arg(long)]
        skip_download: bool,

        /// Do not query upstream revisions; normalize from cached files.
        #[arg(long)]
        skip_revision_check: bool,

        /// Progress output on stderr: `off`, `human` or `json`.
        /// Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Run a startup pass, then one pass every `sync.interval_secs`.
    Watch {
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Show record counts per game and type.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing("info,sqlx=warn")?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Update {
            source,
            force,
            rebuild,
            replace,
            skip_download,
            skip_revision_check,
            progress,
        } => {
            let mut opts = PassOptions::from_config(&cfg.sync);
            opts.only = source;
            opts.force = force;
            opts.rebuild |= rebuild;
            opts.replace |= replace;
            opts.skip_download |= skip_download;
            opts.skip_revision_check |= skip_revision_check;

            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let updater = Updater::from_config(Arc::new(cfg))
                .await?
                .with_progress(mode.reporter());
            if let Some(game) = source {
                if updater.registry().find(game).is_none() {
                    bail!("Source '{}' is not configured", game);
                }
            }

            if let Some(report) = updater.run_pass(&opts).await {
                ingest::print_report(&report);
                if report.failed() > 0 {
                    bail!("{} source(s) failed", report.failed());
                }
            }
        }
        Commands::Watch { progress } => {
            let interval = Duration::from_secs(cfg.sync.interval_secs);
            let opts = PassOptions::from_config(&cfg.sync);
            let mode = progress.unwrap_or(ProgressMode::Off);
            let updater = Arc::new(
                Updater::from_config(Arc::new(cfg))
                    .await?
                    .with_progress(mode.reporter()),
            );

            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown requested, finishing the current pass");
                    let _ = tx.send(true);
                }
            });

            updater.run_scheduler(opts, interval, rx).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
