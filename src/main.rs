//! # geoharvest CLI
//!
//! Bulk-downloads geotagged photo metadata from the Flickr search API for a
//! bounding box and a span of years, working around the API's per-query
//! result cap.
//!
//! ## Usage
//!
//! ```bash
//! geoharvest --config ./config/geoharvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `geoharvest cells` | Print the grid of cells, no network access |
//! | `geoharvest probe` | Print each cell's full-range record count |
//! | `geoharvest run` | Harvest every cell and write the CSV (or zip) |
//!
//! ## Examples
//!
//! ```bash
//! # How big is this job?
//! geoharvest probe --config ./config/toronto.toml
//!
//! # Harvest with JSON progress on stderr, zipped output
//! FLICKR_API_KEY=... geoharvest run --progress json --zipped
//!
//! # More detail from the window controller
//! RUST_LOG=geoharvest_core=debug geoharvest run
//! ```

use anyhow::bail;
use clap::{Parser, Subcommand};
use geoharvest::config;
use geoharvest::plan;
use geoharvest::progress::ProgressMode;
use geoharvest::run_cmd;
use geoharvest_core::progress::ProgressReporter;
use std::path::PathBuf;
use std::sync::Arc;

/// geoharvest: bulk retrieval of geotagged records from capped search APIs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/geoharvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "geoharvest",
    about = "Bulk retrieval of geotagged records from capped, paginated search APIs",
    version,
    long_about = "geoharvest splits a bounding box into a grid of cells and walks each cell's \
    date range in adaptively sized windows, so that no single query exceeds the API's result cap. \
    Per-cell results are merged, deduplicated, and written as one CSV file."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/geoharvest.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal and
    /// `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest every cell and write the merged result.
    ///
    /// Exits non-zero only when every cell failed; partial cells are
    /// listed in the report.
    Run {
        /// Output directory (overrides `output.dir`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write `{name}.zip` instead of `{name}.csv`.
        #[arg(long)]
        zipped: bool,
    },

    /// Print the full-range record count of every cell.
    ///
    /// One request per cell. Useful for sizing a job before running it.
    Probe,

    /// Print the grid of cells without contacting the API.
    Cells,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Cells => {
            plan::list_cells(&cfg)?;
        }
        Commands::Probe => {
            let api = run_cmd::connect(&cfg)?;
            plan::run_probe(api.as_ref(), &cfg).await?;
        }
        Commands::Run { output, zipped } => {
            let api = run_cmd::connect(&cfg)?;
            let reporter: Arc<dyn ProgressReporter> = Arc::from(mode.reporter());
            let (report, _) =
                run_cmd::run_harvest(&cfg, api, output.as_deref(), zipped, reporter).await?;
            if report.all_failed() {
                bail!("all {} cells failed", report.cells.len());
            }
        }
    }

    Ok(())
}
