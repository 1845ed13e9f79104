use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use timbre_etl::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "timbre", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the checkpoint database (default: ~/.local/share/timbre/checkpoints.db)
    #[arg(long, global = true)]
    checkpoints: Option<PathBuf>,

    /// Use a local music directory (Artist/Album/Track.ext) instead of the bucket
    #[arg(long, global = true)]
    music_dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Embed every catalog track that has no checkpoint yet
    ///
    /// Loads the catalog snapshot, shuffles it, and for each track without a
    /// checkpoint:
    ///
    /// - Resolves the audio object from artist, album and track name
    /// - Decodes it to mono and resamples to the canonical rate
    /// - Computes the embedding and rejects empty, NaN or infinite results
    /// - Writes the checkpoint, then appends an UPDATE statement to the
    ///   output file and flushes it
    ///
    /// Failed tracks are logged and counted; the run continues. Re-running
    /// resumes where the last run stopped. Several workers may share one
    /// checkpoint database.
    Run {
        /// Local catalog JSON file (overrides catalog_key)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// SQL file to append updates to
        #[arg(long)]
        output: Option<PathBuf>,

        /// Seed for the traversal order
        #[arg(long)]
        seed: Option<u64>,

        /// Stop after attempting this many tracks
        #[arg(long)]
        limit: Option<usize>,

        /// Extra attempts for transient object-store failures (listings and reads)
        #[arg(long)]
        retries: Option<usize>,
    },
    /// Write an UPDATE statement for every checkpointed track
    Export {
        /// Target SQL file (truncated; default: output_path)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show checkpoint statistics
    Status,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print a config value, or the whole file when no key is given
    Get { key: Option<String> },
    /// Set a value in the config file
    Set { key: String, value: String },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(path) = cli.checkpoints {
        config.checkpoint_path = path;
    }
    if let Some(dir) = cli.music_dir {
        config.music_dir = Some(dir);
    }

    twyg::setup(config.logging.clone())
        .map_err(|e| anyhow::anyhow!("Failed to set up logging: {e}"))?;

    match cli.command {
        Commands::Run {
            catalog,
            output,
            seed,
            limit,
            retries,
        } => {
            if let Some(path) = catalog {
                config.catalog_path = Some(path);
            }
            if let Some(path) = output {
                config.output_path = path;
            }
            if seed.is_some() {
                config.shuffle_seed = seed;
            }
            if let Some(retries) = retries {
                config.retrieval_retries = retries;
            }
            commands::run_embed(&config, limit)?;
        }
        Commands::Export { output } => {
            let output = output.unwrap_or_else(|| config.output_path.clone());
            commands::run_export(&config, &output)?;
        }
        Commands::Status => {
            commands::show_status(&config)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show_config(&config)?,
            ConfigAction::Get { key } => commands::config::get_config(&config, key)?,
            ConfigAction::Set { key, value } => commands::config::set_config(&key, &value)?,
            ConfigAction::Path => commands::config::show_path()?,
            ConfigAction::Example => commands::config::show_example()?,
            ConfigAction::Init => commands::config::init_config()?,
        },
    }

    Ok(())
}
