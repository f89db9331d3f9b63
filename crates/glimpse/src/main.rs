//! Glimpse CLI - index a photo library and search it.
//!
//! Glimpse scans folders into a SQLite catalog, generates thumbnails in
//! several sizes with content and perceptual hashes, and answers searches
//! over keywords, folders, dates and visual similarity.
//!
//! # Usage
//!
//! ```bash
//! # Index a folder
//! glimpse index ~/Pictures
//!
//! # Search, printing a JSON page of results
//! glimpse search beach --from 2021-06-01 --page-size 20
//!
//! # Near-duplicates of image 42
//! glimpse search --similar-to 42 --threshold 0.9
//!
//! # Export a watermarked download copy
//! glimpse export 42 --output beach.jpg --max-size 1600 --watermark "(c) me"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Glimpse - photo library indexing: thumbnails, duplicate hashes and search.
#[derive(Parser, Debug)]
#[command(name = "glimpse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, env = "GLIMPSE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a folder and generate thumbnails and hashes
    Index(cli::index::IndexArgs),

    /// Search the catalog and print a page of results as JSON
    Search(cli::search::SearchArgs),

    /// Write a resized/watermarked copy or a crop of an indexed image
    Export(cli::export::ExportArgs),

    /// Show image backends and the external tool status
    Tools,

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // logging isn't up yet, so config warnings go straight to stderr
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `glimpse config path`."
            );
            glimpse_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Glimpse v{}", glimpse_core::VERSION);

    match cli.command {
        Commands::Index(args) => cli::index::execute(args, config).await,
        Commands::Search(args) => cli::search::execute(args, config).await,
        Commands::Export(args) => cli::export::execute(args, config).await,
        Commands::Tools => cli::tools::execute(config).await,
        Commands::Config(args) => cli::config::execute(args, cli.config).await,
    }
}
