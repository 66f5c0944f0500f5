//! Command-line interface definition for `unweb`.
//!
//! Three subcommands cover the pipeline's local surface:
//!
//! ```bash
//! # Pull a bundle's sources back out of its source map
//! unweb extract https://app.example.com/static/js/main.js -o ./recovered
//!
//! # Identify the npm package version behind an extracted directory
//! unweb identify ./recovered/js/main/node_modules/lodash --package lodash
//!
//! # Cache maintenance
//! unweb cache stats
//! unweb cache clear
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reconstruct buildable sources from deployed websites.
#[derive(Debug, Parser)]
#[command(name = "unweb", version, about, max_term_width = 100)]
pub struct Cli {
    /// Enable verbose logging (repeat for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable the cache for this invocation.
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a bundle, discover its source map, and extract sources.
    Extract {
        /// Absolute URL of the deployed bundle (JS or CSS).
        url: String,

        /// Output directory for reconstructed sources.
        #[arg(short, long, default_value = "./extracted")]
        output: PathBuf,

        /// Regex patterns excluding extracted paths (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Mirror the raw bundle under `_bundles/` when no map is found.
        #[arg(long, default_value_t = true)]
        save_raw: bool,
    },

    /// Identify the npm package version behind an extracted directory.
    Identify {
        /// Directory containing one extracted package's files.
        dir: PathBuf,

        /// Package name; defaults to the directory basename.
        #[arg(short, long)]
        package: Option<String>,

        /// A version or range seen near the bundle, to center the search.
        #[arg(long)]
        hint: Option<String>,

        /// Minimum similarity accepted as a match.
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Probe pre-release versions too.
        #[arg(long)]
        prereleases: bool,

        /// Emit the match record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the on-disk cache.
    Cache {
        /// Maintenance action.
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Cache maintenance actions.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Print entry counts and total size.
    Stats,
    /// Remove every cached entry and reinitialize.
    Clear,
}
