//! CLI wiring for `unweb`: argument parsing, logging setup, and command
//! dispatch. All real work lives in `unweb-core`.

mod cli;
pub mod commands;
pub mod syntax;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use unweb_core::{Cache, Config};

use cli::{CacheAction, Cli, Command};

/// Parse arguments and run the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    let cache = open_cache(&cli, &config)?;

    match cli.command {
        Command::Extract {
            url,
            output,
            exclude,
            save_raw,
        } => {
            let mut patterns = config.extract.exclude.clone();
            patterns.extend(exclude);
            commands::extract::run(&url, &output, &patterns, save_raw, &cache).await
        },
        Command::Identify {
            dir,
            package,
            hint,
            min_similarity,
            prereleases,
            json,
        } => {
            commands::identify::run(
                commands::identify::IdentifyArgs {
                    dir: &dir,
                    package: package.as_deref(),
                    hint: hint.as_deref(),
                    min_similarity,
                    prereleases,
                    json,
                },
                &config,
                &cache,
            )
            .await
        },
        Command::Cache { action } => match action {
            CacheAction::Stats => commands::cache::stats(&cache).await,
            CacheAction::Clear => commands::cache::clear(&cache),
        },
    }
}

fn open_cache(cli: &Cli, config: &Config) -> Result<Cache> {
    if cli.no_cache || config.cache.disabled {
        return Ok(Cache::disabled());
    }
    let cache = match &config.cache.dir {
        Some(dir) => Cache::with_root(dir.clone())?,
        None => Cache::open()?,
    };
    Ok(cache)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("unweb={default},unweb_core={default}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
