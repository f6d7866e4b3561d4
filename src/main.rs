use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::Write;
use std::path::Path;

mod cli;
mod commands;
mod config;
mod credentials;
mod failure;
mod filter;
mod record;
mod session;
mod signal;
mod sink;
mod stream;
mod supervisor;
mod terms;

use cli::{Cli, Commands};
use commands::fetch::FetchOptions;
use config::{Config, LogLevel};

fn setup_logging(log_file: &Path, log_level: LogLevel, verbose: bool) -> Result<()> {
    if let Some(parent) = log_file.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    // Each run starts a fresh log
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();

    // RUST_LOG env var takes precedence, then --verbose, then config log_level
    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else {
        builder.filter_level(log_level.to_level_filter());
    }

    builder
        .format(|buf, record| {
            if let Some(line) = console_line(record) {
                eprintln!("{}", line);
            }
            writeln!(
                buf,
                "{} {:<12} {:<8} {}",
                chrono::Local::now().format("%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    info!(
        "Log level: {} (from {})",
        if verbose { "debug" } else { log_level.as_filter() },
        if std::env::var("RUST_LOG").is_ok() {
            "RUST_LOG env"
        } else if verbose {
            "--verbose"
        } else {
            "config"
        }
    );
    Ok(())
}

/// Warnings and errors also go to the terminal while a run is live
fn console_line(record: &log::Record) -> Option<String> {
    match record.level() {
        log::Level::Error => Some(format!("{} {}", "✗".red(), record.args())),
        log::Level::Warn => Some(format!("{} {}", "⚠".yellow(), record.args())),
        _ => None,
    }
}

fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Fetch {
            source,
            output,
            no_retry,
            retry,
            languages,
            any_language,
            disconnect_on_failure,
        } => {
            let options = FetchOptions {
                output,
                no_retry,
                retry,
                languages,
                any_language,
                disconnect_on_failure,
            };
            commands::fetch::run(&source, options, &config)
        }
        Commands::Check { source } => commands::check::run(&source, &config),
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        return commands::completions::run(shell);
    }

    // Load configuration (before logging, so log messages in Config::load are silent)
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&Config::expand_path(&config.log_file), config.log_level, cli.verbose)
        .context("Failed to setup logging")?;

    info!("Starting fetcher {} with config from: {:?}", env!("GIT_DESCRIBE"), cli.config);

    run(cli, config).context("Command failed")?;

    Ok(())
}
