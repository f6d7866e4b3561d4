//! Run the ingestion loop until a terminal failure or Ctrl-C

use colored::*;
use eyre::Result;
use std::path::PathBuf;

use crate::cli::SourceArgs;
use crate::commands::Inputs;
use crate::config::Config;
use crate::failure::SessionFailure;
use crate::filter::LanguageFilter;
use crate::session::SessionSettings;
use crate::signal::StopSignal;
use crate::sink::JsonlSink;
use crate::stream::HttpProvider;
use crate::supervisor::{RetryPolicy, RunReport, Supervisor};

/// Command-line overrides for a fetch run
#[derive(Debug, Default)]
pub struct FetchOptions {
    pub output: Option<PathBuf>,
    pub no_retry: bool,
    pub retry: Option<RetryPolicy>,
    pub languages: Vec<String>,
    pub any_language: bool,
    pub disconnect_on_failure: bool,
}

pub fn run(source: &SourceArgs, options: FetchOptions, config: &Config) -> Result<()> {
    let inputs = Inputs::load(source)?;
    let config = apply_overrides(config.clone(), &options);

    let filter = LanguageFilter::from_list(config.languages.as_deref());
    if filter.rejects_everything() {
        log::warn!("Language allow-list is empty; every event will be dropped");
        eprintln!("{} Language allow-list is empty; every event will be dropped", "⚠".yellow());
    }

    let output = Config::expand_path(&config.output.path);
    let sink = JsonlSink::open(&output, config.output.sync)?;

    let stop = StopSignal::new();
    stop.install_ctrlc()?;

    eprintln!(
        "{} Tracking {} terms (languages: {}), appending to {}",
        "▶".green(),
        inputs.terms.len(),
        filter.describe().cyan(),
        output.display()
    );

    let provider = HttpProvider::new(inputs.credentials, &config.stream);
    let mut supervisor = Supervisor::new(
        provider,
        sink,
        inputs.terms,
        filter,
        SessionSettings::from_config(&config),
        config.retry.clone(),
        stop,
    );

    let report = supervisor.run();
    print_summary(&report);

    let sink = supervisor.into_sink();
    log::info!("{} records appended to {} this run", sink.written(), sink.destination());

    if report.reason.is_error() {
        eyre::bail!("{}", report.reason);
    }
    Ok(())
}

fn apply_overrides(mut config: Config, options: &FetchOptions) -> Config {
    if options.no_retry {
        config.retry.policy = RetryPolicy::Never;
    } else if let Some(policy) = options.retry {
        config.retry.policy = policy;
    }

    if options.any_language {
        config.languages = None;
    } else if !options.languages.is_empty() {
        config.languages = Some(options.languages.clone());
    }

    if options.disconnect_on_failure {
        config.stream.disconnect_on_failure = true;
    }
    if let Some(ref output) = options.output {
        config.output.path = output.clone();
    }
    config
}

fn print_summary(report: &RunReport) {
    let marker = if report.reason.is_error() { "✗".red() } else { "■".yellow() };
    eprintln!(
        "{} {} session(s), {} events saved ({} filtered, {} malformed): {}",
        marker,
        report.sessions,
        report.counts.accepted.to_string().bold(),
        report.counts.filtered,
        report.counts.malformed,
        report.reason
    );

    if let Some(failure) = report.reason.failure()
        && matches!(failure, SessionFailure::Authentication { .. })
    {
        eprintln!("  Check the credentials, or run {} to validate them", "fetcher check".cyan());
    }
}
