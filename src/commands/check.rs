//! Validate startup inputs without opening a connection

use colored::*;
use eyre::Result;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::cli::SourceArgs;
use crate::commands::Inputs;
use crate::config::Config;
use crate::filter::LanguageFilter;

pub fn run(source: &SourceArgs, config: &Config) -> Result<()> {
    println!("{}", "Fetcher check".bold());
    println!("{}", "═".repeat(50));
    println!();

    let inputs = match Inputs::load(source) {
        Ok(inputs) => inputs,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return Err(e);
        }
    };

    println!("{} Credentials: {:?}", "✓".green(), inputs.credentials);
    println!("{} Tracked terms: {}", "✓".green(), inputs.terms.len());
    for term in inputs.terms.iter() {
        println!("    {}", term.dimmed());
    }

    let filter = LanguageFilter::from_list(config.languages.as_deref());
    if filter.rejects_everything() {
        println!("{} Languages: empty allow-list, every event would be dropped", "⚠".yellow());
    } else {
        println!("{} Languages: {}", "✓".green(), filter.describe());
    }

    let output = Config::expand_path(&config.output.path);
    match count_records(&output) {
        Ok(count) => println!(
            "{} Output: {} ({} existing records, will append)",
            "✓".green(),
            output.display(),
            count
        ),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            println!("{} Output: {} (will be created)", "✓".green(), output.display())
        }
        Err(e) => println!("{} Output: {} is not readable: {}", "⚠".yellow(), output.display(), e),
    }

    println!();
    println!("{}", "Stream:".bold());
    println!("  Endpoint:        {}", config.stream.endpoint);
    println!("  Idle timeout:    {}s", config.stream.idle_timeout().as_secs());
    println!("  Retry policy:    {:?}", config.retry.policy);
    println!(
        "  Max attempts:    {}",
        config
            .retry
            .max_attempts
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
    );
    println!("  Disconnect on failure: {}", config.stream.disconnect_on_failure);

    Ok(())
}

/// Count non-blank lines without loading the file
fn count_records(path: &Path) -> io::Result<usize> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    let mut count = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(count);
        }
        if !line.trim_ascii().is_empty() {
            count += 1;
        }
    }
}
