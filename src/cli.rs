use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::credentials::CredentialValues;
use crate::supervisor::RetryPolicy;

#[derive(Parser)]
#[command(
    name = "fetcher",
    about = "Stream events matching tracked terms and append them to a JSONL file",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to ./fetcher.log unless log_file is set in fetcher.yaml"
)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true, help = "Path to fetcher.yaml config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect and append matching events until stopped
    Fetch {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file (JSON, one record per line)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after the first session instead of reconnecting
        #[arg(long, conflicts_with = "retry")]
        no_retry: bool,

        /// When to reconnect after a session ends
        #[arg(long, value_enum)]
        retry: Option<RetryPolicy>,

        /// Accepted language code (repeatable); defaults to the configured list
        #[arg(short, long = "language", value_name = "CODE")]
        languages: Vec<String>,

        /// Accept events in any language
        #[arg(long, conflicts_with = "languages")]
        any_language: bool,

        /// End the session on any provider error or warning
        #[arg(long)]
        disconnect_on_failure: bool,
    },

    /// Validate credentials, terms and configuration without connecting
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// JSON credentials file
    #[arg(short, long)]
    pub credentials_file: Option<PathBuf>,

    #[arg(long)]
    pub consumer_key: Option<String>,

    #[arg(long)]
    pub consumer_secret: Option<String>,

    #[arg(long)]
    pub access_token: Option<String>,

    #[arg(long)]
    pub access_secret: Option<String>,

    /// Write discrete credential values to twitter_credentials.json
    #[arg(long, conflicts_with = "credentials_file")]
    pub save_credentials: bool,

    /// File with one tracked term per line
    #[arg(short = 'f', long)]
    pub hashtags_file: PathBuf,
}

impl SourceArgs {
    pub fn credential_values(&self) -> CredentialValues {
        CredentialValues {
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone(),
            access_token: self.access_token.clone(),
            access_secret: self.access_secret.clone(),
        }
    }
}
