use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::supervisor::RetryPolicy;

/// Main fetcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    /// Language allow-list; `null` accepts any language
    pub languages: Option<Vec<String>>,
    pub retry: RetryConfig,
    pub output: OutputConfig,
    pub log_level: LogLevel,
    pub log_file: PathBuf,
    /// Log progress every N accepted events
    pub progress_every: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Filtered stream endpoint
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    /// Drop the connection when nothing (not even a keep-alive) arrives for this long
    pub idle_timeout_secs: u64,
    /// End the session on any provider error or warning
    pub disconnect_on_failure: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub policy: RetryPolicy,
    /// First reconnect delay after a dropped connection
    pub initial_delay_ms: u64,
    /// First reconnect delay after being rate limited
    pub rate_limit_delay_secs: u64,
    pub max_delay_secs: u64,
    pub multiplier: f64,
    pub jitter: bool,
    /// A session streaming at least this long resets the backoff
    pub min_healthy_secs: u64,
    /// Give up after this many consecutive failed sessions (unlimited if unset)
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// fsync after every record
    pub sync: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            languages: Some(vec!["en".to_string()]),
            retry: RetryConfig::default(),
            output: OutputConfig::default(),
            log_level: LogLevel::Info,
            log_file: PathBuf::from("fetcher.log"),
            progress_every: 100,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://stream.twitter.com/1.1/statuses/filter.json".to_string(),
            connect_timeout_secs: 30,
            idle_timeout_secs: 90,
            disconnect_on_failure: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::Recoverable,
            initial_delay_ms: 1000,
            rate_limit_delay_secs: 60,
            max_delay_secs: 320,
            multiplier: 2.0,
            jitter: true,
            min_healthy_secs: 60,
            max_attempts: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fetched.csv"),
            sync: false,
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn min_healthy(&self) -> Duration {
        Duration::from_secs(self.min_healthy_secs)
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("FETCHER_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from FETCHER_CONFIG: {}", e);
                    }
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("fetcher").join("fetcher.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        let local_config = PathBuf::from("fetcher.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.languages, Some(vec!["en".to_string()]));
        assert_eq!(config.output.path, PathBuf::from("fetched.csv"));
        assert_eq!(config.progress_every, 100);
        assert_eq!(config.retry.policy, RetryPolicy::Recoverable);
        assert!(!config.stream.disconnect_on_failure);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
languages: [en, de]
retry:
  policy: never
  max_attempts: 5
stream:
  idle_timeout_secs: 30
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.languages, Some(vec!["en".to_string(), "de".to_string()]));
        assert_eq!(config.retry.policy, RetryPolicy::Never);
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.stream.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.stream.endpoint, StreamConfig::default().endpoint);
    }

    #[test]
    fn test_null_languages_means_any() {
        let config: Config = serde_yaml::from_str("languages: null\n").unwrap();
        assert_eq!(config.languages, None);
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let stream = StreamConfig {
            connect_timeout_secs: 0,
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(stream.connect_timeout(), Duration::from_secs(1));
        assert_eq!(stream.idle_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fetcher.yaml");
        fs::write(&path, "log_level: debug\noutput:\n  path: out.jsonl\n  sync: true\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.output.path, PathBuf::from("out.jsonl"));
        assert!(config.output.sync);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yaml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_expand_path_no_expansion() {
        let path = PathBuf::from("/var/data/fetched.csv");
        assert_eq!(Config::expand_path(&path), path);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path(&PathBuf::from("~/fetched.csv"));
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.to_string_lossy().ends_with("fetched.csv"));
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LogLevel::Debug.as_filter(), "debug");
        assert_eq!(LogLevel::Warn.to_level_filter(), log::LevelFilter::Warn);
    }
}
