//! Provider credentials
//!
//! Credentials come from a JSON file with the keys `CONSUMER_KEY`,
//! `CONSUMER_SECRET`, `ACCESS_TOKEN` and `ACCESS_SECRET`, or from discrete
//! command-line values. All four must be present before any connection is
//! attempted.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CREDENTIALS_FILE: &str = "twitter_credentials.json";

const REQUIRED_FIELDS: &[&str] = &["CONSUMER_KEY", "CONSUMER_SECRET", "ACCESS_TOKEN", "ACCESS_SECRET"];

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(rename = "CONSUMER_KEY")]
    pub consumer_key: String,
    #[serde(rename = "CONSUMER_SECRET")]
    pub consumer_secret: String,
    #[serde(rename = "ACCESS_TOKEN")]
    pub access_token: String,
    #[serde(rename = "ACCESS_SECRET")]
    pub access_secret: String,
}

// Secrets stay out of debug logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &mask(&self.consumer_key))
            .field("consumer_secret", &"***")
            .field("access_token", &mask(&self.access_token))
            .field("access_secret", &"***")
            .finish()
    }
}

/// Discrete credential values, any of which may be missing
#[derive(Debug, Clone, Default)]
pub struct CredentialValues {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_secret: Option<String>,
}

impl CredentialValues {
    fn is_empty(&self) -> bool {
        self.consumer_key.is_none()
            && self.consumer_secret.is_none()
            && self.access_token.is_none()
            && self.access_secret.is_none()
    }

    fn into_credentials(self) -> Result<Credentials> {
        let mut missing = Vec::new();
        let mut take = |value: Option<String>, name: &'static str| {
            let value = value.unwrap_or_default().trim().to_string();
            if value.is_empty() {
                missing.push(name);
            }
            value
        };

        let credentials = Credentials {
            consumer_key: take(self.consumer_key, "consumer key"),
            consumer_secret: take(self.consumer_secret, "consumer secret"),
            access_token: take(self.access_token, "access token"),
            access_secret: take(self.access_secret, "access secret"),
        };

        if !missing.is_empty() {
            eyre::bail!("Incomplete credentials, missing: {}", missing.join(", "));
        }
        Ok(credentials)
    }
}

impl Credentials {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
        let value: serde_json::Value =
            serde_json::from_str(&content).context("Failed to parse credentials file as JSON")?;

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|key| value.get(key).and_then(|v| v.as_str()).is_none_or(|v| v.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            eyre::bail!(
                "Incomplete credentials in {}, missing: {} (required: {})",
                path.display(),
                missing.join(", "),
                REQUIRED_FIELDS.join(", ")
            );
        }

        let credentials: Self = serde_json::from_value(value).context("Failed to read credential fields")?;
        log::info!("Loaded credentials from {}", path.display());
        Ok(credentials)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize credentials")?;
        fs::write(path, json).with_context(|| format!("Failed to write credentials file: {}", path.display()))?;
        log::info!("Saved credentials to {}", path.display());
        Ok(())
    }

    /// Resolve credentials in order: explicit file, discrete values, default file
    ///
    /// With `save`, discrete values are also written to `default_file` so later
    /// runs can omit them.
    pub fn resolve(
        file: Option<&Path>,
        values: CredentialValues,
        default_file: &Path,
        save: bool,
    ) -> Result<Self> {
        if let Some(path) = file {
            return Self::load_from_file(path);
        }

        if !values.is_empty() {
            let credentials = values.into_credentials()?;
            if save {
                credentials.save(default_file)?;
            }
            return Ok(credentials);
        }

        if default_file.exists() {
            return Self::load_from_file(default_file);
        }

        eyre::bail!(
            "No credentials: pass --credentials-file, all four --consumer-key/--consumer-secret/--access-token/--access-secret values, or create {}",
            default_file.display()
        )
    }

    pub fn default_file() -> PathBuf {
        PathBuf::from(DEFAULT_CREDENTIALS_FILE)
    }
}

fn mask(s: &str) -> String {
    let visible: String = s.chars().take(4).collect();
    format!("{}***", visible)
}
