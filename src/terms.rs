//! Tracked terms file loading

use eyre::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// The immutable set of terms a run subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTerms {
    terms: BTreeSet<String>,
}

impl TrackedTerms {
    /// Read one term per line; surrounding whitespace is trimmed, blank lines
    /// and duplicates are dropped
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read terms file: {}", path.display()))?;

        let terms = Self::from_lines(content.lines());
        if terms.is_empty() {
            eyre::bail!("Terms file contains no terms: {}", path.display());
        }

        log::info!("Loaded {} tracked terms from {}", terms.len(), path.display());
        Ok(terms)
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = lines
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        Self { terms }
    }

    /// Comma-separated form used as the `track` subscription parameter
    pub fn track_param(&self) -> String {
        self.terms.iter().cloned().collect::<Vec<_>>().join(",")
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_lines_trims_and_dedupes() {
        let terms = TrackedTerms::from_lines(["rustlang", "  golang ", "", "rustlang", "\t"]);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms.iter().collect::<Vec<_>>(), vec!["golang", "rustlang"]);
        assert_eq!(terms.track_param(), "golang,rustlang");
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hashtags.txt");
        fs::write(&path, "#rustlang\n#golang\r\n\n#rustlang\n").unwrap();

        let terms = TrackedTerms::load(&path).unwrap();
        assert_eq!(terms.track_param(), "#golang,#rustlang");
    }

    #[test]
    fn test_load_empty_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.txt");
        fs::write(&path, "\n  \n").unwrap();

        assert!(TrackedTerms::load(&path).is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let result = TrackedTerms::load(&temp.path().join("missing.txt"));
        assert!(result.is_err());
    }
}
