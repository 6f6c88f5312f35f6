//! Configuration: storage locations and Crossref client tuning.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the record files and the lock file
    pub data_dir: PathBuf,

    /// How many leading pages to scan for DOIs and abstracts
    pub scan_pages: usize,

    /// Crossref client tuning
    pub crossref: CrossrefConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var_os("PAPER_META_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        Self {
            data_dir,
            scan_pages: crate::pdf::DEFAULT_SCAN_PAGES,
            crossref: CrossrefConfig::default(),
        }
    }
}

impl Config {
    /// Configuration rooted at an explicit data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// File locations derived from the data directory.
    pub fn store_paths(&self) -> StorePaths {
        StorePaths::new(&self.data_dir)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Crossref works API settings
#[derive(Debug, Clone)]
pub struct CrossrefConfig {
    /// Works endpoint, without a trailing slash
    pub base_url: String,

    /// Contact address sent in the polite User-Agent header
    pub mailto: String,

    /// Per-attempt network timeout
    pub timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Exponential backoff base, must be > 1
    pub backoff: f64,
}

impl Default for CrossrefConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.crossref.org/works".to_string(),
            mailto: std::env::var("CROSSREF_MAILTO")
                .unwrap_or_else(|_| "nobody@example.com".to_string()),
            timeout: Duration::from_secs(15),
            max_retries: 2,
            backoff: 1.5,
        }
    }
}

/// On-disk locations used by the record store.
#[derive(Debug, Clone)]
pub struct StorePaths {
    /// Canonical JSON snapshot
    pub records_json: PathBuf,
    /// CSV companion rewritten with every persistence cycle
    pub records_csv: PathBuf,
    /// On-demand spreadsheet export target
    pub export_csv: PathBuf,
    /// Advisory lock file guarding cross-process writes
    pub lock_file: PathBuf,
}

impl StorePaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            records_json: data_dir.join("records.json"),
            records_csv: data_dir.join("records.csv"),
            export_csv: data_dir.join("records_export.csv"),
            lock_file: data_dir.join("records.lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_crossref_settings() {
        let config = CrossrefConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff, 1.5);
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert!(config.base_url.ends_with("/works"));
    }

    #[test]
    fn store_paths_share_the_data_dir() {
        let paths = StorePaths::new(Path::new("/tmp/meta"));
        assert_eq!(paths.records_json, Path::new("/tmp/meta/records.json"));
        assert_eq!(paths.lock_file, Path::new("/tmp/meta/records.lock"));
    }
}
