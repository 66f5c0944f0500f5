//! Global configuration for the extraction and identification pipeline.
//!
//! A single TOML file with one section per concern, loaded from the
//! platform config directory (or `UNWEB_CONFIG` when set). Every field has
//! a default, so a missing file is a valid configuration.
//!
//! ```toml
//! [fetch]
//! timeout_secs = 30
//!
//! [cache]
//! dir = "/tmp/unweb-cache"
//! disabled = false
//!
//! [matcher]
//! min_similarity = 0.5
//! max_versions = 30
//! version_concurrency = 6
//! package_concurrency = 3
//!
//! [extract]
//! exclude = ["\\.test\\.", "__mocks__/"]
//! ```

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP behavior.
    pub fetch: FetchConfig,
    /// Cache location and switches.
    pub cache: CacheConfig,
    /// Matcher thresholds and concurrency caps.
    pub matcher: MatcherConfig,
    /// Extraction filtering.
    pub extract: ExtractConfig,
}

/// HTTP fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Explicit cache root; platform default when absent.
    pub dir: Option<PathBuf>,
    /// Open the cache in disabled mode.
    pub disabled: bool,
}

/// Matcher settings. Mirrors
/// [`MatchOptions`](crate::matcher::MatchOptions) plus the batch-level
/// package concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Smallest similarity accepted as a match.
    pub min_similarity: f64,
    /// Cap on versions probed per package.
    pub max_versions: usize,
    /// Whether pre-release versions are probed.
    pub include_prereleases: bool,
    /// Versions probed concurrently within one package.
    pub version_concurrency: usize,
    /// Packages searched concurrently.
    pub package_concurrency: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            max_versions: 30,
            include_prereleases: false,
            version_concurrency: 6,
            package_concurrency: 3,
        }
    }
}

/// Extraction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Regex patterns excluding extracted paths (`node_modules` is always
    /// kept regardless).
    pub exclude: Vec<String>,
}

impl Config {
    /// Load configuration from the default location, or defaults when no
    /// file exists.
    ///
    /// `UNWEB_CONFIG` overrides the file path.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Where the config file is looked for.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var("UNWEB_CONFIG") {
            let trimmed = explicit.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        ProjectDirs::from("", "", "unweb").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Build [`MatchOptions`](crate::matcher::MatchOptions) from the
    /// matcher section.
    #[must_use]
    pub fn match_options(&self) -> crate::matcher::MatchOptions {
        crate::matcher::MatchOptions {
            min_similarity: self.matcher.min_similarity,
            max_versions: self.matcher.max_versions,
            include_prereleases: self.matcher.include_prereleases,
            version_hint: None,
            version_concurrency: self.matcher.version_concurrency,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.fetch.timeout_secs, 30);
        assert!(!config.cache.disabled);
        assert_eq!(config.matcher.min_similarity, 0.5);
        assert_eq!(config.matcher.version_concurrency, 6);
        assert_eq!(config.matcher.package_concurrency, 3);
        assert!(config.extract.exclude.is_empty());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[matcher]
min_similarity = 0.7

[extract]
exclude = ["\\.spec\\."]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.matcher.min_similarity, 0.7);
        assert_eq!(config.matcher.max_versions, 30);
        assert_eq!(config.extract.exclude, vec!["\\.spec\\."]);
        assert_eq!(config.fetch.timeout_secs, 30);
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn match_options_mirror_the_matcher_section() {
        let mut config = Config::default();
        config.matcher.min_similarity = 0.8;
        config.matcher.include_prereleases = true;
        let options = config.match_options();
        assert_eq!(options.min_similarity, 0.8);
        assert!(options.include_prereleases);
        assert_eq!(options.version_hint, None);
    }
}
