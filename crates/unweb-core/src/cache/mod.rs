//! Namespaced two-tier cache for registry data, fingerprints, and
//! extraction artifacts.
//!
//! Each namespace is an independent typed [`Store`]: callers reach the
//! store they want directly (`cache.fingerprint.get(..)`); there is no
//! dynamic dispatcher in front. All namespaces share one root directory,
//! one clock, and one disabled flag.
//!
//! ## Disk layout
//!
//! ```text
//! <cache_home>/unweb/
//!   metadata/<package>.json
//!   fingerprint/<package>@<version>.json
//!   minified-fingerprint/<package>@<version>.json
//!   match/<package>@<hash>.json
//!   sourcemap/u_<sha256_12>.json
//!   ...one directory per namespace
//! ```
//!
//! Scoped package names are flattened (`@scope/name` → `@scope__name`) and
//! version strings have filesystem-reserved characters replaced so any
//! registry-legal key lands on a single safe filename.

mod store;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::types::{
    CachedAnalysis, CachedDiscovery, CachedExtraction, CachedManifest, CachedPage,
    CachedSourceMap, MatchRecord, PackageMetadata, VersionFingerprint,
};
use crate::{Error, Result};

pub use store::{NowFn, Store, system_now_ms};

/// Default TTL for most namespaces: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// TTL for registry existence and version validation: 30 days. Package
/// existence almost never flips; the long TTL keeps negative probes cheap.
pub const REGISTRY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Every namespace directory, in creation order.
const NAMESPACES: &[&str] = &[
    "metadata",
    "fingerprint",
    "minified-fingerprint",
    "match",
    "sourcemap",
    "extraction",
    "page",
    "discovery",
    "analysis",
    "manifest",
    "file-list",
    "registry-existence",
    "registry-version",
];

/// Aggregate cache statistics for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries in the `metadata` namespace.
    pub metadata_entries: usize,
    /// Entries across both fingerprint namespaces.
    pub fingerprint_entries: usize,
    /// Total bytes on disk under the cache root.
    pub total_bytes: u64,
}

/// The namespaced cache. See the module docs for layout and semantics.
pub struct Cache {
    root: PathBuf,
    disabled: bool,
    /// Registry package metadata, keyed by package name.
    pub metadata: Store<PackageMetadata>,
    /// Clean entry-file fingerprints, keyed by `(name, version)`.
    pub fingerprint: Store<VersionFingerprint>,
    /// Minified entry-file fingerprints, keyed by `(name, version)`.
    pub minified_fingerprint: Store<VersionFingerprint>,
    /// Match results (positive and negative), keyed by `(name, hash)`.
    pub matches: Store<MatchRecord>,
    /// Raw source-map payloads, keyed by hashed URL.
    pub sourcemap: Store<CachedSourceMap>,
    /// Extraction outcomes, keyed by hashed source-map URL.
    pub extraction: Store<CachedExtraction>,
    /// Page crawls, keyed by hashed page URL.
    pub page: Store<CachedPage>,
    /// Discovery outcomes, keyed by hashed bundle URL.
    pub discovery: Store<CachedDiscovery>,
    /// Dependency analysis, keyed by extraction hash.
    pub analysis: Store<CachedAnalysis>,
    /// Generated manifests, keyed by `(url, extraction, options)` hashes.
    pub manifest: Store<CachedManifest>,
    /// Package file listings, keyed by `(name, version)`.
    pub file_list: Store<Vec<String>>,
    /// Registry existence checks, keyed by package name.
    pub registry_existence: Store<bool>,
    /// Registry version checks, keyed by `(name, version)`.
    pub registry_version: Store<bool>,
}

impl Cache {
    /// Open the cache at the platform default location.
    ///
    /// Honors `UNWEB_CACHE_DIR` as an explicit override and `UNWEB_NO_CACHE`
    /// (any non-empty value) to open in disabled mode.
    pub fn open() -> Result<Self> {
        if std::env::var("UNWEB_NO_CACHE").is_ok_and(|v| !v.is_empty()) {
            return Ok(Self::disabled());
        }
        let root = if let Ok(dir) = std::env::var("UNWEB_CACHE_DIR") {
            PathBuf::from(dir)
        } else {
            let dirs = ProjectDirs::from("", "", "unweb")
                .ok_or_else(|| Error::Storage("failed to determine cache directory".into()))?;
            dirs.cache_dir().to_path_buf()
        };
        Self::with_root(root)
    }

    /// Open the cache rooted at an explicit directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Self::init_dirs(&root)?;
        Ok(Self::build(root, false, Arc::new(system_now_ms)))
    }

    /// A cache that never reads or writes: every get is a miss, every set
    /// is a no-op. Used by `--no-cache` and by tests that need determinism.
    #[must_use]
    pub fn disabled() -> Self {
        Self::build(PathBuf::new(), true, Arc::new(system_now_ms))
    }

    /// Open with an injected clock. Intended for TTL tests.
    #[doc(hidden)]
    pub fn with_root_and_clock(root: impl Into<PathBuf>, now: NowFn) -> Result<Self> {
        let root = root.into();
        Self::init_dirs(&root)?;
        Ok(Self::build(root, false, now))
    }

    fn build(root: PathBuf, disabled: bool, now: NowFn) -> Self {
        let default_ttl = ttl_ms(DEFAULT_TTL);
        let registry_ttl = ttl_ms(REGISTRY_TTL);
        macro_rules! make {
            ($name:literal, $ttl:expr) => {
                Store::new($name, root.join($name), $ttl, disabled, Arc::clone(&now))
            };
        }

        Self {
            metadata: make!("metadata", default_ttl),
            fingerprint: make!("fingerprint", default_ttl),
            minified_fingerprint: make!("minified-fingerprint", default_ttl),
            matches: make!("match", default_ttl),
            sourcemap: make!("sourcemap", default_ttl),
            extraction: make!("extraction", default_ttl),
            page: make!("page", default_ttl),
            discovery: make!("discovery", default_ttl),
            analysis: make!("analysis", default_ttl),
            manifest: make!("manifest", default_ttl),
            file_list: make!("file-list", default_ttl),
            registry_existence: make!("registry-existence", registry_ttl),
            registry_version: make!("registry-version", registry_ttl),
            root,
            disabled,
        }
    }

    /// Create every namespace directory. Idempotent.
    fn init_dirs(root: &Path) -> Result<()> {
        for namespace in NAMESPACES {
            std::fs::create_dir_all(root.join(namespace)).map_err(|e| {
                Error::Storage(format!("failed to create cache namespace {namespace}: {e}"))
            })?;
        }
        Ok(())
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this cache is in disabled mode.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Remove everything and re-initialize the namespace directories.
    pub fn clear(&self) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        self.metadata.clear_memory();
        self.fingerprint.clear_memory();
        self.minified_fingerprint.clear_memory();
        self.matches.clear_memory();
        self.sourcemap.clear_memory();
        self.extraction.clear_memory();
        self.page.clear_memory();
        self.discovery.clear_memory();
        self.analysis.clear_memory();
        self.manifest.clear_memory();
        self.file_list.clear_memory();
        self.registry_existence.clear_memory();
        self.registry_version.clear_memory();
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)
                .map_err(|e| Error::Storage(format!("failed to clear cache: {e}")))?;
        }
        Self::init_dirs(&self.root)?;
        info!(root = %self.root.display(), "cache cleared");
        Ok(())
    }

    /// Entry counts and total on-disk size, for reporting only.
    pub async fn stats(&self) -> CacheStats {
        if self.disabled {
            return CacheStats::default();
        }
        CacheStats {
            metadata_entries: self.metadata.disk_entries().await,
            fingerprint_entries: self.fingerprint.disk_entries().await
                + self.minified_fingerprint.disk_entries().await,
            total_bytes: dir_size(&self.root).await,
        }
    }
}

const fn ttl_ms(ttl: Duration) -> u64 {
    ttl.as_millis() as u64
}

/// Total size of a directory tree in bytes.
async fn dir_size(root: &Path) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}

/// Flatten a package name or version into a single safe filename segment.
///
/// `@scope/name` becomes `@scope__name`; filesystem-reserved characters in
/// versions (`/ \ : * ? " < > |`) become `_`.
#[must_use]
pub fn sanitize_key(raw: &str) -> String {
    let flattened = if raw.starts_with('@') {
        raw.replacen('/', "__", 1)
    } else {
        raw.to_string()
    };
    flattened
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Key for `(package, version)`-shaped namespaces.
#[must_use]
pub fn pair_key(name: &str, version: &str) -> String {
    format!("{}@{}", sanitize_key(name), sanitize_key(version))
}

/// Stable key for URL-shaped namespaces: `u_` + first 12 hex chars of the
/// URL's SHA-256. The same URL always lands on the same file.
#[must_use]
pub fn url_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(6).fold(String::from("u_"), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    #[test]
    fn sanitizes_scoped_names() {
        assert_eq!(sanitize_key("@babel/core"), "@babel__core");
        assert_eq!(sanitize_key("lodash"), "lodash");
        assert_eq!(sanitize_key("1.0.0-beta/2"), "1.0.0-beta_2");
        assert_eq!(sanitize_key("we?ird:ver*sion"), "we_ird_ver_sion");
    }

    #[test]
    fn pair_keys_are_stable() {
        assert_eq!(pair_key("@scope/pkg", "1.2.3"), "@scope__pkg@1.2.3");
    }

    #[test]
    fn url_keys_are_deterministic_and_distinct() {
        let a = url_key("https://example.com/a.js");
        let b = url_key("https://example.com/b.js");
        assert_eq!(a, url_key("https://example.com/a.js"));
        assert_ne!(a, b);
        assert!(a.starts_with("u_"));
        assert_eq!(a.len(), 14);
    }

    #[test]
    fn init_creates_all_namespaces_idempotently() {
        let dir = TempDir::new().unwrap();
        let _cache = Cache::with_root(dir.path()).unwrap();
        for namespace in NAMESPACES {
            assert!(dir.path().join(namespace).is_dir(), "missing {namespace}");
        }
        // A second open over the same root succeeds.
        let _again = Cache::with_root(dir.path()).unwrap();
    }

    #[tokio::test]
    async fn clear_removes_and_reinitializes() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        cache.registry_existence.set("react", &true).await;
        assert_eq!(cache.registry_existence.get("react").await, Some(true));

        cache.clear().unwrap();
        assert_eq!(cache.registry_existence.get("react").await, None);
        for namespace in NAMESPACES {
            assert!(dir.path().join(namespace).is_dir());
        }
    }

    #[tokio::test]
    async fn disabled_cache_misses_everything() {
        let cache = Cache::disabled();
        assert!(cache.is_disabled());
        cache.registry_existence.set("react", &true).await;
        assert_eq!(cache.registry_existence.get("react").await, None);
        assert_eq!(cache.stats().await, CacheStats::default());
        cache.clear().unwrap();
    }

    #[tokio::test]
    async fn registry_namespaces_use_long_ttl() {
        let dir = TempDir::new().unwrap();
        let tick = Arc::new(AtomicU64::new(0));
        let clock = Arc::clone(&tick);
        let cache = Cache::with_root_and_clock(
            dir.path(),
            Arc::new(move || clock.load(Ordering::SeqCst)),
        )
        .unwrap();

        cache.registry_existence.set("react", &true).await;
        cache.matches
            .set("react@h", &crate::types::MatchRecord::no_match("react", 0.1))
            .await;

        // 8 days: default-TTL namespaces expire, registry ones survive.
        tick.store(8 * 24 * 60 * 60 * 1000, Ordering::SeqCst);
        assert_eq!(cache.matches.get("react@h").await, None);
        assert_eq!(cache.registry_existence.get("react").await, Some(true));
    }

    #[tokio::test]
    async fn stats_report_counts_and_bytes() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();

        cache
            .metadata
            .set("react", &PackageMetadata { name: "react".into(), ..Default::default() })
            .await;
        let fp = VersionFingerprint {
            fingerprint: crate::types::Fingerprint {
                content_hash: "a".into(),
                normalized_hash: "b".into(),
                signature: String::new(),
                content_length: 3,
                minified: false,
            },
            entry_path: "index.js".into(),
        };
        cache.fingerprint.set(&pair_key("react", "18.0.0"), &fp).await;
        cache.minified_fingerprint.set(&pair_key("react", "18.0.0"), &fp).await;

        let stats = cache.stats().await;
        assert_eq!(stats.metadata_entries, 1);
        assert_eq!(stats.fingerprint_entries, 2);
        assert!(stats.total_bytes > 0);
    }
}
