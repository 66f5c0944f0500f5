//! Batched package identification across many extracted packages.
//!
//! Two stages: all registry metadata is prefetched in parallel (so the
//! per-package searches run against a warm cache), then packages are
//! matched in small batches. Progress is a structured event stream fed to
//! an optional observer; observers may drop events, so nothing here
//! depends on them being seen.

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::fingerprint::FingerprintEngine;
use crate::matcher::{ExtractedPackage, MatchOptions, VersionMatcher};
use crate::registry::RegistryClient;
use crate::types::MatchRecord;

/// Parallelism for the metadata prefetch stage.
pub const METADATA_PREFETCH_CONCURRENCY: usize = 10;

/// Default number of packages searched concurrently.
pub const DEFAULT_PACKAGE_CONCURRENCY: usize = 3;

/// Progress notifications emitted during a batch search.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Metadata prefetch is starting for this many packages.
    PrefetchStarted {
        /// Number of distinct packages.
        packages: usize,
    },
    /// One package's metadata prefetch finished.
    PrefetchFinished {
        /// Package name.
        package: String,
        /// Whether the registry knows the package.
        found: bool,
    },
    /// A package search is starting.
    PackageStarted {
        /// Package name.
        package: String,
    },
    /// A package search finished.
    PackageFinished {
        /// Package name.
        package: String,
        /// Matched version, if any.
        version: Option<String>,
        /// Best similarity observed.
        similarity: f64,
    },
    /// The whole batch finished.
    BatchFinished {
        /// Packages that matched a version.
        matched: usize,
        /// Total packages searched.
        total: usize,
    },
}

/// Consumer of [`ProgressEvent`]s. Implementations must be cheap; they run
/// inline with the search.
pub trait ProgressObserver: Send + Sync {
    /// Called for every event, in order.
    fn on_event(&self, event: &ProgressEvent);
}

impl<F: Fn(&ProgressEvent) + Send + Sync> ProgressObserver for F {
    fn on_event(&self, event: &ProgressEvent) {
        self(event);
    }
}

/// Options for a batch search.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Packages searched concurrently.
    pub package_concurrency: usize,
    /// Per-package match options (version concurrency lives here).
    pub match_options: MatchOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            package_concurrency: DEFAULT_PACKAGE_CONCURRENCY,
            match_options: MatchOptions::default(),
        }
    }
}

/// Runs identification for a whole extraction's worth of packages.
pub struct BatchSearcher<'a> {
    registry: &'a RegistryClient<'a>,
    cache: &'a Cache,
    engine: &'a FingerprintEngine,
}

impl<'a> BatchSearcher<'a> {
    /// Searcher over the same collaborators as [`VersionMatcher`].
    #[must_use]
    pub const fn new(
        registry: &'a RegistryClient<'a>,
        cache: &'a Cache,
        engine: &'a FingerprintEngine,
    ) -> Self {
        Self {
            registry,
            cache,
            engine,
        }
    }

    /// Search every package, returning records in input order.
    ///
    /// Per-package failures downgrade to negative records; the batch
    /// always completes.
    pub async fn search(
        &self,
        packages: &[ExtractedPackage],
        options: &BatchOptions,
        observer: Option<&dyn ProgressObserver>,
    ) -> Vec<MatchRecord> {
        let emit = |event: ProgressEvent| {
            if let Some(observer) = observer {
                observer.on_event(&event);
            }
        };

        // Warm the metadata cache for every package up front so version
        // probing never serializes behind registry documents.
        emit(ProgressEvent::PrefetchStarted {
            packages: packages.len(),
        });
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        let mut prefetches = futures::stream::iter(names.into_iter().map(|name| async move {
            let found = matches!(self.registry.metadata(name).await, Ok(Some(_)));
            (name.to_string(), found)
        }))
        .buffer_unordered(METADATA_PREFETCH_CONCURRENCY);
        while let Some((package, found)) = prefetches.next().await {
            debug!(package = %package, found, "metadata prefetched");
            emit(ProgressEvent::PrefetchFinished { package, found });
        }

        let matcher = VersionMatcher::new(self.registry, self.cache, self.engine);
        let mut records: Vec<MatchRecord> = Vec::with_capacity(packages.len());

        for batch in packages.chunks(options.package_concurrency.max(1)) {
            for package in batch {
                emit(ProgressEvent::PackageStarted {
                    package: package.name.clone(),
                });
            }
            let searches = batch
                .iter()
                .map(|package| matcher.match_package(package, &options.match_options));
            for (package, result) in batch.iter().zip(futures::future::join_all(searches).await) {
                let record = match result {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(package = %package.name, error = %e, "search failed; recording no match");
                        MatchRecord::no_match(&package.name, 0.0)
                    },
                };
                emit(ProgressEvent::PackageFinished {
                    package: package.name.clone(),
                    version: record.version.clone(),
                    similarity: record.similarity,
                });
                records.push(record);
            }
        }

        let matched = records.iter().filter(|r| r.is_match()).count();
        info!(matched, total = records.len(), "batch search finished");
        emit(ProgressEvent::BatchFinished {
            matched,
            total: records.len(),
        });
        records
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::ast::SyntaxAnalyzer;
    use crate::fetcher::Fetcher;

    struct PlainAnalyzer;

    impl SyntaxAnalyzer for PlainAnalyzer {
        fn strip_comments(&self, source: &str) -> String {
            source.to_string()
        }

        fn declaration_names(&self, _source: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn package(name: &str, content: &str) -> ExtractedPackage {
        let mut files = BTreeMap::new();
        files.insert("index.js".to_string(), content.to_string());
        ExtractedPackage::new(name, files)
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressObserver for Recorder {
        fn on_event(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[tokio::test]
    async fn searches_all_packages_and_reports_progress() {
        let server = MockServer::start().await;

        // "alpha" exists with one version whose entry matches exactly.
        Mock::given(method("GET"))
            .and(path("/alpha"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "alpha",
                "dist-tags": {"latest": "1.0.0"},
                "versions": {"1.0.0": {"main": "index.js"}},
                "time": {"1.0.0": "2021-01-01T00:00:00.000Z"},
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/alpha@1.0.0/index.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("exact alpha content"))
            .mount(&server)
            .await;
        // "ghost" does not exist.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let registry = RegistryClient::new(&fetcher, &cache)
            .with_registry_url(server.uri())
            .with_cdn_url(server.uri());
        let engine = FingerprintEngine::new(Arc::new(PlainAnalyzer));
        let searcher = BatchSearcher::new(&registry, &cache, &engine);

        let packages = vec![
            package("alpha", "exact alpha content"),
            package("ghost", "whatever"),
        ];
        let recorder = Recorder::default();
        let records = searcher
            .search(&packages, &BatchOptions::default(), Some(&recorder))
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].package, "alpha");
        assert_eq!(records[0].version.as_deref(), Some("1.0.0"));
        assert_eq!(records[1].package, "ghost");
        assert!(!records[1].is_match());

        let events = recorder.0.lock().unwrap();
        assert_eq!(
            events.first(),
            Some(&ProgressEvent::PrefetchStarted { packages: 2 })
        );
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::BatchFinished { matched: 1, total: 2 })
        );
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::PackageFinished { package, version: Some(v), .. }
                if package == "alpha" && v == "1.0.0"
        )));
    }

    #[tokio::test]
    async fn observer_is_optional() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let cache = Cache::disabled();
        let registry = RegistryClient::new(&fetcher, &cache).with_registry_url(server.uri());
        let engine = FingerprintEngine::new(Arc::new(PlainAnalyzer));
        let searcher = BatchSearcher::new(&registry, &cache, &engine);

        let records = searcher
            .search(&[package("ghost", "x")], &BatchOptions::default(), None)
            .await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_match());
    }
}
