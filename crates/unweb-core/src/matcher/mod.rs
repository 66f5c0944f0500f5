//! Package version identification against the npm registry.
//!
//! Given the files extracted for one logical package, the matcher probes
//! registry versions in a targeted order and scores each against the
//! extracted fingerprint: clean entry content first (S1), the minified
//! variant when the clean score is inconclusive (S2), aggregated
//! multi-file features when even that is weak (S3), and finally a
//! structural filename comparison for modular packages nothing else
//! matched.
//!
//! Results (positive and negative) are cached under the `match`
//! namespace keyed by `(package, extracted normalized hash)`; a cached
//! negative suppresses the whole search until it expires.

pub mod entry;
pub mod ordering;
pub mod similarity;

use std::collections::BTreeSet;

use tracing::{debug, info, instrument};

use crate::cache::{Cache, pair_key, sanitize_key};
use crate::fingerprint::{FingerprintEngine, aggregate_features, extract_features};
use crate::registry::RegistryClient;
use crate::types::{
    Confidence, FeatureSet, Fingerprint, MatchRecord, MatchSource, VersionFingerprint,
    VersionManifest,
};
use crate::Result;

pub use entry::{
    EntrySelection, ExtractedPackage, MULTI_FILE_COUNT_THRESHOLD, SMALL_ENTRY_BYTES,
    entry_candidates, is_multi_file, minified_candidates, select_entry,
};
pub use ordering::order_versions;
pub use similarity::{clean_similarity, minified_similarity, structural_similarity};

/// A probe at or above this similarity is an exact match and ends the
/// search immediately.
pub const EXACT_EXIT: f64 = 0.99;

/// After a batch, a best at or above this stops further batches.
pub const BATCH_EXIT: f64 = 0.95;

/// Below this clean score (or for minified extracts) the minified
/// comparison runs.
const MINIFIED_TRIGGER: f64 = 0.9;

/// Below this minified score the aggregate comparison runs for modular
/// packages.
const AGGREGATE_TRIGGER: f64 = 0.8;

/// Minimum structural score considered a candidate at all.
const STRUCTURAL_THRESHOLD: f64 = 0.5;

/// Structural score that stops scanning further versions.
const STRUCTURAL_EXIT: f64 = 0.95;

/// Knobs for one package search.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Smallest similarity accepted as a match.
    pub min_similarity: f64,
    /// Cap on versions probed for content.
    pub max_versions: usize,
    /// Whether pre-release versions join the ordered list.
    pub include_prereleases: bool,
    /// A version or range observed near the bundle, used to center the
    /// search spiral.
    pub version_hint: Option<String>,
    /// Versions probed concurrently within one batch.
    pub version_concurrency: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            max_versions: 30,
            include_prereleases: false,
            version_hint: None,
            version_concurrency: 6,
        }
    }
}

#[derive(Debug, Clone)]
struct ProbeOutcome {
    version: String,
    similarity: f64,
    source: MatchSource,
}

/// Identifies the registry version behind one extracted package.
pub struct VersionMatcher<'a> {
    registry: &'a RegistryClient<'a>,
    cache: &'a Cache,
    engine: &'a FingerprintEngine,
}

impl<'a> VersionMatcher<'a> {
    /// Matcher over a registry client, cache, and fingerprint engine.
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

    /// Run the full search for one package.
    ///
    /// # Errors
    ///
    /// Raises only on failures before any probing starts (the initial
    /// metadata fetch). Individual probe failures are skipped.
    #[instrument(skip_all, fields(package = %package.name))]
    pub async fn match_package(
        &self,
        package: &ExtractedPackage,
        options: &MatchOptions,
    ) -> Result<MatchRecord> {
        let Some(entry) = select_entry(&package.files) else {
            debug!("no files to fingerprint");
            return Ok(MatchRecord::no_match(&package.name, 0.0));
        };

        let extracted_fp = self.engine.fingerprint(entry.content);
        let match_key = format!(
            "{}@{}",
            sanitize_key(&package.name),
            extracted_fp.normalized_hash
        );
        if let Some(cached) = self.cache.matches.get(&match_key).await {
            debug!(hit = cached.is_match(), "match cache hit");
            return Ok(cached);
        }

        let multi_file = is_multi_file(&package.files, Some(&entry));
        let extracted_features = extract_features(entry.content);
        let aggregate = multi_file
            .then(|| aggregate_features(package.files.values().map(String::as_str)));

        let Some(metadata) = self.registry.metadata(&package.name).await? else {
            let record = MatchRecord::no_match(&package.name, 0.0);
            self.cache.matches.set(&match_key, &record).await;
            return Ok(record);
        };

        let versions = order_versions(
            &metadata,
            options.version_hint.as_deref(),
            options.include_prereleases,
            options.max_versions,
        );
        debug!(candidates = versions.len(), multi_file, "version search starting");

        let mut best: Option<ProbeOutcome> = None;
        'batches: for batch in versions.chunks(options.version_concurrency.max(1)) {
            let probes = batch.iter().map(|version| {
                self.probe_version(
                    &package.name,
                    version,
                    metadata.versions.get(version),
                    &extracted_fp,
                    &extracted_features,
                    aggregate.as_ref(),
                )
            });
            // Outcomes land in submission order, so the first exact in a
            // batch wins ties deterministically.
            for outcome in futures::future::join_all(probes).await.into_iter().flatten() {
                if outcome.similarity >= EXACT_EXIT {
                    let record = MatchRecord {
                        package: package.name.clone(),
                        version: Some(outcome.version.clone()),
                        similarity: outcome.similarity,
                        confidence: Some(Confidence::Exact),
                        source: Some(outcome.source),
                    };
                    info!(version = %outcome.version, "exact match");
                    self.cache.matches.set(&match_key, &record).await;
                    return Ok(record);
                }
                if best
                    .as_ref()
                    .is_none_or(|current| outcome.similarity > current.similarity)
                {
                    best = Some(outcome);
                }
            }
            if best
                .as_ref()
                .is_some_and(|current| current.similarity >= BATCH_EXIT)
            {
                break 'batches;
            }
        }

        // Structural fallback: modular packages whose content never
        // cleared the caller's bar.
        let content_best = best.as_ref().map_or(0.0, |b| b.similarity);
        if multi_file && content_best < options.min_similarity {
            if let Some(outcome) = self.structural_scan(package, &versions).await {
                if outcome.similarity > content_best {
                    best = Some(outcome);
                }
            }
        }

        let best_similarity = best.as_ref().map_or(0.0, |b| b.similarity);
        let record = match best {
            Some(found) if found.similarity >= options.min_similarity => {
                let confidence = confidence_for(found.similarity, options.min_similarity);
                info!(
                    version = %found.version,
                    similarity = found.similarity,
                    confidence = %confidence,
                    "match"
                );
                MatchRecord {
                    package: package.name.clone(),
                    version: Some(found.version),
                    similarity: found.similarity,
                    confidence: Some(confidence),
                    source: Some(found.source),
                }
            },
            _ => {
                debug!(best = best_similarity, "no version cleared the threshold");
                MatchRecord::no_match(&package.name, best_similarity)
            },
        };
        self.cache.matches.set(&match_key, &record).await;
        Ok(record)
    }

    /// Probe one version. `None` means the probe was skipped (network
    /// failure or no fetchable entry), not that similarity was zero.
    async fn probe_version(
        &self,
        name: &str,
        version: &str,
        manifest: Option<&VersionManifest>,
        extracted_fp: &Fingerprint,
        extracted_features: &FeatureSet,
        aggregate: Option<&FeatureSet>,
    ) -> Option<ProbeOutcome> {
        let manifest = manifest.cloned().unwrap_or_default();
        let cache_key = pair_key(name, version);

        let mut similarity = 0.0f64;
        let mut source = MatchSource::Fingerprint;
        let mut probed = false;

        // Clean entry comparison (S1), through the fingerprint cache.
        let clean = match self.cache.fingerprint.get(&cache_key).await {
            Some(cached) => Some(cached),
            None => match self.fetch_clean_fingerprint(name, version, &manifest).await {
                Ok(found) => {
                    if let Some(fingerprint) = &found {
                        self.cache.fingerprint.set(&cache_key, fingerprint).await;
                    }
                    found
                },
                Err(e) => {
                    debug!(version, error = %e, "clean probe failed; skipping");
                    None
                },
            },
        };
        if let Some(clean) = &clean {
            similarity = clean_similarity(extracted_fp, &clean.fingerprint);
            probed = true;
        }

        // Minified comparison (S2/S3) when the clean score is inconclusive.
        if extracted_fp.minified || similarity < MINIFIED_TRIGGER {
            // A cached minified fingerprint can settle it by hash alone.
            if let Some(cached) = self.cache.minified_fingerprint.get(&cache_key).await {
                if cached.fingerprint.normalized_hash == extracted_fp.normalized_hash {
                    return Some(ProbeOutcome {
                        version: version.to_string(),
                        similarity: similarity::SCORE_NORMALIZED_EQUAL,
                        source: MatchSource::FingerprintMinified,
                    });
                }
                if cached.fingerprint.content_hash == extracted_fp.content_hash {
                    return Some(ProbeOutcome {
                        version: version.to_string(),
                        similarity: similarity::SCORE_CONTENT_EQUAL,
                        source: MatchSource::FingerprintMinified,
                    });
                }
            }

            match self.fetch_minified_content(name, version, &manifest).await {
                Ok(Some((path, content))) => {
                    probed = true;
                    let minified_fp = VersionFingerprint {
                        fingerprint: self.engine.fingerprint(&content),
                        entry_path: path,
                    };
                    self.cache
                        .minified_fingerprint
                        .set(&cache_key, &minified_fp)
                        .await;

                    if minified_fp.fingerprint.normalized_hash == extracted_fp.normalized_hash {
                        return Some(ProbeOutcome {
                            version: version.to_string(),
                            similarity: similarity::SCORE_NORMALIZED_EQUAL,
                            source: MatchSource::FingerprintMinified,
                        });
                    }

                    let candidate_features = extract_features(&content);
                    let s2 = minified_similarity(extracted_features, &candidate_features);
                    if s2 > similarity {
                        similarity = s2;
                        source = MatchSource::FingerprintMinified;
                    }

                    if let Some(aggregate) = aggregate {
                        if s2 < AGGREGATE_TRIGGER {
                            let s3 = minified_similarity(aggregate, &candidate_features);
                            if s3 > similarity {
                                similarity = s3;
                                source = MatchSource::FingerprintMinified;
                            }
                        }
                    }
                },
                Ok(None) => {},
                Err(e) => {
                    debug!(version, error = %e, "minified probe failed");
                },
            }
        }

        probed.then(|| ProbeOutcome {
            version: version.to_string(),
            similarity,
            source,
        })
    }

    /// Fetch the first resolvable clean entry candidate and fingerprint it.
    async fn fetch_clean_fingerprint(
        &self,
        name: &str,
        version: &str,
        manifest: &VersionManifest,
    ) -> Result<Option<VersionFingerprint>> {
        for candidate in entry_candidates(manifest, name) {
            if let Some(content) = self.registry.file_content(name, version, &candidate).await? {
                return Ok(Some(VersionFingerprint {
                    fingerprint: self.engine.fingerprint(&content),
                    entry_path: candidate,
                }));
            }
        }
        Ok(None)
    }

    /// Fetch the first resolvable minified variant.
    async fn fetch_minified_content(
        &self,
        name: &str,
        version: &str,
        manifest: &VersionManifest,
    ) -> Result<Option<(String, String)>> {
        for candidate in minified_candidates(manifest, name) {
            if let Some(content) = self.registry.file_content(name, version, &candidate).await? {
                return Ok(Some((candidate, content)));
            }
        }
        Ok(None)
    }

    /// Structural filename scan across the ordered versions.
    async fn structural_scan(
        &self,
        package: &ExtractedPackage,
        versions: &[String],
    ) -> Option<ProbeOutcome> {
        let extracted_names: BTreeSet<String> = package.files.keys().cloned().collect();
        let mut best: Option<ProbeOutcome> = None;

        for version in versions {
            let files = match self.registry.file_list(&package.name, version).await {
                Ok(Some(files)) => files,
                Ok(None) => continue,
                Err(e) => {
                    debug!(version, error = %e, "file list fetch failed");
                    continue;
                },
            };
            let registry_names: BTreeSet<String> = files.into_iter().collect();
            let score = structural_similarity(&extracted_names, &registry_names);
            if score >= STRUCTURAL_THRESHOLD
                && best.as_ref().is_none_or(|b| score > b.similarity)
            {
                best = Some(ProbeOutcome {
                    version: version.clone(),
                    similarity: score,
                    source: MatchSource::Structural,
                });
            }
            if score >= STRUCTURAL_EXIT {
                break;
            }
        }
        best
    }
}

/// Map a final (non-exact-exit) similarity to a confidence label.
fn confidence_for(similarity: f64, min_similarity: f64) -> Confidence {
    if similarity >= EXACT_EXIT {
        Confidence::Exact
    } else if similarity >= 0.90 {
        Confidence::High
    } else if similarity >= 0.80 {
        Confidence::Medium
    } else if similarity >= min_similarity {
        Confidence::Low
    } else {
        Confidence::Unverified
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::ast::SyntaxAnalyzer;
    use crate::fetcher::Fetcher;

    struct PassthroughAnalyzer;

    impl SyntaxAnalyzer for PassthroughAnalyzer {
        fn strip_comments(&self, source: &str) -> String {
            source.to_string()
        }

        fn declaration_names(&self, source: &str) -> Vec<String> {
            source
                .split_whitespace()
                .filter(|w| w.starts_with("decl_"))
                .map(ToString::to_string)
                .collect()
        }
    }

    fn engine() -> FingerprintEngine {
        FingerprintEngine::new(Arc::new(PassthroughAnalyzer))
    }

    fn package(name: &str, files: &[(&str, &str)]) -> ExtractedPackage {
        ExtractedPackage::new(
            name,
            files
                .iter()
                .map(|(p, c)| ((*p).to_string(), (*c).to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    const ENTRY_CONTENT: &str = "decl_widget decl_render module.exports = widget;";

    async fn mount_registry(server: &MockServer, versions: &[&str], latest: &str) {
        let mut version_map = serde_json::Map::new();
        let mut times = serde_json::Map::new();
        for (i, version) in versions.iter().enumerate() {
            version_map.insert((*version).to_string(), json!({"main": "index.js"}));
            times.insert(
                (*version).to_string(),
                json!(format!("20{:02}-01-01T00:00:00.000Z", 10 + i)),
            );
        }
        Mock::given(method("GET"))
            .and(path("/demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "demo",
                "dist-tags": {"latest": latest},
                "versions": version_map,
                "time": times,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn exact_match_stops_after_one_probe_and_caches() {
        let server = MockServer::start().await;
        mount_registry(&server, &["3.2.0", "3.2.1"], "3.2.1").await;
        // Only latest should ever be fetched: identical content ends it.
        Mock::given(method("GET"))
            .and(path("/demo@3.2.1/index.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ENTRY_CONTENT))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let registry = RegistryClient::new(&fetcher, &cache)
            .with_registry_url(server.uri())
            .with_cdn_url(server.uri());
        let engine = engine();
        let matcher = VersionMatcher::new(&registry, &cache, &engine);

        let pkg = package("demo", &[("src/index.js", ENTRY_CONTENT)]);
        let record = matcher
            .match_package(&pkg, &MatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.version.as_deref(), Some("3.2.1"));
        assert_eq!(record.confidence, Some(Confidence::Exact));
        assert_eq!(record.source, Some(MatchSource::Fingerprint));
        assert!((record.similarity - 1.0).abs() < 1e-9);

        // The positive entry is in the match cache; a rerun needs no network.
        let again = matcher
            .match_package(&pkg, &MatchOptions::default())
            .await
            .unwrap();
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn missing_package_negative_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/demo"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let registry = RegistryClient::new(&fetcher, &cache).with_registry_url(server.uri());
        let engine = engine();
        let matcher = VersionMatcher::new(&registry, &cache, &engine);

        let pkg = package("demo", &[("src/index.js", ENTRY_CONTENT)]);
        let record = matcher
            .match_package(&pkg, &MatchOptions::default())
            .await
            .unwrap();
        assert!(!record.is_match());

        // Second run is served by the negative match entry.
        let again = matcher
            .match_package(&pkg, &MatchOptions::default())
            .await
            .unwrap();
        assert!(!again.is_match());
    }

    #[tokio::test]
    async fn below_threshold_writes_negative_entry() {
        let server = MockServer::start().await;
        mount_registry(&server, &["1.0.0"], "1.0.0").await;
        Mock::given(method("GET"))
            .and(path("/demo@1.0.0/index.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("decl_unrelated decl_thing totally different"),
            )
            .mount(&server)
            .await;
        // Minified candidates all miss.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let registry = RegistryClient::new(&fetcher, &cache)
            .with_registry_url(server.uri())
            .with_cdn_url(server.uri())
            .with_data_url(server.uri());
        let engine = engine();
        let matcher = VersionMatcher::new(&registry, &cache, &engine);

        let pkg = package("demo", &[("src/index.js", ENTRY_CONTENT)]);
        let options = MatchOptions {
            min_similarity: 0.6,
            ..MatchOptions::default()
        };
        let record = matcher.match_package(&pkg, &options).await.unwrap();
        assert!(!record.is_match());
        assert!(record.similarity < 0.6);
        assert!(record.confidence.is_none());

        // The negative entry landed in the match namespace.
        let fp = FingerprintEngine::new(Arc::new(PassthroughAnalyzer)).fingerprint(ENTRY_CONTENT);
        let key = format!("demo@{}", fp.normalized_hash);
        assert!(cache.matches.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn minified_extract_matches_through_features() {
        let server = MockServer::start().await;
        mount_registry(&server, &["2.0.0"], "2.0.0").await;

        // Clean entry differs structurally from the minified extract.
        let minified = "var a=1;function w(x,y){return send('telemetry-endpoint-path',x,y)}w(100,245);sendBeacon('analytics-collector-url',1024);";
        Mock::given(method("GET"))
            .and(path("/demo@2.0.0/index.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "function widget(x, y) { return send('telemetry-endpoint-path', x, y); }",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/demo@2.0.0/dist/demo.min.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(minified))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let registry = RegistryClient::new(&fetcher, &cache)
            .with_registry_url(server.uri())
            .with_cdn_url(server.uri());
        let engine = engine();
        let matcher = VersionMatcher::new(&registry, &cache, &engine);

        // The extracted bundle is the same minified artifact.
        let pkg = package("demo", &[("index.js", minified)]);
        let record = matcher
            .match_package(&pkg, &MatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.version.as_deref(), Some("2.0.0"));
        assert_eq!(record.confidence, Some(Confidence::Exact));
        assert_eq!(record.source, Some(MatchSource::FingerprintMinified));
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(confidence_for(0.995, 0.5), Confidence::Exact);
        assert_eq!(confidence_for(0.92, 0.5), Confidence::High);
        assert_eq!(confidence_for(0.85, 0.5), Confidence::Medium);
        assert_eq!(confidence_for(0.6, 0.5), Confidence::Low);
        assert_eq!(confidence_for(0.4, 0.5), Confidence::Unverified);
    }
}
