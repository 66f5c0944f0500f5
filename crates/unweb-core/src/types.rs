//! Core data types shared across extraction, fingerprinting, and matching.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A source file recovered from a source map.
///
/// `path` is post-normalization: always a relative POSIX path safe to join
/// under an output directory. `original_path` preserves the raw entry from
/// the map's `sources` array for traceability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSource {
    /// Normalized relative path.
    pub path: String,
    /// Embedded file content.
    pub content: String,
    /// The raw `sources` entry this came from, when it differs from `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
}

/// Counters describing one extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    /// Length of the map's `sources` array.
    pub total_sources: usize,
    /// Entries that produced an [`ExtractedSource`].
    pub extracted_count: usize,
    /// Entries skipped by path normalization or filtering.
    pub skipped_count: usize,
    /// Entries whose `sourcesContent` slot was null or missing.
    pub null_content_count: usize,
}

/// Identity surrogate for a file's content (§ fingerprint matching).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    /// md5 of the raw bytes.
    pub content_hash: String,
    /// md5 after comment stripping and whitespace collapse.
    pub normalized_hash: String,
    /// Sorted unique declaration names (len > 2), `|`-joined.
    pub signature: String,
    /// Raw content length in bytes.
    pub content_length: usize,
    /// Content-only minification heuristic verdict.
    pub minified: bool,
}

/// Minification-resistant feature sets extracted from content.
///
/// These survive identifier mangling: string literals, call shapes, and
/// numeric constants are rarely rewritten by minifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    /// String literals longer than five characters, unquoted and trimmed.
    pub strings: BTreeSet<String>,
    /// Call patterns as `name:arity`.
    pub calls: BTreeSet<String>,
    /// Numeric constants (≥ 3 digits, or decimals).
    pub numbers: BTreeSet<String>,
    /// Total content length the features were drawn from.
    pub content_length: usize,
}

/// Cached fingerprint of a registry version's entry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFingerprint {
    /// The fingerprint of the fetched entry content.
    #[serde(flatten)]
    pub fingerprint: Fingerprint,
    /// Which entry path inside the package produced it.
    pub entry_path: String,
}

/// Coarse confidence label on a matcher result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Similarity below every threshold; reported but unconfirmed.
    Unverified,
    /// Best similarity ≥ the caller's minimum threshold.
    Low,
    /// Best similarity ≥ 0.80.
    Medium,
    /// Best similarity ≥ 0.90.
    High,
    /// Hash-level identity (similarity ≥ 0.99).
    Exact,
}

impl Confidence {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unverified => "unverified",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which detection strategy produced a match.
///
/// The first three originate in this crate; the rest are produced by outer
/// pipeline stages but share the closed label set so results aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchSource {
    /// Clean-source fingerprint comparison.
    Fingerprint,
    /// Minified-variant fingerprint comparison.
    FingerprintMinified,
    /// Registry file-list structural comparison.
    Structural,
    /// Extracted `package.json` declared the version. The label is the
    /// manifest's literal filename, not a kebab-cased word.
    #[serde(rename = "package.json")]
    PackageJson,
    /// A license banner named the version.
    Banner,
    /// A lockfile path embedded in the bundle named the version.
    LockfilePath,
    /// A `VERSION` constant in the code.
    VersionConstant,
    /// The source-map path encoded the version.
    SourcemapPath,
    /// Inferred from a peer dependency constraint.
    PeerDep,
    /// Fell back to the registry's `latest` tag.
    NpmLatest,
}

/// Outcome of a version search for one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// Package name as extracted.
    pub package: String,
    /// Matched version, or `None` for a (cached) negative result.
    pub version: Option<String>,
    /// Best similarity observed across all probes.
    pub similarity: f64,
    /// Confidence label, absent for negative results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    /// Strategy that produced the winning similarity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MatchSource>,
}

impl MatchRecord {
    /// A negative result: search completed, nothing cleared the threshold.
    #[must_use]
    pub fn no_match(package: &str, best_similarity: f64) -> Self {
        Self {
            package: package.to_string(),
            version: None,
            similarity: best_similarity,
            confidence: None,
            source: None,
        }
    }

    /// Whether this record represents a successful identification.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.version.is_some()
    }
}

/// Per-version manifest fields relevant to entry-point resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    /// `main` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// `module` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Raw `exports` map; conditions are resolved at probe time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<serde_json::Value>,
    /// `types` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<String>,
    /// Runtime dependencies.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Peer dependencies.
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
}

/// Registry metadata for a package, cached under the `metadata` namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// Package name.
    pub name: String,
    /// All published versions with their manifest excerpts.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionManifest>,
    /// Dist-tags (`latest`, `next`, …).
    #[serde(default)]
    pub dist_tags: BTreeMap<String, String>,
    /// Publish time per version, epoch milliseconds.
    #[serde(default)]
    pub publish_times: BTreeMap<String, i64>,
}

/// Cached raw source map payload (`sourcemap` namespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSourceMap {
    /// Raw JSON text of the map.
    pub raw: String,
    /// md5 of the raw text.
    pub content_hash: String,
}

/// Cached extraction outcome (`extraction` namespace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedExtraction {
    /// Extracted `(path, content)` records.
    pub sources: Vec<ExtractedSource>,
    /// Flattened error messages from the extraction pass.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Cached page crawl (`page` namespace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPage {
    /// Bundle URLs discovered on the page.
    pub bundles: Vec<String>,
    /// Final URL after redirects.
    pub final_url: String,
    /// Whether a redirect occurred.
    #[serde(default)]
    pub redirected: bool,
}

/// Cached source-map discovery outcome (`discovery` namespace).
///
/// `source_map_url == None` is a meaningful negative entry: discovery ran
/// and found nothing, so re-probing is suppressed until the entry expires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDiscovery {
    /// Discovered source-map URL, if any.
    #[serde(default)]
    pub source_map_url: Option<String>,
}

/// One dependency observed in extracted sources (`analysis` namespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    /// Package name.
    pub name: String,
    /// Version or range, when one was detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Short label for where the dependency was seen.
    pub origin: String,
}

/// Cached dependency analysis (`analysis` namespace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAnalysis {
    /// Dependencies referenced by the extracted sources.
    #[serde(default)]
    pub dependencies: Vec<DependencyRecord>,
    /// Import specifiers resolved to local files.
    #[serde(default)]
    pub local_imports: BTreeSet<String>,
}

/// Counters for generated-manifest reporting (`manifest` namespace).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    /// Dependencies considered.
    pub total: usize,
    /// Dependencies pinned to a concrete version.
    pub resolved: usize,
    /// Dependencies left unpinned.
    pub unresolved: usize,
}

/// Cached generated package manifest (`manifest` namespace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedManifest {
    /// Generated `package.json` text.
    pub package_json: String,
    /// How version detection went.
    #[serde(default)]
    pub stats: DetectionStats,
}
