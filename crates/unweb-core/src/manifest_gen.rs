//! Generated `package.json` from identification results.
//!
//! After matching, every extracted package maps to a pinned version, an
//! unverified best guess, or nothing. This module assembles those records
//! into a dependency manifest the rebuild stage can install from, together
//! with [`DetectionStats`] describing how much of it is trustworthy.
//! Results are cached under the `manifest` namespace, keyed by the page
//! URL, the extraction content hash, and the generation options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Cache, url_key};
use crate::fingerprint::md5_hex;
use crate::types::{CachedManifest, DetectionStats, MatchRecord};
use crate::Result;

/// Range placed on dependencies whose version search found nothing.
const UNRESOLVED_RANGE: &str = "*";

/// Options shaping the generated manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestOptions {
    /// `name` field of the generated package.
    pub project_name: String,
    /// `version` field of the generated package.
    pub project_version: String,
    /// Pin matched versions exactly (`1.2.3`) instead of caret-ranged
    /// (`^1.2.3`).
    pub pin_exact: bool,
    /// Add a `typescript` dev-dependency and a `tsc` build script.
    pub typescript: bool,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            project_name: "recovered-app".to_string(),
            project_version: "0.1.0".to_string(),
            pin_exact: false,
            typescript: false,
        }
    }
}

/// Build a `package.json` from match records.
///
/// Matched packages become dependencies at their identified version;
/// unmatched packages are kept at `*` so the rebuild can still attempt an
/// install, and counted as unresolved.
#[must_use]
pub fn build_package_json(
    options: &ManifestOptions,
    records: &[MatchRecord],
) -> (String, DetectionStats) {
    let mut dependencies: BTreeMap<String, String> = BTreeMap::new();
    let mut stats = DetectionStats {
        total: records.len(),
        ..DetectionStats::default()
    };

    for record in records {
        match &record.version {
            Some(version) => {
                let range = if options.pin_exact {
                    version.clone()
                } else {
                    format!("^{version}")
                };
                dependencies.insert(record.package.clone(), range);
                stats.resolved += 1;
            },
            None => {
                dependencies.insert(record.package.clone(), UNRESOLVED_RANGE.to_string());
                stats.unresolved += 1;
            },
        }
    }

    let mut document = serde_json::json!({
        "name": options.project_name,
        "version": options.project_version,
        "private": true,
        "dependencies": dependencies,
    });
    if options.typescript {
        document["devDependencies"] = serde_json::json!({ "typescript": "^5" });
        document["scripts"] = serde_json::json!({ "build": "tsc" });
    }

    // Pretty output with a trailing newline, the way npm writes it.
    let mut text = serde_json::to_string_pretty(&document)
        .unwrap_or_else(|_| String::from("{}"));
    text.push('\n');
    (text, stats)
}

/// Build the manifest through the cache.
///
/// `extraction_hash` identifies the extracted content the records were
/// derived from; a changed extraction or changed options misses the cache
/// and regenerates.
pub async fn generate_with_cache(
    cache: &Cache,
    page_url: &str,
    extraction_hash: &str,
    options: &ManifestOptions,
    records: &[MatchRecord],
) -> Result<CachedManifest> {
    let key = manifest_key(page_url, extraction_hash, options);
    if let Some(cached) = cache.manifest.get(&key).await {
        debug!(page_url, "manifest cache hit");
        return Ok(cached);
    }

    let (package_json, stats) = build_package_json(options, records);
    let manifest = CachedManifest {
        package_json,
        stats,
    };
    cache.manifest.set(&key, &manifest).await;
    Ok(manifest)
}

/// Cache key over `(url hash, extraction hash, options hash)`.
fn manifest_key(page_url: &str, extraction_hash: &str, options: &ManifestOptions) -> String {
    let options_hash = serde_json::to_vec(options)
        .map(|bytes| md5_hex(&bytes))
        .unwrap_or_default();
    format!(
        "{}_{}_{}",
        url_key(page_url),
        extraction_hash.get(..12).unwrap_or(extraction_hash),
        options_hash.get(..12).unwrap_or(&options_hash)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Confidence, MatchSource};

    fn matched(package: &str, version: &str) -> MatchRecord {
        MatchRecord {
            package: package.to_string(),
            version: Some(version.to_string()),
            similarity: 0.97,
            confidence: Some(Confidence::High),
            source: Some(MatchSource::Fingerprint),
        }
    }

    #[test]
    fn builds_caret_ranged_dependencies_by_default() {
        let records = vec![
            matched("react", "18.2.0"),
            matched("@scope/util", "2.0.1"),
            MatchRecord::no_match("mystery-pkg", 0.3),
        ];
        let (json, stats) = build_package_json(&ManifestOptions::default(), &records);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["dependencies"]["react"], "^18.2.0");
        assert_eq!(parsed["dependencies"]["@scope/util"], "^2.0.1");
        assert_eq!(parsed["dependencies"]["mystery-pkg"], "*");
        assert_eq!(parsed["name"], "recovered-app");
        assert!(json.ends_with('\n'));

        assert_eq!(stats.total, 3);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.unresolved, 1);
    }

    #[test]
    fn pin_exact_and_typescript_options() {
        let options = ManifestOptions {
            pin_exact: true,
            typescript: true,
            ..ManifestOptions::default()
        };
        let (json, _) = build_package_json(&options, &[matched("lodash", "4.17.21")]);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["dependencies"]["lodash"], "4.17.21");
        assert_eq!(parsed["devDependencies"]["typescript"], "^5");
        assert_eq!(parsed["scripts"]["build"], "tsc");
    }

    #[test]
    fn dependencies_are_sorted() {
        let (json, _) = build_package_json(
            &ManifestOptions::default(),
            &[matched("zlib-sync", "1.0.0"), matched("axios", "1.6.0")],
        );
        let axios = json.find("axios").unwrap();
        let zlib = json.find("zlib-sync").unwrap();
        assert!(axios < zlib);
    }

    #[test]
    fn keys_differ_by_url_extraction_and_options() {
        let options = ManifestOptions::default();
        let a = manifest_key("https://a.com", "abcdef123456", &options);
        let b = manifest_key("https://b.com", "abcdef123456", &options);
        assert_ne!(a, b);

        let c = manifest_key("https://a.com", "999999999999", &options);
        assert_ne!(a, c);

        let pinned = ManifestOptions {
            pin_exact: true,
            ..ManifestOptions::default()
        };
        let d = manifest_key("https://a.com", "abcdef123456", &pinned);
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn cached_generation_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = Cache::with_root(dir.path()).unwrap();
        let options = ManifestOptions::default();
        let records = vec![matched("react", "18.2.0")];

        let first = generate_with_cache(&cache, "https://a.com", "hash0001", &options, &records)
            .await
            .unwrap();
        assert_eq!(first.stats.resolved, 1);

        // A second call with no records still returns the cached manifest.
        let second = generate_with_cache(&cache, "https://a.com", "hash0001", &options, &[])
            .await
            .unwrap();
        assert_eq!(second, first);
    }
}
