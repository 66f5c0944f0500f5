//! npm registry and CDN access for package identification.
//!
//! Three endpoints, all read through the cache so repeated searches hit
//! the network once per TTL window:
//!
//! - the registry document (`/{name}`) for versions, dist-tags, entry
//!   fields, and publish times (`metadata` namespace),
//! - a flat file-listing API per version (`file-list` namespace),
//! - a CDN for raw file contents (cached one level up, as fingerprints).
//!
//! HTTP error statuses are soft results (`None` / `false`); only transport
//! failures raise, and the matcher downgrades those per-probe.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::{Cache, pair_key, sanitize_key};
use crate::fetcher::{FetchOptions, Fetcher};
use crate::types::{PackageMetadata, VersionManifest};
use crate::Result;

/// Default npm registry endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Default CDN for raw file contents.
pub const DEFAULT_CDN_URL: &str = "https://cdn.jsdelivr.net/npm";

/// Default flat file-listing endpoint.
pub const DEFAULT_DATA_URL: &str = "https://data.jsdelivr.com/v1/packages/npm";

/// Registry/CDN client. Cheap to construct; borrow it wherever needed.
pub struct RegistryClient<'a> {
    fetcher: &'a Fetcher,
    cache: &'a Cache,
    registry_url: String,
    cdn_url: String,
    data_url: String,
}

impl<'a> RegistryClient<'a> {
    /// Client against the public npm registry and jsDelivr.
    #[must_use]
    pub fn new(fetcher: &'a Fetcher, cache: &'a Cache) -> Self {
        Self {
            fetcher,
            cache,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            cdn_url: DEFAULT_CDN_URL.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
        }
    }

    /// Override the registry endpoint (tests point this at a mock server).
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Override the CDN endpoint.
    #[must_use]
    pub fn with_cdn_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_url = url.into();
        self
    }

    /// Override the file-listing endpoint.
    #[must_use]
    pub fn with_data_url(mut self, url: impl Into<String>) -> Self {
        self.data_url = url.into();
        self
    }

    /// Full metadata for a package, or `None` when the registry has no
    /// such package.
    #[instrument(skip_all, fields(package = %name))]
    pub async fn metadata(&self, name: &str) -> Result<Option<PackageMetadata>> {
        let key = sanitize_key(name);
        if let Some(cached) = self.cache.metadata.get(&key).await {
            return Ok(Some(cached));
        }
        // A cached negative existence suppresses the fetch entirely.
        if self.cache.registry_existence.get(&key).await == Some(false) {
            return Ok(None);
        }

        let url = format!("{}/{}", self.registry_url, encode_name(name));
        let response = self.fetcher.fetch(&url, &FetchOptions::default()).await?;
        if !response.ok {
            debug!(status = response.status, "registry miss");
            self.cache.registry_existence.set(&key, &false).await;
            return Ok(None);
        }

        let document: Value = response.json()?;
        let metadata = parse_registry_document(name, &document);
        self.cache.metadata.set(&key, &metadata).await;
        self.cache.registry_existence.set(&key, &true).await;
        Ok(Some(metadata))
    }

    /// Whether the package exists on the registry.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let key = sanitize_key(name);
        if let Some(cached) = self.cache.registry_existence.get(&key).await {
            return Ok(cached);
        }
        let url = format!("{}/{}", self.registry_url, encode_name(name));
        let response = self.fetcher.head(&url, &FetchOptions::default()).await?;
        let exists = response.ok;
        self.cache.registry_existence.set(&key, &exists).await;
        Ok(exists)
    }

    /// Whether a specific version of the package exists.
    pub async fn version_exists(&self, name: &str, version: &str) -> Result<bool> {
        let key = pair_key(name, version);
        if let Some(cached) = self.cache.registry_version.get(&key).await {
            return Ok(cached);
        }
        let url = format!("{}/{}/{version}", self.registry_url, encode_name(name));
        let response = self.fetcher.head(&url, &FetchOptions::default()).await?;
        let exists = response.ok;
        self.cache.registry_version.set(&key, &exists).await;
        Ok(exists)
    }

    /// Filenames published in a version, relative without a leading slash.
    pub async fn file_list(&self, name: &str, version: &str) -> Result<Option<Vec<String>>> {
        let key = pair_key(name, version);
        if let Some(cached) = self.cache.file_list.get(&key).await {
            return Ok(Some(cached));
        }

        let url = format!("{}/{name}@{version}?structure=flat", self.data_url);
        let response = self.fetcher.fetch(&url, &FetchOptions::default()).await?;
        if !response.ok {
            return Ok(None);
        }

        let document: Value = response.json()?;
        let files: Vec<String> = document
            .get("files")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                    .map(|name| name.trim_start_matches('/').to_string())
                    .collect()
            })
            .unwrap_or_default();

        self.cache.file_list.set(&key, &files).await;
        Ok(Some(files))
    }

    /// Raw content of one file in one version, or `None` when the CDN has
    /// no such path.
    pub async fn file_content(
        &self,
        name: &str,
        version: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/{name}@{version}/{}", self.cdn_url, path.trim_start_matches('/'));
        let response = self.fetcher.fetch(&url, &FetchOptions::default()).await?;
        if response.ok {
            Ok(Some(response.text()))
        } else {
            Ok(None)
        }
    }
}

/// Scoped names keep their `@` but encode the separating slash.
fn encode_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replacen('/', "%2F", 1)
    } else {
        name.to_string()
    }
}

/// Reduce a registry document to the fields identification needs.
fn parse_registry_document(name: &str, document: &Value) -> PackageMetadata {
    let mut versions = BTreeMap::new();
    if let Some(map) = document.get("versions").and_then(Value::as_object) {
        for (version, manifest) in map {
            versions.insert(version.clone(), parse_version_manifest(manifest));
        }
    }

    let dist_tags = document
        .get("dist-tags")
        .and_then(Value::as_object)
        .map(|tags| {
            tags.iter()
                .filter_map(|(tag, v)| v.as_str().map(|s| (tag.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let mut publish_times = BTreeMap::new();
    if let Some(times) = document.get("time").and_then(Value::as_object) {
        for (version, stamp) in times {
            if version == "created" || version == "modified" {
                continue;
            }
            if let Some(ms) = stamp
                .as_str()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp_millis())
            {
                publish_times.insert(version.clone(), ms);
            }
        }
    }

    PackageMetadata {
        name: name.to_string(),
        versions,
        dist_tags,
        publish_times,
    }
}

fn parse_version_manifest(manifest: &Value) -> VersionManifest {
    let string_field = |key: &str| {
        manifest
            .get(key)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    };
    let dep_map = |key: &str| -> BTreeMap<String, String> {
        manifest
            .get(key)
            .and_then(Value::as_object)
            .map(|deps| {
                deps.iter()
                    .filter_map(|(dep, range)| {
                        range.as_str().map(|r| (dep.clone(), r.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    VersionManifest {
        main: string_field("main"),
        module: string_field("module"),
        exports: manifest.get("exports").cloned(),
        types: string_field("types").or_else(|| string_field("typings")),
        dependencies: dep_map("dependencies"),
        peer_dependencies: dep_map("peerDependencies"),
    }
}
