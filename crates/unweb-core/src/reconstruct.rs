//! Safe reconstruction of extracted sources onto disk.
//!
//! Every path is re-sanitized at the write boundary, parents are created
//! on demand, and writes are deduplicated by `(size, md5)` so re-running
//! an extraction over an existing tree reports `unchanged` instead of
//! churning files. Symlinks inside the target are never followed.
//!
//! Output layout under `output_dir`:
//!
//! ```text
//! <bundleName>/<sanitized relative path>   extracted sources
//! _bundles/<mirrored url path>             raw bundles without maps
//! src/index.<ext>                          generated entry file
//! manifest.json                            extraction manifest
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::fingerprint::md5_hex;
use crate::paths::sanitize_relative_path;
use crate::types::ExtractedSource;
use crate::{Error, Result};

/// Cap on per-bundle file listings in the manifest.
const MAX_MANIFEST_FILES: usize = 100;

/// Directory for raw bundles saved without source maps.
const RAW_BUNDLE_DIR: &str = "_bundles";

/// Derive a directory-safe bundle name from a bundle URL.
///
/// Uses the final path segment without its extension, prefixed with the
/// immediate parent directory segment when one exists, so two bundles with
/// the same filename in different directories never collide.
#[must_use]
pub fn bundle_name_from_url(url: &str) -> String {
    let path = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest.split_once('/').map_or("", |(_, p)| p));
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut segments = path.split('/').filter(|s| !s.is_empty()).rev();
    let file = segments.next().unwrap_or("bundle");
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    let stem = if stem.is_empty() { "bundle" } else { stem };

    let name = match segments.next() {
        Some(parent) => format!("{parent}/{stem}"),
        None => stem.to_string(),
    };
    sanitize_relative_path(&name).unwrap_or_else(|| "bundle".to_string())
}

/// Per-file outcome counters for one reconstruction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructStats {
    /// Files created or overwritten.
    pub written: usize,
    /// Files skipped because size and hash matched on disk.
    pub unchanged: usize,
    /// Files that could not be written.
    pub failed: usize,
    /// Messages for the failures.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// One bundle's entry in the extraction manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    /// The bundle URL.
    pub bundle_url: String,
    /// Its source-map URL, when one was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
    /// How many files the bundle produced.
    pub files_extracted: usize,
    /// Up to [`MAX_MANIFEST_FILES`] of those paths.
    pub files: Vec<String>,
}

/// The `manifest.json` written after a reconstruction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionManifest {
    /// The page or root URL the run started from.
    pub url: String,
    /// When the manifest was generated.
    pub generated_at: DateTime<Utc>,
    /// Per-bundle summaries.
    pub bundles: Vec<BundleManifest>,
    /// Grand total of extracted files.
    pub total_files: usize,
    /// File counts by extension (`ts`, `js`, …; `none` for extensionless).
    pub by_extension: BTreeMap<String, usize>,
    /// File counts by top-level directory of the sanitized path.
    pub by_top_level_dir: BTreeMap<String, usize>,
}

impl ExtractionManifest {
    /// Empty manifest for a run rooted at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            generated_at: Utc::now(),
            bundles: Vec::new(),
            total_files: 0,
            by_extension: BTreeMap::new(),
            by_top_level_dir: BTreeMap::new(),
        }
    }

    /// Record one bundle's extraction into the aggregate counts.
    pub fn add_bundle(
        &mut self,
        bundle_url: impl Into<String>,
        source_map_url: Option<String>,
        paths: &[String],
    ) {
        for path in paths {
            let extension = Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("none")
                .to_string();
            *self.by_extension.entry(extension).or_insert(0) += 1;

            let top = path.split('/').next().unwrap_or_default().to_string();
            *self.by_top_level_dir.entry(top).or_insert(0) += 1;
        }
        self.total_files += paths.len();
        self.bundles.push(BundleManifest {
            bundle_url: bundle_url.into(),
            source_map_url,
            files_extracted: paths.len(),
            files: paths.iter().take(MAX_MANIFEST_FILES).cloned().collect(),
        });
    }
}

/// Writes extraction output under a single root directory.
pub struct Reconstructor {
    output_dir: PathBuf,
}

impl Reconstructor {
    /// Reconstructor rooted at `output_dir` (created on first write).
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// The output root.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write one bundle's sources under `output_dir/<bundle_name>/`.
    ///
    /// Re-sanitizes every path, refuses symlinked targets, and skips
    /// writes whose `(size, md5)` already match the file on disk.
    #[instrument(skip_all, fields(bundle = %bundle_name, files = sources.len()))]
    pub async fn write_bundle_sources(
        &self,
        bundle_name: &str,
        sources: &[ExtractedSource],
    ) -> ReconstructStats {
        let Some(bundle_name) = sanitize_relative_path(bundle_name) else {
            return ReconstructStats {
                failed: sources.len(),
                errors: vec!["bundle name sanitized to nothing".to_string()],
                ..ReconstructStats::default()
            };
        };
        let bundle_dir = self.output_dir.join(bundle_name);

        let mut stats = ReconstructStats::default();
        for source in sources {
            let Some(relative) = sanitize_relative_path(&source.path) else {
                stats.failed += 1;
                stats
                    .errors
                    .push(format!("path '{}' sanitized to nothing", source.path));
                continue;
            };
            let target = bundle_dir.join(&relative);
            debug_assert!(target.starts_with(&bundle_dir));

            match write_deduped(&target, source.content.as_bytes()).await {
                Ok(WriteOutcome::Written) => stats.written += 1,
                Ok(WriteOutcome::Unchanged) => stats.unchanged += 1,
                Err(e) => {
                    warn!(path = %target.display(), error = %e, "write failed");
                    stats.failed += 1;
                    stats.errors.push(format!("{relative}: {e}"));
                },
            }
        }
        stats
    }

    /// Mirror a raw bundle body under `_bundles/`, for bundles that
    /// shipped without a source map.
    pub async fn save_raw_bundle(&self, bundle_url: &str, body: &[u8]) -> Result<PathBuf> {
        let path = bundle_url
            .split_once("://")
            .map_or(bundle_url, |(_, rest)| {
                rest.split_once('/').map_or("bundle.js", |(_, p)| p)
            });
        let path = path.split(['?', '#']).next().unwrap_or("bundle.js");
        let relative = sanitize_relative_path(path)
            .unwrap_or_else(|| "bundle.js".to_string());

        let target = self.output_dir.join(RAW_BUNDLE_DIR).join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("failed to create bundle dir: {e}")))?;
        }
        tokio::fs::write(&target, body)
            .await
            .map_err(|e| Error::Storage(format!("failed to save raw bundle: {e}")))?;
        Ok(target)
    }

    /// Emit `src/index.<ext>` re-exporting extracted bundles and importing
    /// mirrored raw bundles. Nothing is written when both sides are empty.
    pub async fn write_entry_file(
        &self,
        extracted_bundles: &[String],
        raw_bundle_paths: &[String],
        typescript: bool,
    ) -> Result<Option<PathBuf>> {
        if extracted_bundles.is_empty() && raw_bundle_paths.is_empty() {
            return Ok(None);
        }

        let mut body = String::new();
        for bundle in extracted_bundles {
            body.push_str(&format!("export * from '../{bundle}';\n"));
        }
        for raw in raw_bundle_paths {
            body.push_str(&format!("import '../{RAW_BUNDLE_DIR}/{raw}';\n"));
        }

        let ext = if typescript { "ts" } else { "js" };
        let target = self.output_dir.join("src").join(format!("index.{ext}"));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("failed to create src dir: {e}")))?;
        }
        tokio::fs::write(&target, body)
            .await
            .map_err(|e| Error::Storage(format!("failed to write entry file: {e}")))?;
        Ok(Some(target))
    }

    /// Write `manifest.json` at the output root (atomic temp + rename).
    pub async fn write_manifest(&self, manifest: &ExtractionManifest) -> Result<PathBuf> {
        let target = self.output_dir.join("manifest.json");
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Error::Storage(format!("failed to create output dir: {e}")))?;
        let tmp = target.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Storage(format!("failed to write manifest: {e}")))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| Error::Storage(format!("failed to commit manifest: {e}")))?;
        debug!(path = %target.display(), "manifest written");
        Ok(target)
    }
}

enum WriteOutcome {
    Written,
    Unchanged,
}

/// Write `content` to `target` unless an identical file is already there.
async fn write_deduped(target: &Path, content: &[u8]) -> std::io::Result<WriteOutcome> {
    match tokio::fs::symlink_metadata(target).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            // Refuse to write through symlinks: the link target may point
            // outside the reconstruction root.
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "target is a symlink",
            ));
        },
        Ok(meta) if meta.len() == content.len() as u64 => {
            let existing = tokio::fs::read(target).await?;
            if md5_hex(&existing) == md5_hex(content) {
                return Ok(WriteOutcome::Unchanged);
            }
        },
        _ => {},
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, content).await?;
    Ok(WriteOutcome::Written)
}
