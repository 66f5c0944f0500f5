//! Entry-point selection for extracted packages and registry versions.
//!
//! Both halves of a comparison need a representative file: the extracted
//! side picks from the recovered file set by a fixed preference ladder,
//! the registry side resolves manifest fields (`module`, `main`,
//! `exports`) and falls back to a suite of conventional paths.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::VersionManifest;

/// File-count bound past which a package is treated as modular.
/// Heuristic; calibrate together with [`SMALL_ENTRY_BYTES`].
pub const MULTI_FILE_COUNT_THRESHOLD: usize = 20;

/// An entry smaller than this is not representative of a large package.
pub const SMALL_ENTRY_BYTES: usize = 10 * 1024;

/// Extracted-side entry preference ladder, most preferred first.
const ENTRY_PREFERENCES: &[&str] = &[
    "src/index.ts",
    "src/index.tsx",
    "src/index.js",
    "src/index.jsx",
    "src/index.mjs",
    "dist/index.js",
    "dist/index.mjs",
    "lib/index.js",
    "es/index.js",
];

/// A set of files recovered for one logical package.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPackage {
    /// Package name as referenced by the bundle.
    pub name: String,
    /// Relative path → content.
    pub files: BTreeMap<String, String>,
}

impl ExtractedPackage {
    /// Bundle up a name and its recovered files.
    #[must_use]
    pub fn new(name: impl Into<String>, files: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }
}

/// The chosen entry file for an extracted package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySelection<'a> {
    /// Path within the extracted set.
    pub path: &'a str,
    /// The file's content.
    pub content: &'a str,
    /// Whether a conventional index/main path matched (as opposed to the
    /// largest-file fallback).
    pub standard: bool,
}

/// Pick the entry file from an extracted file set.
///
/// Preference order: conventional index paths, then any `index.*`, then
/// `src/main.*`, then the largest file.
#[must_use]
pub fn select_entry(files: &BTreeMap<String, String>) -> Option<EntrySelection<'_>> {
    for preference in ENTRY_PREFERENCES {
        if let Some((path, content)) = files.get_key_value(*preference) {
            return Some(EntrySelection {
                path: path.as_str(),
                content: content.as_str(),
                standard: true,
            });
        }
    }

    let is_index_basename =
        |path: &str| path.rsplit('/').next().is_some_and(|base| base.starts_with("index."));
    if let Some((path, content)) = files.iter().find(|(path, _)| is_index_basename(path)) {
        return Some(EntrySelection {
            path: path.as_str(),
            content: content.as_str(),
            standard: true,
        });
    }
    if let Some((path, content)) = files.iter().find(|(path, _)| path.starts_with("src/main.")) {
        return Some(EntrySelection {
            path: path.as_str(),
            content: content.as_str(),
            standard: true,
        });
    }

    files
        .iter()
        .max_by_key(|(_, content)| content.len())
        .map(|(path, content)| EntrySelection {
            path: path.as_str(),
            content: content.as_str(),
            standard: false,
        })
}

/// Whether a package should also be matched through aggregated features:
/// many files and no representative single entry.
#[must_use]
pub fn is_multi_file(files: &BTreeMap<String, String>, entry: Option<&EntrySelection<'_>>) -> bool {
    if files.len() <= MULTI_FILE_COUNT_THRESHOLD {
        return false;
    }
    match entry {
        None => true,
        Some(selection) => !selection.standard || selection.content.len() < SMALL_ENTRY_BYTES,
    }
}

/// Registry-side entry candidates for one version, most specific first.
///
/// Manifest fields win (`module`, `main`, then `exports["."]` and its
/// conditions); a fixed suite of conventional paths and minified variants
/// derived from the package base name follows.
#[must_use]
pub fn entry_candidates(manifest: &VersionManifest, package_name: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut push = |path: &str| {
        let cleaned = path.trim_start_matches("./").to_string();
        if !cleaned.is_empty() && !candidates.contains(&cleaned) {
            candidates.push(cleaned);
        }
    };

    if let Some(module) = &manifest.module {
        push(module);
    }
    if let Some(main) = &manifest.main {
        push(main);
    }
    if let Some(exports) = &manifest.exports {
        for path in exports_entry_paths(exports) {
            push(&path);
        }
    }

    let base = package_base_name(package_name);
    for fixed in [
        "index.js".to_string(),
        "dist/index.js".to_string(),
        "lib/index.js".to_string(),
        "es/index.js".to_string(),
        "src/index.js".to_string(),
        format!("dist/{base}.js"),
        format!("dist/{base}.min.js"),
        format!("{base}.js"),
        format!("{base}.min.js"),
    ] {
        push(&fixed);
    }

    candidates
}

/// Candidate paths for the minified variant of a version's entry.
#[must_use]
pub fn minified_candidates(manifest: &VersionManifest, package_name: &str) -> Vec<String> {
    let base = package_base_name(package_name);
    let mut candidates: Vec<String> = vec![
        format!("dist/{base}.min.js"),
        format!("{base}.min.js"),
        format!("dist/{base}.production.min.js"),
        format!("umd/{base}.min.js"),
        "dist/index.min.js".to_string(),
    ];

    // The resolved entry with `.js` swapped for `.min.js` is often right.
    for resolved in entry_candidates(manifest, package_name) {
        if let Some(stem) = resolved.strip_suffix(".js") {
            if !stem.ends_with(".min") {
                let minified = format!("{stem}.min.js");
                if !candidates.contains(&minified) {
                    candidates.push(minified);
                }
            }
        }
    }

    candidates
}

/// Resolve `exports` to concrete file paths: the `"."` entry's string or
/// condition values, or the top-level string/conditions for shorthand
/// forms.
fn exports_entry_paths(exports: &Value) -> Vec<String> {
    fn flatten(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(path) => out.push(path.clone()),
            Value::Object(conditions) => {
                for key in ["import", "require", "default", "browser", "node"] {
                    if let Some(inner) = conditions.get(key) {
                        flatten(inner, out);
                    }
                }
            },
            _ => {},
        }
    }

    let mut out = Vec::new();
    match exports {
        Value::String(path) => out.push(path.clone()),
        Value::Object(map) => {
            if let Some(dot) = map.get(".") {
                flatten(dot, &mut out);
            } else {
                flatten(exports, &mut out);
            }
        },
        _ => {},
    }
    out
}

/// The unscoped final segment of a package name.
fn package_base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
