//! Source-path normalization and filtering.
//!
//! Paths carried by source maps arrive in bundler dialects
//! (`webpack:///./src/a.ts?vue&type=script`, `vite:some/module`) and may
//! attempt to escape the extraction root. Everything written to disk goes
//! through [`sanitize_relative_path`], which guarantees a relative POSIX
//! path with no traversal segments and no filesystem-reserved characters.
//! Both entry points are idempotent: running them twice yields the same
//! result as running them once.

use regex::Regex;

use crate::{Error, Result};

/// Bundler scheme prefixes stripped before normalization.
const SCHEME_PREFIXES: &[&str] = &["webpack://", "vite:", "ng:"];

/// Characters replaced with `_` because they are reserved on at least one
/// supported filesystem.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Normalize a raw source-map path into a safe relative POSIX path.
///
/// Applies, in order: `sourceRoot` prefixing, bundler scheme stripping,
/// query/fragment removal, separator unification, dot-segment resolution
/// (leading `..` is discarded rather than ascending), and reserved-character
/// replacement. Returns `None` when nothing usable remains or the input
/// contains a NUL byte.
///
/// ```
/// use unweb_core::paths::normalize_source_path;
///
/// let normalized = normalize_source_path("webpack:///./src/../src/a/b.ts?vue&type=script", None);
/// assert_eq!(normalized.as_deref(), Some("src/a/b.ts"));
/// ```
#[must_use]
pub fn normalize_source_path(path: &str, source_root: Option<&str>) -> Option<String> {
    if path.contains('\0') {
        return None;
    }

    let rooted = match source_root {
        Some(root) if !root.is_empty() && !starts_with_scheme(path) => {
            format!("{}/{}", root.trim_end_matches('/'), path)
        },
        _ => path.to_string(),
    };

    let stripped = strip_scheme(&rooted);

    // Query and fragment are bundler metadata, not path.
    let without_query = stripped
        .split_once('?')
        .map_or(stripped, |(head, _)| head);
    let without_fragment = without_query
        .split_once('#')
        .map_or(without_query, |(head, _)| head);

    sanitize_relative_path(without_fragment)
}

/// Sanitize an already-relative path for writing under an extraction root.
///
/// Guarantees for any `Some(out)`:
/// - `out` does not start with `/`
/// - `out` contains no `.` or `..` segments
/// - `out` contains none of `< > : " | ? *` and no NUL
/// - `sanitize_relative_path(&out)` returns `Some(out)` unchanged
#[must_use]
pub fn sanitize_relative_path(path: &str) -> Option<String> {
    if path.contains('\0') {
        return None;
    }

    let unified = path.replace('\\', "/");
    let mut segments: Vec<String> = Vec::new();

    for raw in unified.split('/') {
        match raw {
            "" | "." => {},
            ".." => {
                // Resolve upward only inside the accumulated path; a `..`
                // at the root is dropped so the result can never ascend.
                segments.pop();
            },
            segment => {
                let cleaned: String = segment
                    .chars()
                    .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
                    .collect();
                if !cleaned.is_empty() {
                    segments.push(cleaned);
                }
            },
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn starts_with_scheme(path: &str) -> bool {
    SCHEME_PREFIXES
        .iter()
        .any(|scheme| path.starts_with(scheme))
}

fn strip_scheme(path: &str) -> &str {
    for scheme in SCHEME_PREFIXES {
        if let Some(rest) = path.strip_prefix(scheme) {
            return rest.trim_start_matches('/');
        }
    }
    path
}

/// Inclusion policy for extracted sources.
///
/// `node_modules/*` paths are always included: internal and private
/// packages ride this path and downstream analysis needs them. Everything
/// else is included unless it matches a caller-supplied exclusion pattern.
#[derive(Debug, Default)]
pub struct SourceFilter {
    excludes: Vec<Regex>,
}

impl SourceFilter {
    /// Build a filter from exclusion patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a pattern is not a valid regex.
    pub fn new<S: AsRef<str>>(exclude_patterns: &[S]) -> Result<Self> {
        let excludes = exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern.as_ref()).map_err(|e| {
                    Error::Config(format!(
                        "invalid exclude pattern '{}': {e}",
                        pattern.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { excludes })
    }

    /// Whether a normalized path should be extracted.
    #[must_use]
    pub fn should_include(&self, path: &str) -> bool {
        if path.starts_with("node_modules/") || path.contains("/node_modules/") {
            return true;
        }
        !self.excludes.iter().any(|regex| regex.is_match(path))
    }
}
