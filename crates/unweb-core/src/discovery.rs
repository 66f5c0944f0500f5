//! Source-map discovery for fetched bundles.
//!
//! Three strategies, attempted in order; the first hit wins:
//!
//! 1. `SourceMap` / `X-SourceMap` response headers.
//! 2. A trailing `sourceMappingURL` comment (`//#` for JS, `/*# … */` for
//!    CSS), searched from the end of the body, where bundlers append it.
//! 3. Probing `<bundle-url>.map`.
//!
//! A miss across all three is a soft result (`found == false`), never an
//! error: bundles without maps are the common case in production.
//! Transport failures during the probe downgrade to a miss as well.

use tracing::{debug, instrument};
use url::Url;

use crate::fetcher::{FetchOptions, FetchResponse, Fetcher};

/// Which strategy located the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryStrategy {
    /// `SourceMap` or `X-SourceMap` response header.
    Header,
    /// Trailing `sourceMappingURL` comment.
    Comment,
    /// `.map` URL probe.
    Probe,
}

/// Outcome of source-map discovery for one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Whether any strategy produced a URL.
    pub found: bool,
    /// The discovered source-map URL, absolute or a `data:` URI.
    pub source_map_url: Option<String>,
    /// The winning strategy.
    pub strategy: Option<DiscoveryStrategy>,
}

impl DiscoveryResult {
    fn hit(url: String, strategy: DiscoveryStrategy) -> Self {
        Self {
            found: true,
            source_map_url: Some(url),
            strategy: Some(strategy),
        }
    }

    /// The soft miss: nothing located.
    #[must_use]
    pub const fn not_found() -> Self {
        Self {
            found: false,
            source_map_url: None,
            strategy: None,
        }
    }
}

/// Discovers source maps for fetched bundles.
pub struct SourceMapDiscovery<'a> {
    fetcher: &'a Fetcher,
}

impl<'a> SourceMapDiscovery<'a> {
    /// Discovery backed by the given fetcher (used only for the probe).
    #[must_use]
    pub const fn new(fetcher: &'a Fetcher) -> Self {
        Self { fetcher }
    }

    /// Run the strategy ladder for a fetched bundle.
    #[instrument(skip_all, fields(bundle = %bundle_url))]
    pub async fn discover(&self, bundle_url: &str, response: &FetchResponse) -> DiscoveryResult {
        if let Some(reference) = reference_from_headers(response) {
            debug!(reference = %reference, "source map from response header");
            if let Some(resolved) = resolve_reference(bundle_url, &reference) {
                return DiscoveryResult::hit(resolved, DiscoveryStrategy::Header);
            }
        }

        if let Some(reference) = reference_from_trailing_comment(&response.text()) {
            debug!(reference = %reference, "source map from trailing comment");
            if let Some(resolved) = resolve_reference(bundle_url, &reference) {
                return DiscoveryResult::hit(resolved, DiscoveryStrategy::Comment);
            }
        }

        let probe_url = format!("{bundle_url}.map");
        if self.probe_exists(&probe_url).await {
            debug!(url = %probe_url, "source map from .map probe");
            return DiscoveryResult::hit(probe_url, DiscoveryStrategy::Probe);
        }

        DiscoveryResult::not_found()
    }

    /// HEAD the candidate, falling back to GET for servers that reject
    /// HEAD. Transport failures read as "does not exist".
    async fn probe_exists(&self, url: &str) -> bool {
        let options = FetchOptions::default();
        match self.fetcher.head(url, &options).await {
            Ok(response) if response.ok => true,
            Ok(response) if response.status == 405 => self
                .fetcher
                .fetch(url, &options)
                .await
                .is_ok_and(|r| r.ok),
            _ => false,
        }
    }
}

/// Extract a map reference from `SourceMap` / `X-SourceMap` headers.
#[must_use]
pub fn reference_from_headers(response: &FetchResponse) -> Option<String> {
    response
        .header("sourcemap")
        .or_else(|| response.header("x-sourcemap"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Extract the last `sourceMappingURL` comment from a bundle body.
///
/// Only the tail of the body is scanned: the reference belongs at the end,
/// and string literals earlier in the bundle can embed decoys.
#[must_use]
pub fn reference_from_trailing_comment(body: &str) -> Option<String> {
    const MARKER: &str = "sourceMappingURL=";
    // Look at the trailing region only; generous enough for data URIs to
    // start within it while the payload continues past.
    let tail_start = body.len().saturating_sub(1024);
    let tail = &body[floor_char_boundary(body, tail_start)..];

    let at = tail.rfind(MARKER)?;
    // The marker must sit inside a JS `//#`/`//@` or CSS `/*#` comment.
    let line_start = tail[..at].rfind('\n').map_or(0, |i| i + 1);
    let prefix = tail[line_start..at].trim_start();
    let is_js = prefix.starts_with("//#") || prefix.starts_with("//@");
    let is_css = prefix.starts_with("/*#") || prefix.starts_with("/*@");
    if !is_js && !is_css {
        return None;
    }

    let value = &tail[at + MARKER.len()..];
    let value = value
        .split(|c: char| c.is_whitespace() || c == '*')
        .next()
        .unwrap_or_default()
        .trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Resolve a discovered reference against the bundle URL.
///
/// `data:` URIs and absolute URLs pass through; everything else joins
/// relative to the bundle.
fn resolve_reference(bundle_url: &str, reference: &str) -> Option<String> {
    if reference.starts_with("data:") {
        return Some(reference.to_string());
    }
    let base = Url::parse(bundle_url).ok()?;
    base.join(reference).ok().map(Into::into)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
