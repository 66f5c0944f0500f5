//! Source extraction from validated regular maps.
//!
//! Walks `sources` and `sourcesContent` in lockstep, normalizes each path,
//! applies the inclusion filter, and emits [`ExtractedSource`] records,
//! optionally streaming each one through a caller-supplied sink as it is
//! produced. Extraction never fails as a whole: per-entry problems are
//! counted and the overall result always carries whatever was produced.

use tracing::{debug, instrument};

use crate::paths::{SourceFilter, normalize_source_path};
use crate::sourcemap::{SourceMapV3, ValidationCode, ValidationError};
use crate::types::{ExtractedSource, ExtractionMetadata};

/// Streaming consumer of extracted sources.
///
/// Consumed eagerly during the walk; implementations may buffer, forward
/// to a channel, or write through immediately. A plain `FnMut` closure
/// works via the blanket impl.
pub trait SourceSink {
    /// Called once per emitted source, in map order.
    fn on_source(&mut self, source: &ExtractedSource);
}

impl<F: FnMut(&ExtractedSource)> SourceSink for F {
    fn on_source(&mut self, source: &ExtractedSource) {
        self(source);
    }
}

/// Outcome of one extraction pass.
#[derive(Debug, Default)]
pub struct ExtractionResult {
    /// Everything extracted, in map order.
    pub sources: Vec<ExtractedSource>,
    /// Structured findings (currently only `NO_EXTRACTABLE_SOURCES`).
    pub errors: Vec<ValidationError>,
    /// Walk counters.
    pub metadata: ExtractionMetadata,
}

/// Extracts embedded sources from regular maps.
pub struct SourceExtractor {
    filter: SourceFilter,
}

impl SourceExtractor {
    /// Extractor with the given inclusion filter.
    #[must_use]
    pub const fn new(filter: SourceFilter) -> Self {
        Self { filter }
    }

    /// Extractor that includes everything.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            filter: SourceFilter::default(),
        }
    }

    /// Walk one regular map. `bundle_url` and `map_url` are carried for
    /// log context only.
    #[instrument(skip_all, fields(bundle = %bundle_url, map = %map_url))]
    pub fn extract(
        &self,
        map: &SourceMapV3,
        bundle_url: &str,
        map_url: &str,
        mut sink: Option<&mut dyn SourceSink>,
    ) -> ExtractionResult {
        let mut result = ExtractionResult::default();
        result.metadata.total_sources = map.sources.len();

        let Some(contents) = map.sources_content.as_ref().filter(|c| !c.is_empty()) else {
            result.errors.push(ValidationError::new(
                ValidationCode::NoExtractableSources,
                "source map carries no sourcesContent to extract",
            ));
            return result;
        };

        for (i, source) in map.sources.iter().enumerate() {
            let Some(raw_path) = source else {
                result.metadata.skipped_count += 1;
                continue;
            };
            let Some(content) = contents.get(i).and_then(Option::as_ref) else {
                result.metadata.null_content_count += 1;
                continue;
            };

            let Some(path) = normalize_source_path(raw_path, map.source_root.as_deref()) else {
                debug!(raw = raw_path, "path normalized to nothing; skipping");
                result.metadata.skipped_count += 1;
                continue;
            };
            if !self.filter.should_include(&path) {
                result.metadata.skipped_count += 1;
                continue;
            }

            let source = ExtractedSource {
                original_path: (path != *raw_path).then(|| raw_path.clone()),
                path,
                content: content.clone(),
            };
            if let Some(sink) = sink.as_deref_mut() {
                sink.on_source(&source);
            }
            result.sources.push(source);
            result.metadata.extracted_count += 1;
        }

        debug!(
            total = result.metadata.total_sources,
            extracted = result.metadata.extracted_count,
            skipped = result.metadata.skipped_count,
            null_content = result.metadata.null_content_count,
            "extraction finished"
        );
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn map_with(
        sources: Vec<Option<&str>>,
        contents: Option<Vec<Option<&str>>>,
    ) -> SourceMapV3 {
        SourceMapV3 {
            sources: sources
                .into_iter()
                .map(|s| s.map(ToString::to_string))
                .collect(),
            sources_content: contents
                .map(|c| c.into_iter().map(|s| s.map(ToString::to_string)).collect()),
            mappings: "AAAA".to_string(),
            ..SourceMapV3::default()
        }
    }

    #[test]
    fn extracts_single_source() {
        let map = map_with(vec![Some("a.ts")], Some(vec![Some("x")]));
        let extractor = SourceExtractor::permissive();
        let result = extractor.extract(&map, "https://x/b.js", "https://x/b.js.map", None);

        assert!(result.errors.is_empty());
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].path, "a.ts");
        assert_eq!(result.sources[0].content, "x");
        assert_eq!(result.sources[0].original_path, None);
        assert_eq!(
            result.metadata,
            ExtractionMetadata {
                total_sources: 1,
                extracted_count: 1,
                skipped_count: 0,
                null_content_count: 0,
            }
        );
    }

    #[test]
    fn missing_sources_content_is_a_single_error() {
        let extractor = SourceExtractor::permissive();

        for map in [
            map_with(vec![Some("a.ts")], None),
            map_with(vec![Some("a.ts")], Some(vec![])),
        ] {
            let result = extractor.extract(&map, "b", "m", None);
            assert!(result.sources.is_empty());
            assert_eq!(result.errors.len(), 1);
            assert_eq!(result.errors[0].code, ValidationCode::NoExtractableSources);
        }
    }

    #[test]
    fn null_entries_are_counted_not_fatal() {
        let map = map_with(
            vec![None, Some("a.ts"), Some("b.ts")],
            Some(vec![Some("ignored"), None, Some("kept")]),
        );
        let extractor = SourceExtractor::permissive();
        let result = extractor.extract(&map, "b", "m", None);

        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].path, "b.ts");
        assert_eq!(result.metadata.skipped_count, 1);
        assert_eq!(result.metadata.null_content_count, 1);
        assert_eq!(result.metadata.extracted_count, 1);
    }

    #[test]
    fn content_shorter_than_sources_counts_null() {
        let map = map_with(vec![Some("a.ts"), Some("b.ts")], Some(vec![Some("only")]));
        let extractor = SourceExtractor::permissive();
        let result = extractor.extract(&map, "b", "m", None);
        assert_eq!(result.metadata.extracted_count, 1);
        assert_eq!(result.metadata.null_content_count, 1);
    }

    #[test]
    fn normalization_and_original_path() {
        let map = map_with(
            vec![Some("webpack:///./src/app.ts?hash=1")],
            Some(vec![Some("body")]),
        );
        let extractor = SourceExtractor::permissive();
        let result = extractor.extract(&map, "b", "m", None);

        assert_eq!(result.sources[0].path, "src/app.ts");
        assert_eq!(
            result.sources[0].original_path.as_deref(),
            Some("webpack:///./src/app.ts?hash=1")
        );
    }

    #[test]
    fn exclusion_filter_applies_but_node_modules_survive() {
        let filter = SourceFilter::new(&["^test/"]).unwrap();
        let map = map_with(
            vec![
                Some("test/spec.ts"),
                Some("src/app.ts"),
                Some("node_modules/@internal/pkg/index.js"),
            ],
            Some(vec![Some("1"), Some("2"), Some("3")]),
        );
        let extractor = SourceExtractor::new(filter);
        let result = extractor.extract(&map, "b", "m", None);

        let paths: Vec<&str> = result.sources.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.ts", "node_modules/@internal/pkg/index.js"]);
        assert_eq!(result.metadata.skipped_count, 1);
    }

    #[test]
    fn sink_sees_every_emitted_source_in_order() {
        let map = map_with(
            vec![Some("a.ts"), Some("b.ts")],
            Some(vec![Some("1"), Some("2")]),
        );
        let extractor = SourceExtractor::permissive();

        let mut seen = Vec::new();
        let mut sink = |source: &ExtractedSource| seen.push(source.path.clone());
        let result = extractor.extract(&map, "b", "m", Some(&mut sink));

        assert_eq!(seen, vec!["a.ts", "b.ts"]);
        assert_eq!(result.sources.len(), 2);
    }

    #[test]
    fn empty_sources_with_content_yields_empty_result() {
        let map = map_with(vec![], Some(vec![Some("orphan")]));
        let extractor = SourceExtractor::permissive();
        let result = extractor.extract(&map, "b", "m", None);
        assert!(result.errors.is_empty());
        assert!(result.sources.is_empty());
        assert_eq!(result.metadata.total_sources, 0);
    }
}
