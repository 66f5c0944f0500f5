//! # unweb-core
//!
//! Core functionality for unweb: reconstructing buildable projects from
//! deployed websites.
//!
//! Two tightly coupled subsystems live here:
//!
//! - **Source-map parsing and extraction**: strict ECMA-426 validation
//!   (structural rules plus a single-pass streaming VLQ check), source
//!   extraction with path sanitization, and safe reconstruction to disk.
//! - **Package identification**: versioned fingerprinting of extracted
//!   bundles against the npm registry (clean, minified, and structural
//!   strategies), backed by a namespaced two-tier TTL cache.
//!
//! ## Quick start
//!
//! ```no_run
//! use unweb_core::{
//!     Fetcher, FetchOptions, SourceExtractor, SourceMapDiscovery, SourceMapParser,
//! };
//!
//! # async fn example() -> unweb_core::Result<()> {
//! let fetcher = Fetcher::new()?;
//! let bundle_url = "https://app.example.com/static/js/main.js";
//! let bundle = fetcher.fetch(bundle_url, &FetchOptions::default()).await?;
//!
//! let discovery = SourceMapDiscovery::new(&fetcher);
//! let found = discovery.discover(bundle_url, &bundle).await;
//!
//! if let Some(map_url) = found.source_map_url {
//!     let map_bytes = fetcher.fetch(&map_url, &FetchOptions::default()).await?;
//!     let outcome = SourceMapParser::new().parse_auto(map_bytes.bytes(), &map_url)?;
//!     if let Some(map) = outcome.map {
//!         let extractor = SourceExtractor::permissive();
//!         for regular in map.regular_maps() {
//!             let result = extractor.extract(regular, bundle_url, &map_url, None);
//!             println!("extracted {} files", result.metadata.extracted_count);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Operations that can produce partial results never raise for content
//! problems: validation and extraction accumulate structured findings and
//! still return. Only transport failures, unreadable root JSON, and
//! storage setup problems surface as [`Error`].

/// External syntax-analysis contract consumed by fingerprinting
pub mod ast;
/// Namespaced two-tier TTL cache
pub mod cache;
/// Global TOML configuration
pub mod config;
/// Source-map discovery strategies for fetched bundles
pub mod discovery;
/// Error types and result alias
pub mod error;
/// Source extraction from parsed maps
pub mod extract;
/// HTTP fetch contract
pub mod fetcher;
/// Content hashing, minification heuristics, feature sets
pub mod fingerprint;
/// Generated package manifests from match results
pub mod manifest_gen;
/// Version matching against the registry
pub mod matcher;
/// Batched multi-package identification
pub mod orchestrate;
/// Source-path normalization and filtering
pub mod paths;
/// npm registry and CDN client
pub mod registry;
/// Reconstruction of extracted sources to disk
pub mod reconstruct;
/// Source-map parsing and ECMA-426 validation
pub mod sourcemap;
/// Shared data types
pub mod types;
/// Base64 VLQ primitives
pub mod vlq;

// Re-export commonly used types
pub use cache::{Cache, CacheStats};
pub use config::Config;
pub use discovery::{DiscoveryResult, DiscoveryStrategy, SourceMapDiscovery};
pub use error::{Error, FatalParseCode, NetworkErrorKind, Result};
pub use extract::{ExtractionResult, SourceExtractor, SourceSink};
pub use fetcher::{AbortHandle, AbortSignal, FetchOptions, FetchResponse, Fetcher, abort_pair};
pub use fingerprint::FingerprintEngine;
pub use manifest_gen::{ManifestOptions, build_package_json};
pub use matcher::{ExtractedPackage, MatchOptions, VersionMatcher};
pub use orchestrate::{BatchOptions, BatchSearcher, ProgressEvent, ProgressObserver};
pub use reconstruct::{ExtractionManifest, ReconstructStats, Reconstructor, bundle_name_from_url};
pub use registry::RegistryClient;
pub use sourcemap::{
    ParseOutcome, ParsedSourceMap, SourceMapParser, SourceMapV3, ValidationCode, ValidationError,
    ValidationReport,
};
pub use types::*;
