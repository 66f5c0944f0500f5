//! Source-map parsing and ECMA-426 validation.
//!
//! Three layers, consumed top to bottom:
//!
//! - [`SourceMapParser`]: decode a payload (raw JSON or `data:` URI) and
//!   run full validation, yielding a [`ParseOutcome`].
//! - [`validate_document`]: structural rules for regular and index maps
//!   over an already-decoded JSON value.
//! - [`validate_mappings`]: the single-pass streaming VLQ check.
//!
//! Validation accumulates findings; only undecodable payloads raise.

pub mod mappings;
pub mod parse;
pub mod types;
pub mod validate;

pub use mappings::{MappingsSummary, validate_mappings};
pub use parse::{DEFAULT_MAX_MAP_BYTES, ParseOutcome, SourceMapParser};
pub use types::{
    IndexMapV3, ParsedSourceMap, SectionV3, SourceMapV3, ValidationCode, ValidationError,
    ValidationReport,
};
pub use validate::validate_document;
