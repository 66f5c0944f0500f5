//! Source-map data model and structured validation findings.

use serde::{Deserialize, Serialize};

/// Closed set of validation error codes.
///
/// Codes are stable identifiers: they appear in reports, logs, and cache
/// records, and callers may map them to exit statuses. New findings must
/// reuse an existing code or extend this enum, never invent strings.
/// Serialization goes through [`ValidationCode::as_str`] so the wire
/// spelling never drifts from the documented one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    /// Root JSON is not an object.
    InvalidJson,
    /// `version` is present but not the integer 3.
    InvalidVersion,
    /// `version` is absent.
    MissingVersion,
    /// `sources` is absent.
    MissingSources,
    /// `mappings` is absent or not a string.
    MissingMappings,
    /// `sources` is not an array (or carries entries that are neither
    /// string nor null).
    SourcesNotArray,
    /// `sourceRoot` is not a string.
    InvalidSourceRoot,
    /// `names` is not an array of strings.
    InvalidNames,
    /// `file` is not a string.
    InvalidFile,
    /// `sourcesContent` is not an array of string-or-null entries.
    InvalidSourcesContent,
    /// `ignoreList` is not an array of in-bounds non-negative integers.
    InvalidIgnoreList,
    /// `sections` is not an array of objects.
    InvalidIndexMapSections,
    /// A section `offset` is missing or malformed.
    InvalidIndexMapOffset,
    /// A section `map` is missing or not an object.
    InvalidIndexMapSectionMap,
    /// Two sections share an offset.
    IndexMapOverlap,
    /// Section offsets are not strictly ascending.
    IndexMapInvalidOrder,
    /// A section map is itself an index map.
    IndexMapNested,
    /// `sections` and `mappings` are both present.
    IndexMapWithMappings,
    /// A VLQ value failed to decode.
    InvalidVlq,
    /// A mapping segment has an invalid field count or is empty.
    InvalidMappingSegment,
    /// A source index stepped outside `[0, sources.len())`.
    MappingSourceIndexOutOfBounds,
    /// A name index stepped outside `[0, names.len())`.
    MappingNameIndexOutOfBounds,
    /// An accumulated position became negative.
    MappingNegativeValue,
    /// A raw decoded value left the signed 32-bit range.
    MappingValueExceeds32Bits,
    /// The map has no usable `sourcesContent` to extract.
    NoExtractableSources,
    /// No source map could be discovered for a bundle.
    NoSourceMapFound,
    /// The map payload exceeded the configured size ceiling.
    SourceMapTooLarge,
}

impl ValidationCode {
    /// Stable SCREAMING_SNAKE_CASE identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "INVALID_JSON",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::MissingVersion => "MISSING_VERSION",
            Self::MissingSources => "MISSING_SOURCES",
            Self::MissingMappings => "MISSING_MAPPINGS",
            Self::SourcesNotArray => "SOURCES_NOT_ARRAY",
            Self::InvalidSourceRoot => "INVALID_SOURCE_ROOT",
            Self::InvalidNames => "INVALID_NAMES",
            Self::InvalidFile => "INVALID_FILE",
            Self::InvalidSourcesContent => "INVALID_SOURCES_CONTENT",
            Self::InvalidIgnoreList => "INVALID_IGNORE_LIST",
            Self::InvalidIndexMapSections => "INVALID_INDEX_MAP_SECTIONS",
            Self::InvalidIndexMapOffset => "INVALID_INDEX_MAP_OFFSET",
            Self::InvalidIndexMapSectionMap => "INVALID_INDEX_MAP_SECTION_MAP",
            Self::IndexMapOverlap => "INDEX_MAP_OVERLAP",
            Self::IndexMapInvalidOrder => "INDEX_MAP_INVALID_ORDER",
            Self::IndexMapNested => "INDEX_MAP_NESTED",
            Self::IndexMapWithMappings => "INDEX_MAP_WITH_MAPPINGS",
            Self::InvalidVlq => "INVALID_VLQ",
            Self::InvalidMappingSegment => "INVALID_MAPPING_SEGMENT",
            Self::MappingSourceIndexOutOfBounds => "MAPPING_SOURCE_INDEX_OUT_OF_BOUNDS",
            Self::MappingNameIndexOutOfBounds => "MAPPING_NAME_INDEX_OUT_OF_BOUNDS",
            Self::MappingNegativeValue => "MAPPING_NEGATIVE_VALUE",
            Self::MappingValueExceeds32Bits => "MAPPING_VALUE_EXCEEDS_32_BITS",
            Self::NoExtractableSources => "NO_EXTRACTABLE_SOURCES",
            Self::NoSourceMapFound => "NO_SOURCE_MAP_FOUND",
            Self::SourceMapTooLarge => "SOURCE_MAP_TOO_LARGE",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        const ALL: &[ValidationCode] = &[
            ValidationCode::InvalidJson,
            ValidationCode::InvalidVersion,
            ValidationCode::MissingVersion,
            ValidationCode::MissingSources,
            ValidationCode::MissingMappings,
            ValidationCode::SourcesNotArray,
            ValidationCode::InvalidSourceRoot,
            ValidationCode::InvalidNames,
            ValidationCode::InvalidFile,
            ValidationCode::InvalidSourcesContent,
            ValidationCode::InvalidIgnoreList,
            ValidationCode::InvalidIndexMapSections,
            ValidationCode::InvalidIndexMapOffset,
            ValidationCode::InvalidIndexMapSectionMap,
            ValidationCode::IndexMapOverlap,
            ValidationCode::IndexMapInvalidOrder,
            ValidationCode::IndexMapNested,
            ValidationCode::IndexMapWithMappings,
            ValidationCode::InvalidVlq,
            ValidationCode::InvalidMappingSegment,
            ValidationCode::MappingSourceIndexOutOfBounds,
            ValidationCode::MappingNameIndexOutOfBounds,
            ValidationCode::MappingNegativeValue,
            ValidationCode::MappingValueExceeds32Bits,
            ValidationCode::NoExtractableSources,
            ValidationCode::NoSourceMapFound,
            ValidationCode::SourceMapTooLarge,
        ];
        ALL.iter().copied().find(|code| code.as_str() == text)
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValidationCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValidationCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown validation code '{text}'")))
    }
}

/// One structured validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// Which rule was violated.
    pub code: ValidationCode,
    /// Single-sentence human-readable description.
    pub message: String,
    /// JSON-pointer-ish field context (`sources[3]`, `sections[1].map`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationError {
    /// Create a finding without field context.
    #[must_use]
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    /// Attach field context.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {} ({field})", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Aggregated outcome of validating one source map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// `true` iff no errors were recorded (warnings do not fail a map).
    pub valid: bool,
    /// Structured findings.
    pub errors: Vec<ValidationError>,
    /// Free-form advisory notes.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Build a report from accumulated findings.
    #[must_use]
    pub fn from_parts(errors: Vec<ValidationError>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Whether any finding carries the given code.
    #[must_use]
    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// A validated regular (non-index) V3 source map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMapV3 {
    /// Optional generated-file name.
    pub file: Option<String>,
    /// Optional root prepended to `sources` entries.
    pub source_root: Option<String>,
    /// Source paths; entries may be null.
    pub sources: Vec<Option<String>>,
    /// Embedded source contents, parallel to `sources`; may be shorter.
    pub sources_content: Option<Vec<Option<String>>>,
    /// Symbol names referenced by mappings.
    pub names: Vec<String>,
    /// The raw VLQ mappings string.
    pub mappings: String,
    /// Indices into `sources` marked as third-party.
    pub ignore_list: Vec<u32>,
}

impl SourceMapV3 {
    /// Whether any non-null embedded content exists.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.sources_content
            .as_ref()
            .is_some_and(|content| content.iter().any(Option::is_some))
    }
}

/// A section of an index map: a regular map placed at a generated offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionV3 {
    /// Zero-based generated line offset.
    pub line: u32,
    /// Zero-based generated column offset.
    pub column: u32,
    /// The embedded regular map. Nesting of index maps is forbidden.
    pub map: SourceMapV3,
}

/// A validated V3 index map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMapV3 {
    /// Optional generated-file name.
    pub file: Option<String>,
    /// Sections in strictly ascending offset order.
    pub sections: Vec<SectionV3>,
}

/// Either flavor of parsed source map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSourceMap {
    /// A plain regular map.
    Regular(SourceMapV3),
    /// An index map with embedded regular maps.
    Index(IndexMapV3),
}

impl ParsedSourceMap {
    /// Iterate the regular maps contained in this map (itself, or each
    /// section's map for index maps). Extraction consumes these in order.
    pub fn regular_maps(&self) -> Box<dyn Iterator<Item = &SourceMapV3> + '_> {
        match self {
            Self::Regular(map) => Box::new(std::iter::once(map)),
            Self::Index(index) => Box::new(index.sections.iter().map(|s| &s.map)),
        }
    }
}
