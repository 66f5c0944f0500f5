//! Structural validation of decoded source-map JSON.
//!
//! Validation walks a `serde_json::Value` by hand instead of deriving
//! `Deserialize`: the contract is to accumulate every structural finding
//! into one report, and serde stops at the first mismatch. A map that
//! validates cleanly is materialized into [`SourceMapV3`] /
//! [`IndexMapV3`]; a map with findings yields `None` alongside the report.

use serde_json::Value;

use crate::sourcemap::mappings::validate_mappings;
use crate::sourcemap::types::{
    IndexMapV3, ParsedSourceMap, SectionV3, SourceMapV3, ValidationCode, ValidationError,
    ValidationReport,
};

/// Validate a decoded JSON document as either map flavor.
///
/// Dispatch: an object carrying `sections` is an index map, anything else
/// is validated as a regular map.
#[must_use]
pub fn validate_document(root: &Value) -> (Option<ParsedSourceMap>, ValidationReport) {
    let Some(object) = root.as_object() else {
        let report = ValidationReport::from_parts(
            vec![ValidationError::new(
                ValidationCode::InvalidJson,
                "source map root must be a JSON object",
            )],
            vec![],
        );
        return (None, report);
    };

    if object.contains_key("sections") {
        let (map, report) = validate_index(object);
        (map.map(ParsedSourceMap::Index), report)
    } else {
        let (map, report) = validate_regular(object, None);
        (map.map(ParsedSourceMap::Regular), report)
    }
}

/// Validate a regular V3 map.
///
/// `field_prefix` scopes findings when the map is embedded in an index-map
/// section (`sections[2].map`).
fn validate_regular(
    object: &serde_json::Map<String, Value>,
    field_prefix: Option<&str>,
) -> (Option<SourceMapV3>, ValidationReport) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let scoped = |field: &str| match field_prefix {
        Some(prefix) => format!("{prefix}.{field}"),
        None => field.to_string(),
    };

    check_version(object, &scoped("version"), &mut errors);

    // sources: required array, null entries allowed.
    let mut sources: Vec<Option<String>> = Vec::new();
    match object.get("sources") {
        None => errors.push(
            ValidationError::new(ValidationCode::MissingSources, "missing 'sources' array")
                .with_field(scoped("sources")),
        ),
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                match entry {
                    Value::Null => sources.push(None),
                    Value::String(path) => sources.push(Some(path.clone())),
                    other => {
                        errors.push(
                            ValidationError::new(
                                ValidationCode::SourcesNotArray,
                                format!("'sources' entry must be a string or null, got {}", type_name(other)),
                            )
                            .with_field(scoped(&format!("sources[{i}]"))),
                        );
                        sources.push(None);
                    },
                }
            }
        },
        Some(other) => errors.push(
            ValidationError::new(
                ValidationCode::SourcesNotArray,
                format!("'sources' must be an array, got {}", type_name(other)),
            )
            .with_field(scoped("sources")),
        ),
    }

    // mappings: required string.
    let mappings = match object.get("mappings") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => {
            errors.push(
                ValidationError::new(
                    ValidationCode::MissingMappings,
                    format!("'mappings' must be a string, got {}", type_name(other)),
                )
                .with_field(scoped("mappings")),
            );
            None
        },
        None => {
            errors.push(
                ValidationError::new(ValidationCode::MissingMappings, "missing 'mappings' string")
                    .with_field(scoped("mappings")),
            );
            None
        },
    };

    let file = optional_string(object, "file", ValidationCode::InvalidFile, &scoped, &mut errors);
    let source_root = optional_string(
        object,
        "sourceRoot",
        ValidationCode::InvalidSourceRoot,
        &scoped,
        &mut errors,
    );

    // names: optional array of strings.
    let mut names: Vec<String> = Vec::new();
    match object.get("names") {
        None => {},
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                match entry {
                    Value::String(name) => names.push(name.clone()),
                    other => {
                        errors.push(
                            ValidationError::new(
                                ValidationCode::InvalidNames,
                                format!("'names' entry must be a string, got {}", type_name(other)),
                            )
                            .with_field(scoped(&format!("names[{i}]"))),
                        );
                        names.push(String::new());
                    },
                }
            }
        },
        Some(other) => errors.push(
            ValidationError::new(
                ValidationCode::InvalidNames,
                format!("'names' must be an array, got {}", type_name(other)),
            )
            .with_field(scoped("names")),
        ),
    }

    // sourcesContent: optional array of string-or-null.
    let mut sources_content: Option<Vec<Option<String>>> = None;
    match object.get("sourcesContent") {
        None => {},
        Some(Value::Array(entries)) => {
            let mut content = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                match entry {
                    Value::Null => content.push(None),
                    Value::String(text) => content.push(Some(text.clone())),
                    other => {
                        errors.push(
                            ValidationError::new(
                                ValidationCode::InvalidSourcesContent,
                                format!(
                                    "'sourcesContent' entry must be a string or null, got {}",
                                    type_name(other)
                                ),
                            )
                            .with_field(scoped(&format!("sourcesContent[{i}]"))),
                        );
                        content.push(None);
                    },
                }
            }
            if content.len() != sources.len() {
                warnings.push(format!(
                    "sourcesContent has {} entries but sources has {}",
                    content.len(),
                    sources.len()
                ));
            }
            sources_content = Some(content);
        },
        Some(other) => errors.push(
            ValidationError::new(
                ValidationCode::InvalidSourcesContent,
                format!("'sourcesContent' must be an array, got {}", type_name(other)),
            )
            .with_field(scoped("sourcesContent")),
        ),
    }

    // ignoreList: optional array of in-bounds non-negative integers.
    let mut ignore_list: Vec<u32> = Vec::new();
    match object.get("ignoreList") {
        None => {},
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                let index = entry.as_u64().and_then(|v| u32::try_from(v).ok());
                match index {
                    Some(index) if (index as usize) < sources.len() => ignore_list.push(index),
                    _ => errors.push(
                        ValidationError::new(
                            ValidationCode::InvalidIgnoreList,
                            format!(
                                "'ignoreList' entry must be a non-negative index below {}",
                                sources.len()
                            ),
                        )
                        .with_field(scoped(&format!("ignoreList[{i}]"))),
                    ),
                }
            }
        },
        Some(other) => errors.push(
            ValidationError::new(
                ValidationCode::InvalidIgnoreList,
                format!("'ignoreList' must be an array, got {}", type_name(other)),
            )
            .with_field(scoped("ignoreList")),
        ),
    }

    // Mappings semantics, one streaming pass.
    if let Some(text) = &mappings {
        let (mapping_errors, _) = validate_mappings(text, sources.len(), names.len());
        errors.extend(mapping_errors.into_iter().map(|e| match field_prefix {
            Some(prefix) => {
                let field = e.field.clone().unwrap_or_else(|| "mappings".to_string());
                ValidationError {
                    field: Some(format!("{prefix}.{field}")),
                    ..e
                }
            },
            None => e,
        }));
    }

    let report = ValidationReport::from_parts(errors, warnings);
    if report.valid {
        let map = SourceMapV3 {
            file,
            source_root,
            sources,
            sources_content,
            names,
            mappings: mappings.unwrap_or_default(),
            ignore_list,
        };
        (Some(map), report)
    } else {
        (None, report)
    }
}

/// Validate an index map: sections of regular maps at ascending offsets.
fn validate_index(
    object: &serde_json::Map<String, Value>,
) -> (Option<IndexMapV3>, ValidationReport) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if object.contains_key("mappings") {
        errors.push(
            ValidationError::new(
                ValidationCode::IndexMapWithMappings,
                "an index map must not carry a top-level 'mappings' field",
            )
            .with_field("mappings"),
        );
    }

    check_version(object, "version", &mut errors);

    let file = match object.get("file") {
        Some(Value::String(name)) => Some(name.clone()),
        Some(other) => {
            errors.push(
                ValidationError::new(
                    ValidationCode::InvalidFile,
                    format!("'file' must be a string, got {}", type_name(other)),
                )
                .with_field("file"),
            );
            None
        },
        None => None,
    };

    let mut sections: Vec<SectionV3> = Vec::new();
    match object.get("sections") {
        Some(Value::Array(entries)) => {
            let mut previous: Option<(u32, u32)> = None;
            for (i, entry) in entries.iter().enumerate() {
                let Some(section) = entry.as_object() else {
                    errors.push(
                        ValidationError::new(
                            ValidationCode::InvalidIndexMapSections,
                            format!("section must be an object, got {}", type_name(entry)),
                        )
                        .with_field(format!("sections[{i}]")),
                    );
                    continue;
                };

                let offset = parse_offset(section.get("offset"));
                let Some((line, column)) = offset else {
                    errors.push(
                        ValidationError::new(
                            ValidationCode::InvalidIndexMapOffset,
                            "section 'offset' must be {line, column} with non-negative integers",
                        )
                        .with_field(format!("sections[{i}].offset")),
                    );
                    continue;
                };

                // Strictly ascending lexicographic order; equal is overlap.
                if let Some(prev) = previous {
                    if (line, column) == prev {
                        errors.push(
                            ValidationError::new(
                                ValidationCode::IndexMapOverlap,
                                format!("section offset ({line}, {column}) duplicates the previous section"),
                            )
                            .with_field(format!("sections[{i}].offset")),
                        );
                    } else if (line, column) < prev {
                        errors.push(
                            ValidationError::new(
                                ValidationCode::IndexMapInvalidOrder,
                                format!(
                                    "section offset ({line}, {column}) is not after ({}, {})",
                                    prev.0, prev.1
                                ),
                            )
                            .with_field(format!("sections[{i}].offset")),
                        );
                    }
                }
                previous = Some((line, column));

                match section.get("map") {
                    Some(Value::Object(inner)) => {
                        if inner.contains_key("sections") {
                            // The inner validation never runs: one nesting
                            // finding covers the whole section.
                            errors.push(
                                ValidationError::new(
                                    ValidationCode::IndexMapNested,
                                    "section maps must be regular maps, not index maps",
                                )
                                .with_field(format!("sections[{i}].map")),
                            );
                            continue;
                        }
                        let prefix = format!("sections[{i}].map");
                        let (map, inner_report) = validate_regular(inner, Some(&prefix));
                        warnings.extend(inner_report.warnings);
                        if let Some(map) = map {
                            sections.push(SectionV3 { line, column, map });
                        } else {
                            errors.extend(inner_report.errors);
                        }
                    },
                    Some(other) => errors.push(
                        ValidationError::new(
                            ValidationCode::InvalidIndexMapSectionMap,
                            format!("section 'map' must be an object, got {}", type_name(other)),
                        )
                        .with_field(format!("sections[{i}].map")),
                    ),
                    None => errors.push(
                        ValidationError::new(
                            ValidationCode::InvalidIndexMapSectionMap,
                            "section is missing its 'map'",
                        )
                        .with_field(format!("sections[{i}].map")),
                    ),
                }
            }
        },
        Some(other) => errors.push(
            ValidationError::new(
                ValidationCode::InvalidIndexMapSections,
                format!("'sections' must be an array, got {}", type_name(other)),
            )
            .with_field("sections"),
        ),
        None => {},
    }

    let report = ValidationReport::from_parts(errors, warnings);
    if report.valid {
        (Some(IndexMapV3 { file, sections }), report)
    } else {
        (None, report)
    }
}

fn check_version(
    object: &serde_json::Map<String, Value>,
    field: &str,
    errors: &mut Vec<ValidationError>,
) {
    match object.get("version") {
        None => errors.push(
            ValidationError::new(ValidationCode::MissingVersion, "missing 'version' field")
                .with_field(field.to_string()),
        ),
        Some(value) if value.as_u64() == Some(3) => {},
        Some(other) => errors.push(
            ValidationError::new(
                ValidationCode::InvalidVersion,
                format!("'version' must be 3, got {other}"),
            )
            .with_field(field.to_string()),
        ),
    }
}

fn optional_string(
    object: &serde_json::Map<String, Value>,
    key: &str,
    code: ValidationCode,
    scoped: &impl Fn(&str) -> String,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    match object.get(key) {
        None => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => {
            errors.push(
                ValidationError::new(
                    code,
                    format!("'{key}' must be a string, got {}", type_name(other)),
                )
                .with_field(scoped(key)),
            );
            None
        },
    }
}

fn parse_offset(value: Option<&Value>) -> Option<(u32, u32)> {
    let object = value?.as_object()?;
    let line = object.get("line")?.as_u64().and_then(|v| u32::try_from(v).ok())?;
    let column = object
        .get("column")?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())?;
    Some((line, column))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
