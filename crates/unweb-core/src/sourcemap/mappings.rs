//! Single-pass streaming validation of the `mappings` string.
//!
//! The string is a `;`-separated list of line groups, each a `,`-separated
//! list of VLQ segments. Delta accumulators persist across the whole string
//! except the generated column, which resets at every `;`. The validator
//! decodes every segment exactly once, accumulates findings, and returns
//! early only when it hits a byte that cannot be a VLQ digit; past that
//! point the stream has no recoverable structure.

use crate::sourcemap::{ValidationCode, ValidationError};
use crate::vlq::{self, MAX_SEGMENT_FIELDS, VlqError};

/// Final accumulator state and counts after a validation pass.
///
/// For a valid string, each persistent accumulator equals the sum of its
/// deltas over every segment, and `generated_column` equals the delta sum
/// within the final line group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingsSummary {
    /// Number of line groups (semicolon count + 1 for non-empty input).
    pub lines: usize,
    /// Number of decoded segments.
    pub segments: usize,
    /// Generated-column accumulator at end of input (resets per line).
    pub generated_column: i64,
    /// Source-index accumulator at end of input.
    pub source_index: i64,
    /// Original-line accumulator at end of input.
    pub original_line: i64,
    /// Original-column accumulator at end of input.
    pub original_column: i64,
    /// Name-index accumulator at end of input.
    pub name_index: i64,
}

/// Validate a mappings string against its map's `sources` and `names`.
///
/// Returns every finding plus the summary. Findings past the first are
/// best-effort: once an accumulator has been knocked out of range the
/// stream keeps decoding, so later findings may cascade from an earlier
/// one.
#[must_use]
pub fn validate_mappings(
    mappings: &str,
    sources_len: usize,
    names_len: usize,
) -> (Vec<ValidationError>, MappingsSummary) {
    let bytes = mappings.as_bytes();
    let mut errors = Vec::new();
    let mut summary = MappingsSummary {
        lines: usize::from(!bytes.is_empty()),
        ..MappingsSummary::default()
    };

    let mut cursor = 0usize;
    let mut line = 0usize;
    // True when a comma was just consumed: a segment must follow before
    // the next separator or end of input.
    let mut after_comma = false;
    let mut fields = [0i64; MAX_SEGMENT_FIELDS];

    while cursor < bytes.len() {
        match bytes[cursor] {
            b';' => {
                if after_comma {
                    errors.push(empty_segment(line));
                    after_comma = false;
                }
                line += 1;
                summary.lines = line + 1;
                summary.generated_column = 0;
                cursor += 1;
            },
            b',' => {
                // A comma in segment position means the segment was empty:
                // leading comma or two consecutive separators.
                errors.push(empty_segment(line));
                cursor += 1;
                after_comma = true;
            },
            _ => {
                let count = match vlq::decode_segment(bytes, &mut cursor, &mut fields) {
                    Ok(count) => count,
                    Err(VlqError::InvalidChar(pos)) => {
                        errors.push(
                            ValidationError::new(
                                ValidationCode::InvalidVlq,
                                format!(
                                    "invalid base64 character {:?} at offset {pos} in mappings",
                                    char::from(bytes[pos])
                                ),
                            )
                            .with_field("mappings"),
                        );
                        // Nothing after this byte can be trusted.
                        return (errors, summary);
                    },
                    Err(VlqError::Incomplete) => {
                        errors.push(
                            ValidationError::new(
                                ValidationCode::InvalidVlq,
                                format!("incomplete VLQ value in line {line}"),
                            )
                            .with_field("mappings"),
                        );
                        after_comma = consume_separator(bytes, &mut cursor, &mut line, &mut summary);
                        continue;
                    },
                };

                validate_segment(
                    &fields,
                    count,
                    line,
                    sources_len,
                    names_len,
                    &mut summary,
                    &mut errors,
                );
                after_comma = consume_separator(bytes, &mut cursor, &mut line, &mut summary);
            },
        }
    }

    if after_comma {
        errors.push(empty_segment(line));
    }

    (errors, summary)
}

fn empty_segment(line: usize) -> ValidationError {
    ValidationError::new(
        ValidationCode::InvalidMappingSegment,
        format!("empty segment in line {line}"),
    )
    .with_field("mappings")
}

/// Consume the separator following a segment, updating line state.
/// Returns the new `after_comma` flag.
fn consume_separator(
    bytes: &[u8],
    cursor: &mut usize,
    line: &mut usize,
    summary: &mut MappingsSummary,
) -> bool {
    if *cursor >= bytes.len() {
        return false;
    }
    match bytes[*cursor] {
        b',' => {
            *cursor += 1;
            true
        },
        b';' => {
            *cursor += 1;
            *line += 1;
            summary.lines = *line + 1;
            summary.generated_column = 0;
            false
        },
        _ => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn validate_segment(
    fields: &[i64; MAX_SEGMENT_FIELDS],
    count: usize,
    line: usize,
    sources_len: usize,
    names_len: usize,
    summary: &mut MappingsSummary,
    errors: &mut Vec<ValidationError>,
) {
    summary.segments += 1;

    if !matches!(count, 1 | 4 | 5) {
        errors.push(
            ValidationError::new(
                ValidationCode::InvalidMappingSegment,
                format!("segment in line {line} has {count} fields, expected 1, 4, or 5"),
            )
            .with_field("mappings"),
        );
    }
    let usable = count.min(MAX_SEGMENT_FIELDS);

    for &value in &fields[..usable] {
        if !vlq::within_32_bits(value) {
            errors.push(
                ValidationError::new(
                    ValidationCode::MappingValueExceeds32Bits,
                    format!("VLQ value {value} in line {line} exceeds signed 32-bit range"),
                )
                .with_field("mappings"),
            );
        }
    }

    summary.generated_column += fields[0];
    if summary.generated_column < 0 {
        errors.push(
            ValidationError::new(
                ValidationCode::MappingNegativeValue,
                format!(
                    "generated column became {} in line {line}",
                    summary.generated_column
                ),
            )
            .with_field("mappings"),
        );
    }

    if usable >= 4 {
        summary.source_index += fields[1];
        if summary.source_index < 0 || summary.source_index >= sources_len as i64 {
            errors.push(
                ValidationError::new(
                    ValidationCode::MappingSourceIndexOutOfBounds,
                    format!(
                        "source index {} in line {line} outside [0, {sources_len})",
                        summary.source_index
                    ),
                )
                .with_field("mappings"),
            );
        }

        summary.original_line += fields[2];
        if summary.original_line < 0 {
            errors.push(
                ValidationError::new(
                    ValidationCode::MappingNegativeValue,
                    format!(
                        "original line became {} in line {line}",
                        summary.original_line
                    ),
                )
                .with_field("mappings"),
            );
        }

        summary.original_column += fields[3];
        if summary.original_column < 0 {
            errors.push(
                ValidationError::new(
                    ValidationCode::MappingNegativeValue,
                    format!(
                        "original column became {} in line {line}",
                        summary.original_column
                    ),
                )
                .with_field("mappings"),
            );
        }
    }

    if usable >= 5 {
        summary.name_index += fields[4];
        if summary.name_index < 0 || summary.name_index >= names_len as i64 {
            errors.push(
                ValidationError::new(
                    ValidationCode::MappingNameIndexOutOfBounds,
                    format!(
                        "name index {} in line {line} outside [0, {names_len})",
                        summary.name_index
                    ),
                )
                .with_field("mappings"),
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn codes(errors: &[ValidationError]) -> Vec<ValidationCode> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn accepts_trivial_mapping() {
        let (errors, summary) = validate_mappings("AAAA", 1, 0);
        assert!(errors.is_empty());
        assert_eq!(summary.segments, 1);
        assert_eq!(summary.lines, 1);
        assert_eq!(summary.source_index, 0);
    }

    #[test]
    fn accepts_empty_string_and_empty_lines() {
        let (errors, summary) = validate_mappings("", 1, 0);
        assert!(errors.is_empty());
        assert_eq!(summary.lines, 0);

        let (errors, summary) = validate_mappings(";;;", 1, 0);
        assert!(errors.is_empty());
        assert_eq!(summary.lines, 4);
        assert_eq!(summary.segments, 0);
    }

    #[test]
    fn flags_empty_segments() {
        // Trailing double comma: one decoded segment, two empty ones.
        let (errors, _) = validate_mappings("AAAA,,", 1, 0);
        assert!(
            codes(&errors).contains(&ValidationCode::InvalidMappingSegment),
            "expected empty-segment finding, got {errors:?}"
        );
        assert!(errors[0].message.contains("empty segment"));

        let (errors, _) = validate_mappings(",AAAA", 1, 0);
        assert_eq!(errors[0].code, ValidationCode::InvalidMappingSegment);

        // Comma immediately before a line break.
        let (errors, _) = validate_mappings("AAAA,;AACA", 1, 0);
        assert_eq!(errors[0].code, ValidationCode::InvalidMappingSegment);
    }

    #[test]
    fn generated_column_resets_per_line() {
        // Line 0 advances to column 4; line 1 starts over at 2.
        let (errors, summary) = validate_mappings("IAAA;EAAA", 1, 0);
        assert!(errors.is_empty());
        assert_eq!(summary.generated_column, 2);
        assert_eq!(summary.lines, 2);
    }

    #[test]
    fn source_index_out_of_bounds_across_lines() {
        // Second line's source delta pushes the accumulator to 1 with only
        // one source available.
        let (errors, summary) = validate_mappings("AAAA;ACAA", 1, 0);
        assert_eq!(codes(&errors), vec![ValidationCode::MappingSourceIndexOutOfBounds]);
        assert_eq!(summary.source_index, 1);

        // A generated-column delta on the second line is fine.
        let (errors, _) = validate_mappings("AAAA;CAAA", 1, 0);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn name_index_out_of_bounds() {
        // Five-field segment with name delta 1 and zero names.
        let (errors, _) = validate_mappings("AAAAC", 1, 0);
        assert_eq!(codes(&errors), vec![ValidationCode::MappingNameIndexOutOfBounds]);

        // One name available: delta 0 is fine.
        let (errors, _) = validate_mappings("AAAAA", 1, 1);
        assert!(errors.is_empty());
    }

    #[test]
    fn negative_generated_column() {
        // 'D' decodes to -1.
        let (errors, _) = validate_mappings("D", 1, 0);
        assert_eq!(codes(&errors), vec![ValidationCode::MappingNegativeValue]);
    }

    #[test]
    fn invalid_field_counts() {
        let (errors, _) = validate_mappings("AA", 1, 0);
        assert_eq!(codes(&errors), vec![ValidationCode::InvalidMappingSegment]);

        let (errors, _) = validate_mappings("AAA", 1, 0);
        assert_eq!(codes(&errors), vec![ValidationCode::InvalidMappingSegment]);

        let (errors, _) = validate_mappings("AAAAAA", 1, 0);
        assert_eq!(codes(&errors), vec![ValidationCode::InvalidMappingSegment]);
    }

    #[test]
    fn invalid_char_short_circuits() {
        let (errors, _) = validate_mappings("AAAA,A!AA,AAAA", 1, 0);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::InvalidVlq);
        assert!(errors[0].message.contains("offset 6"));
    }

    #[test]
    fn incomplete_vlq_continues_validation() {
        // 'g' leaves a continuation bit hanging; the next line still gets
        // validated and reports its own finding.
        let (errors, _) = validate_mappings("g;ACAA", 1, 0);
        assert_eq!(
            codes(&errors),
            vec![
                ValidationCode::InvalidVlq,
                ValidationCode::MappingSourceIndexOutOfBounds,
            ]
        );
    }

    #[test]
    fn boundary_32_bit_values() {
        // +maxint32 = 2147483647 encodes as "+/////D", -maxint32 as "//////D".
        let (errors, summary) = validate_mappings("+/////D", 1, 0);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(summary.generated_column, i64::from(i32::MAX));

        let (errors, _) = validate_mappings("ggggggE", 1, 0);
        // 2^31 exactly: out of range.
        assert_eq!(codes(&errors)[0], ValidationCode::MappingValueExceeds32Bits);
    }

    #[test]
    fn accumulators_equal_delta_sums() {
        // Two four-field segments on one line plus one on a second line.
        let (errors, summary) = validate_mappings("AAAA,CACA;ACAC", 2, 0);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(summary.segments, 3);
        // source deltas: 0, 0, 1 → 1; original line deltas: 0, 1, 0 → 1;
        // original column deltas: 0, 0, 1 → 1.
        assert_eq!(summary.source_index, 1);
        assert_eq!(summary.original_line, 1);
        assert_eq!(summary.original_column, 1);
        // generated column resets on line 2: delta 0.
        assert_eq!(summary.generated_column, 0);
    }
}
