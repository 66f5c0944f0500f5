//! Conformance battery for the source-map validator: one table of
//! payloads with the codes each must produce, plus the scenarios that
//! exercise extraction and normalization together.

use unweb_core::paths::normalize_source_path;
use unweb_core::sourcemap::{
    ParsedSourceMap, SourceMapParser, ValidationCode,
};
use unweb_core::SourceExtractor;

struct Case {
    name: &'static str,
    payload: &'static str,
    expect_valid: bool,
    expect_codes: &'static [ValidationCode],
}

const CASES: &[Case] = &[
    Case {
        name: "minimal regular map",
        payload: r#"{"version":3,"sources":["a.ts"],"sourcesContent":["x"],"mappings":"AAAA"}"#,
        expect_valid: true,
        expect_codes: &[],
    },
    Case {
        name: "empty mappings string",
        payload: r#"{"version":3,"sources":[],"mappings":""}"#,
        expect_valid: true,
        expect_codes: &[],
    },
    Case {
        name: "null source entries allowed",
        payload: r#"{"version":3,"sources":[null,"b.ts"],"mappings":""}"#,
        expect_valid: true,
        expect_codes: &[],
    },
    Case {
        name: "wrong version",
        payload: r#"{"version":2,"sources":[],"mappings":""}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::InvalidVersion],
    },
    Case {
        name: "missing version",
        payload: r#"{"sources":[],"mappings":""}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::MissingVersion],
    },
    Case {
        name: "missing sources and mappings",
        payload: r#"{"version":3}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::MissingSources, ValidationCode::MissingMappings],
    },
    Case {
        name: "mappings with empty segment",
        payload: r#"{"version":3,"sources":["a.ts"],"mappings":"AAAA,,"}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::InvalidMappingSegment],
    },
    Case {
        name: "source index out of bounds",
        payload: r#"{"version":3,"sources":["a.ts"],"mappings":"AAAA;ACAA"}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::MappingSourceIndexOutOfBounds],
    },
    Case {
        name: "name index without names",
        payload: r#"{"version":3,"sources":["a.ts"],"mappings":"AAAAC"}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::MappingNameIndexOutOfBounds],
    },
    Case {
        name: "invalid vlq character short-circuits",
        payload: r#"{"version":3,"sources":["a.ts"],"mappings":"AA!A,AAAA"}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::InvalidVlq],
    },
    Case {
        name: "ignore list out of bounds",
        payload: r#"{"version":3,"sources":["a.ts"],"mappings":"","ignoreList":[1]}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::InvalidIgnoreList],
    },
    Case {
        name: "index map with sections and mappings",
        payload: r#"{"version":3,"sections":[],"mappings":"AAAA"}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::IndexMapWithMappings],
    },
    Case {
        name: "index map overlapping offsets",
        payload: r#"{"version":3,"sections":[
            {"offset":{"line":0,"column":0},"map":{"version":3,"sources":[],"mappings":""}},
            {"offset":{"line":0,"column":0},"map":{"version":3,"sources":[],"mappings":""}}
        ]}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::IndexMapOverlap],
    },
    Case {
        name: "index map out of order",
        payload: r#"{"version":3,"sections":[
            {"offset":{"line":2,"column":0},"map":{"version":3,"sources":[],"mappings":""}},
            {"offset":{"line":1,"column":0},"map":{"version":3,"sources":[],"mappings":""}}
        ]}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::IndexMapInvalidOrder],
    },
    Case {
        name: "nested index map",
        payload: r#"{"version":3,"sections":[
            {"offset":{"line":0,"column":0},"map":{"version":3,"sections":[]}}
        ]}"#,
        expect_valid: false,
        expect_codes: &[ValidationCode::IndexMapNested],
    },
];

#[test]
fn validation_table() {
    let parser = SourceMapParser::new();
    for case in CASES {
        let outcome = parser
            .parse_bytes(case.payload.as_bytes(), case.name)
            .unwrap_or_else(|e| panic!("{}: unexpected fatal error {e}", case.name));

        assert_eq!(
            outcome.report.valid, case.expect_valid,
            "{}: validity mismatch, report {:?}",
            case.name, outcome.report
        );
        assert_eq!(
            outcome.map.is_some(),
            case.expect_valid,
            "{}: a map must be produced iff valid",
            case.name
        );
        for code in case.expect_codes {
            assert!(
                outcome.report.has_code(*code),
                "{}: missing {code}, got {:?}",
                case.name,
                outcome.report.errors
            );
        }
    }
}

#[test]
fn nested_index_map_reports_exactly_one_finding() {
    // The inner map is deliberately broken in several ways; none of its
    // findings may leak past the nesting error.
    let payload = r#"{"version":3,"sections":[
        {"offset":{"line":0,"column":0},
         "map":{"version":2,"sections":"bogus","mappings":",,"}}
    ]}"#;
    let outcome = SourceMapParser::new()
        .parse_bytes(payload.as_bytes(), "nested")
        .unwrap();
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(outcome.report.errors[0].code, ValidationCode::IndexMapNested);
}

#[test]
fn trivial_map_extracts_expected_record() {
    let payload =
        r#"{"version":3,"sources":["a.ts"],"sourcesContent":["x"],"mappings":"AAAA"}"#;
    let outcome = SourceMapParser::new()
        .parse_bytes(payload.as_bytes(), "inline")
        .unwrap();
    let Some(ParsedSourceMap::Regular(map)) = outcome.map else {
        panic!("expected a regular map");
    };

    let result = SourceExtractor::permissive().extract(&map, "bundle", "map", None);
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].path, "a.ts");
    assert_eq!(result.sources[0].content, "x");
    assert_eq!(result.metadata.total_sources, 1);
    assert_eq!(result.metadata.extracted_count, 1);
    assert_eq!(result.metadata.skipped_count, 0);
    assert_eq!(result.metadata.null_content_count, 0);
}

#[test]
fn webpack_scheme_normalization_scenario() {
    assert_eq!(
        normalize_source_path("webpack:///./src/../src/a/b.ts?vue&type=script", None).as_deref(),
        Some("src/a/b.ts")
    );
}

#[test]
fn sections_extract_in_offset_order() {
    let payload = r#"{"version":3,"sections":[
        {"offset":{"line":0,"column":0},
         "map":{"version":3,"sources":["first.ts"],"sourcesContent":["1"],"mappings":"AAAA"}},
        {"offset":{"line":10,"column":0},
         "map":{"version":3,"sources":["second.ts"],"sourcesContent":["2"],"mappings":"AAAA"}}
    ]}"#;
    let outcome = SourceMapParser::new()
        .parse_bytes(payload.as_bytes(), "index")
        .unwrap();
    assert!(outcome.report.valid, "{:?}", outcome.report);

    let map = outcome.map.expect("map");
    let extractor = SourceExtractor::permissive();
    let mut extracted = Vec::new();
    for regular in map.regular_maps() {
        let result = extractor.extract(regular, "bundle", "map", None);
        extracted.extend(result.sources.into_iter().map(|s| s.path));
    }
    assert_eq!(extracted, vec!["first.ts", "second.ts"]);
}
