//! Content fingerprinting: hashes, declaration signatures, minification
//! heuristics, and minification-resistant feature sets.
//!
//! A fingerprint is the identity surrogate used to compare an extracted
//! bundle against registry versions without byte equality: minifiers
//! rewrite identifiers and whitespace but rarely touch string literals,
//! call shapes, or numeric constants. Everything here is pure and
//! synchronous; comment stripping and declaration scanning come from the
//! injected [`SyntaxAnalyzer`].

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use md5::{Digest, Md5};
use regex::Regex;

use crate::ast::SyntaxAnalyzer;
use crate::types::{FeatureSet, Fingerprint};

/// Minimum signature-name length; one- and two-character names are
/// minifier output and carry no identity.
const MIN_SIGNATURE_NAME_LEN: usize = 3;

/// Minimum kept string-literal length.
const MIN_STRING_FEATURE_LEN: usize = 6;

// Minification heuristics. Calibrated against bundler output; tune
// together, not individually.
const MINIFIED_AVG_LINE_LEN: f64 = 200.0;
const MINIFIED_WHITESPACE_RATIO: f64 = 0.08;
const MINIFIED_SHORT_ARGS_PER_KCHAR: f64 = 3.0;
const MINIFIED_SEMICOLONS_PER_LINE: f64 = 8.0;
const COMBINED_AVG_LINE_LEN: f64 = 150.0;
const COMBINED_WHITESPACE_RATIO: f64 = 0.15;

/// md5 of raw bytes as lowercase hex.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().fold(String::with_capacity(32), |mut acc, b| {
        use std::fmt::Write as _;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Collapse every whitespace run to a single space and trim the ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_whitespace() {
            in_run = true;
        } else {
            if in_run && !out.is_empty() {
                out.push(' ');
            }
            in_run = false;
            out.push(c);
        }
    }
    out
}

/// Computes fingerprints using an injected syntax analyzer.
pub struct FingerprintEngine {
    analyzer: Arc<dyn SyntaxAnalyzer>,
}

impl FingerprintEngine {
    /// Engine backed by the given analyzer.
    #[must_use]
    pub fn new(analyzer: Arc<dyn SyntaxAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Full fingerprint of a content buffer.
    #[must_use]
    pub fn fingerprint(&self, content: &str) -> Fingerprint {
        Fingerprint {
            content_hash: md5_hex(content.as_bytes()),
            normalized_hash: self.normalized_hash(content),
            signature: self.signature(content),
            content_length: content.len(),
            minified: is_probably_minified(content),
        }
    }

    /// md5 over comment-stripped, whitespace-collapsed content.
    ///
    /// Stable across formatting changes and license-banner swaps.
    #[must_use]
    pub fn normalized_hash(&self, content: &str) -> String {
        let stripped = self.analyzer.strip_comments(content);
        md5_hex(collapse_whitespace(&stripped).as_bytes())
    }

    /// Sorted unique declaration names longer than two characters, joined
    /// with `|`. Empty when nothing qualifies.
    #[must_use]
    pub fn signature(&self, content: &str) -> String {
        let names: BTreeSet<String> = self
            .analyzer
            .declaration_names(content)
            .into_iter()
            .filter(|name| name.len() >= MIN_SIGNATURE_NAME_LEN)
            .collect();
        names.into_iter().collect::<Vec<_>>().join("|")
    }
}

/// Content-only minification heuristic. Never consults the filename.
#[must_use]
pub fn is_probably_minified(content: &str) -> bool {
    if content.is_empty() {
        return false;
    }

    let total = content.len() as f64;
    let lines = content.lines().count().max(1) as f64;
    let avg_line_len = total / lines;
    let whitespace = content.chars().filter(|c| c.is_whitespace()).count() as f64;
    let whitespace_ratio = whitespace / total;
    let has_comments = content.contains("//") || content.contains("/*");

    if avg_line_len > MINIFIED_AVG_LINE_LEN {
        return true;
    }
    if whitespace_ratio < MINIFIED_WHITESPACE_RATIO {
        return true;
    }

    #[allow(clippy::unwrap_used)]
    static SHORT_ARG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[,(]\s*[A-Za-z]\s*[,)]").unwrap());
    let short_args = SHORT_ARG.find_iter(content).count() as f64;
    if short_args / (total / 1000.0) > MINIFIED_SHORT_ARGS_PER_KCHAR {
        return true;
    }

    let semicolons = content.bytes().filter(|b| *b == b';').count() as f64;
    if semicolons / lines > MINIFIED_SEMICOLONS_PER_LINE && !has_comments {
        return true;
    }

    avg_line_len > COMBINED_AVG_LINE_LEN
        && whitespace_ratio < COMBINED_WHITESPACE_RATIO
        && !has_comments
}

/// Extract minification-resistant features from a content buffer.
#[must_use]
pub fn extract_features(content: &str) -> FeatureSet {
    FeatureSet {
        strings: string_literals(content),
        calls: call_patterns(content),
        numbers: numeric_constants(content),
        content_length: content.len(),
    }
}

/// Union of features across multiple buffers, length summed. Used for
/// modular packages where no single entry file is representative.
#[must_use]
pub fn aggregate_features<'a>(contents: impl IntoIterator<Item = &'a str>) -> FeatureSet {
    let mut aggregate = FeatureSet::default();
    for content in contents {
        let features = extract_features(content);
        aggregate.strings.extend(features.strings);
        aggregate.calls.extend(features.calls);
        aggregate.numbers.extend(features.numbers);
        aggregate.content_length += features.content_length;
    }
    aggregate
}

/// String literals longer than [`MIN_STRING_FEATURE_LEN`] minus one,
/// unquoted and trimmed. Handles escapes; template literals are captured
/// without interpolation handling (the raw span between backticks).
fn string_literals(content: &str) -> BTreeSet<String> {
    let bytes = content.as_bytes();
    let mut out = BTreeSet::new();
    let mut i = 0;
    while i < bytes.len() {
        let quote = bytes[i];
        if quote == b'"' || quote == b'\'' || quote == b'`' {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() {
                if bytes[j] == b'\\' {
                    j += 2;
                    continue;
                }
                if bytes[j] == quote {
                    break;
                }
                // Plain strings do not span lines; templates do.
                if quote != b'`' && bytes[j] == b'\n' {
                    break;
                }
                j += 1;
            }
            if j < bytes.len() && bytes[j] == quote {
                if let Ok(raw) = std::str::from_utf8(&bytes[start..j]) {
                    let trimmed = raw.trim();
                    if trimmed.len() >= MIN_STRING_FEATURE_LEN {
                        out.insert(trimmed.to_string());
                    }
                }
                i = j + 1;
                continue;
            }
            // Unterminated literal: skip the opening quote.
            i = start;
            continue;
        }
        i += 1;
    }
    out
}

/// Call patterns as `name:arity`, where arity is the argument count
/// implied by top-level commas within the first parenthesized list.
fn call_patterns(content: &str) -> BTreeSet<String> {
    #[allow(clippy::unwrap_used)]
    static CALL_HEAD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"([A-Za-z_$][A-Za-z0-9_$]*)\s*\(").unwrap());

    let bytes = content.as_bytes();
    let mut out = BTreeSet::new();
    for capture in CALL_HEAD.captures_iter(content) {
        #[allow(clippy::unwrap_used)]
        let name = capture.get(1).unwrap();
        if matches!(
            name.as_str(),
            "if" | "for" | "while" | "switch" | "catch" | "return" | "function" | "typeof"
        ) {
            continue;
        }
        #[allow(clippy::unwrap_used)]
        let open = capture.get(0).unwrap().end() - 1;

        let mut depth = 0usize;
        let mut commas = 0usize;
        let mut non_ws = false;
        let mut j = open;
        while j < bytes.len() {
            match bytes[j] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                },
                b',' if depth == 1 => commas += 1,
                b if depth >= 1 && !b.is_ascii_whitespace() => non_ws = true,
                _ => {},
            }
            j += 1;
        }
        if j >= bytes.len() {
            continue;
        }
        let arity = if non_ws { commas + 1 } else { 0 };
        out.insert(format!("{}:{arity}", name.as_str()));
    }
    out
}

/// Numeric constants worth matching on: three or more digits, or any
/// decimal number.
fn numeric_constants(content: &str) -> BTreeSet<String> {
    #[allow(clippy::unwrap_used)]
    static NUMBER: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(\d+\.\d+|\d{3,})\b").unwrap());
    NUMBER
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}
