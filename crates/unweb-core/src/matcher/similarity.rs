//! Similarity scoring between extracted content and registry versions.
//!
//! Three scores, cheapest first:
//!
//! - S1 ([`clean_similarity`]): hash identity, then declaration-signature
//!   Jaccard bands, then a length-ratio fallback.
//! - S2 ([`minified_similarity`]): weighted Jaccard over
//!   minification-resistant feature sets.
//! - S3: S2's formula applied to aggregated multi-file features (the
//!   caller supplies the aggregate set; the formula is shared).
//!
//! The constants below are calibration parameters tuned against a corpus
//! of real bundles. Keep them together; changing one shifts the meaning
//! of the confidence thresholds downstream.

use std::collections::BTreeSet;

use crate::types::{FeatureSet, Fingerprint};

/// Score for identical normalized hashes.
pub const SCORE_NORMALIZED_EQUAL: f64 = 1.0;
/// Score for identical raw content hashes.
pub const SCORE_CONTENT_EQUAL: f64 = 0.99;

// Signature-Jaccard bands: [0.8, 1.0] maps to [0.85, 0.95] and
// [0.5, 0.8) maps to [0.70, 0.85).
const SIGNATURE_HIGH_JACCARD: f64 = 0.8;
const SIGNATURE_LOW_JACCARD: f64 = 0.5;

// Length-ratio fallback scales. Empirical; see the module docs.
const LOW_RATIO_CUTOFF: f64 = 0.10;
const LOW_RATIO_SCALE: f64 = 0.3;
const RATIO_SCALE: f64 = 0.5;

// Feature-set weights for the minified comparison.
const WEIGHT_STRINGS: f64 = 0.35;
const WEIGHT_CALLS: f64 = 0.35;
const WEIGHT_NUMBERS: f64 = 0.15;
const WEIGHT_LENGTH: f64 = 0.15;
const STRONG_AGREEMENT_BONUS: f64 = 0.10;
const STRONG_AGREEMENT_FLOOR: f64 = 0.5;

// Structural filename-match weights.
const WEIGHT_PUBLIC_FILES: f64 = 0.6;
const WEIGHT_INTERNAL_FILES: f64 = 0.4;
const STRUCTURAL_SUBSET_BONUS: f64 = 0.15;
const STRUCTURAL_SUBSET_FLOOR: f64 = 0.7;

/// Jaccard index of two sets; 0.0 when both are empty.
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Jaccard that treats two empty sets as agreeing (used for structural
/// halves where "no internal files" on both sides is a match).
fn jaccard_vacuous(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        1.0
    } else {
        jaccard(a, b)
    }
}

/// Ratio of the smaller to the larger length; 0.0 when either is zero.
#[must_use]
pub fn length_ratio(a: usize, b: usize) -> f64 {
    if a == 0 || b == 0 {
        return 0.0;
    }
    let (small, large) = if a <= b { (a, b) } else { (b, a) };
    small as f64 / large as f64
}

/// S1: compare an extracted fingerprint against a clean registry
/// fingerprint.
#[must_use]
pub fn clean_similarity(extracted: &Fingerprint, candidate: &Fingerprint) -> f64 {
    if !extracted.normalized_hash.is_empty()
        && extracted.normalized_hash == candidate.normalized_hash
    {
        return SCORE_NORMALIZED_EQUAL;
    }
    if !extracted.content_hash.is_empty() && extracted.content_hash == candidate.content_hash {
        return SCORE_CONTENT_EQUAL;
    }

    let ours = signature_set(&extracted.signature);
    let theirs = signature_set(&candidate.signature);
    if !ours.is_empty() && !theirs.is_empty() {
        let j = jaccard(&ours, &theirs);
        if j >= SIGNATURE_HIGH_JACCARD {
            // [0.8, 1.0] → [0.85, 0.95]
            return 0.85 + (j - SIGNATURE_HIGH_JACCARD) / (1.0 - SIGNATURE_HIGH_JACCARD) * 0.10;
        }
        if j >= SIGNATURE_LOW_JACCARD {
            // [0.5, 0.8) → [0.70, 0.85)
            return 0.70
                + (j - SIGNATURE_LOW_JACCARD)
                    / (SIGNATURE_HIGH_JACCARD - SIGNATURE_LOW_JACCARD)
                    * 0.15;
        }
    }

    let ratio = length_ratio(extracted.content_length, candidate.content_length);
    if ratio < LOW_RATIO_CUTOFF {
        ratio * LOW_RATIO_SCALE
    } else {
        ratio * RATIO_SCALE
    }
}

/// S2 / S3: weighted feature-set comparison for minified content.
#[must_use]
pub fn minified_similarity(ours: &FeatureSet, theirs: &FeatureSet) -> f64 {
    let strings = jaccard(&ours.strings, &theirs.strings);
    let calls = jaccard(&ours.calls, &theirs.calls);
    let numbers = jaccard(&ours.numbers, &theirs.numbers);
    let length = length_ratio(ours.content_length, theirs.content_length);

    let mut score = WEIGHT_STRINGS * strings
        + WEIGHT_CALLS * calls
        + WEIGHT_NUMBERS * numbers
        + WEIGHT_LENGTH * length;
    if strings > STRONG_AGREEMENT_FLOOR && calls > STRONG_AGREEMENT_FLOOR {
        score += STRONG_AGREEMENT_BONUS;
    }
    score.min(1.0)
}

/// Structural fallback: weighted filename-set comparison. Public files
/// (no leading underscore on the basename) carry more weight than
/// internal ones; a high subset coverage of the extracted names earns an
/// extra bonus.
#[must_use]
pub fn structural_similarity(
    extracted: &BTreeSet<String>,
    registry: &BTreeSet<String>,
) -> f64 {
    if extracted.is_empty() || registry.is_empty() {
        return 0.0;
    }

    let split = |names: &BTreeSet<String>| -> (BTreeSet<String>, BTreeSet<String>) {
        names.iter().cloned().partition(|name| {
            !name.rsplit('/').next().unwrap_or(name).starts_with('_')
        })
    };
    let (ours_public, ours_internal) = split(extracted);
    let (theirs_public, theirs_internal) = split(registry);

    let public = jaccard_vacuous(&ours_public, &theirs_public);
    let internal = jaccard_vacuous(&ours_internal, &theirs_internal);

    let mut score = WEIGHT_PUBLIC_FILES * public + WEIGHT_INTERNAL_FILES * internal;
    if public > STRONG_AGREEMENT_FLOOR && internal > STRONG_AGREEMENT_FLOOR {
        score += STRONG_AGREEMENT_BONUS;
    }

    let covered = extracted
        .iter()
        .filter(|name| registry.contains(*name))
        .count() as f64;
    if covered / extracted.len() as f64 >= STRUCTURAL_SUBSET_FLOOR {
        score += STRUCTURAL_SUBSET_BONUS;
    }

    score.min(1.0)
}

fn signature_set(signature: &str) -> BTreeSet<String> {
    signature
        .split('|')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
