//! Version search ordering.
//!
//! Probing every published version is wasteful; the order below front-loads
//! the likely hits:
//!
//! 1. Dist-tag targets (`latest`, `next`, then remaining tags).
//! 2. With a version hint: a spiral outward from the nearest version by
//!    weighted distance, so off-by-a-patch hints still converge fast.
//! 3. Everything else by descending publish time.

use semver::Version;

use crate::types::PackageMetadata;

/// Weighted distance scale: majors dominate minors dominate patches.
const MAJOR_WEIGHT: u64 = 1_000_000;
const MINOR_WEIGHT: u64 = 1_000;

/// Weight of a version for hint distance. Pre-release suffixes are
/// ignored: `2.1.0-beta.3` sits at the same distance as `2.1.0`.
fn version_weight(version: &Version) -> u64 {
    version
        .major
        .saturating_mul(MAJOR_WEIGHT)
        .saturating_add(version.minor.saturating_mul(MINOR_WEIGHT))
        .saturating_add(version.patch)
}

/// Order a package's versions for probing. Returns at most `max` entries.
#[must_use]
pub fn order_versions(
    metadata: &PackageMetadata,
    hint: Option<&str>,
    include_prereleases: bool,
    max: usize,
) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    let mut push = |version: &str| {
        if !ordered.iter().any(|v| v == version) {
            ordered.push(version.to_string());
        }
    };

    // Dist-tag targets lead, `latest` and `next` ahead of the rest.
    for tag in ["latest", "next"] {
        if let Some(version) = metadata.dist_tags.get(tag) {
            if metadata.versions.contains_key(version) {
                push(version);
            }
        }
    }
    let mut other_tags: Vec<(&String, &String)> = metadata
        .dist_tags
        .iter()
        .filter(|(tag, _)| *tag != "latest" && *tag != "next")
        .collect();
    other_tags.sort_by_key(|(tag, _)| tag.as_str());
    for (_, version) in other_tags {
        if metadata.versions.contains_key(version) {
            push(version);
        }
    }

    // Parseable versions, pre-releases filtered unless requested.
    let mut parsed: Vec<(Version, &String)> = metadata
        .versions
        .keys()
        .filter_map(|raw| Version::parse(raw).ok().map(|v| (v, raw)))
        .filter(|(v, _)| include_prereleases || v.pre.is_empty())
        .collect();
    parsed.sort_by(|(a, _), (b, _)| a.cmp(b));

    // Spiral outward from the hint's nearest neighbor.
    if let Some(hint) = hint.and_then(|h| Version::parse(h.trim_start_matches(['^', '~', '='])).ok())
    {
        if !parsed.is_empty() {
            let target = version_weight(&hint);
            let nearest = parsed
                .iter()
                .enumerate()
                .min_by_key(|(_, (v, _))| version_weight(v).abs_diff(target))
                .map_or(0, |(i, _)| i);

            // For offset k: nearest+k first, then nearest-k-1.
            for k in 0.. {
                let mut any = false;
                if nearest + k < parsed.len() {
                    push(parsed[nearest + k].1);
                    any = true;
                }
                if nearest >= k + 1 {
                    push(parsed[nearest - k - 1].1);
                    any = true;
                }
                if !any {
                    break;
                }
            }
        }
    }

    // Remaining versions by descending publish time; unknown times sink.
    let mut by_time: Vec<&String> = parsed.iter().map(|(_, raw)| *raw).collect();
    by_time.sort_by_key(|raw| {
        std::cmp::Reverse(metadata.publish_times.get(*raw).copied().unwrap_or(i64::MIN))
    });
    for version in by_time {
        push(version);
    }

    ordered.truncate(max);
    ordered
}
