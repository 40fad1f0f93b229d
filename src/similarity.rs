//! Similarity metrics between scalar join keys.
//!
//! String similarity is a weighted edit-distance ratio in [0, 100] that looks
//! at whole strings, best-aligned substrings and token bags. Numeric and
//! temporal closeness are plain absolute distances with tolerances that scale
//! with the data.

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"(?u)\W").unwrap();
}

const UNBASE_SCALE: f64 = 0.95;
const PARTIAL_SCALE: f64 = 0.90;
const LONG_PARTIAL_SCALE: f64 = 0.60;

/// Scorer used for string keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringScorer {
    /// Best of plain, partial and token-based ratios, weighted by length ratio.
    #[default]
    WeightedRatio,
    /// Jaro-Winkler similarity scaled to [0, 100].
    JaroWinkler,
}

impl StringScorer {
    /// Score two strings that already went through [`process`].
    pub fn score_processed(&self, a: &str, b: &str) -> u8 {
        match self {
            StringScorer::WeightedRatio => weighted_ratio_processed(a, b),
            StringScorer::JaroWinkler => {
                if a.is_empty() || b.is_empty() {
                    return 0;
                }
                (strsim::jaro_winkler(a, b) * 100.0).round() as u8
            }
        }
    }

    pub fn score(&self, a: &str, b: &str) -> u8 {
        self.score_processed(&process(a), &process(b))
    }
}

/// Normalize a string for comparison: ASCII only, punctuation becomes
/// whitespace, lowercased and trimmed.
pub fn process(s: &str) -> String {
    let ascii: String = s.chars().filter(char::is_ascii).collect();
    NON_WORD
        .replace_all(&ascii, " ")
        .to_lowercase()
        .trim()
        .to_string()
}

/// Length of the longest common subsequence of two char slices.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Indel similarity in [0, 1]: 1 - (insertions + deletions) / total length.
fn indel_similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(a, b) as f64 / total as f64
}

// Rounds half away from zero: a raw 62.5 scores 63, not 62.
fn to_score(similarity: f64) -> u8 {
    (similarity * 100.0).round() as u8
}

/// Whole-string ratio.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a == b {
        return 100;
    }
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    to_score(indel_similarity(&a, &b))
}

/// Ratio of the shorter string against its best-aligned window in the longer one.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    if a == b {
        return 100;
    }
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    let mut best = 0.0f64;
    for window in longer.windows(shorter.len()) {
        let similarity = indel_similarity(&shorter, window);
        if similarity > 0.995 {
            return 100;
        }
        best = best.max(similarity);
    }
    to_score(best)
}

fn sorted_tokens(s: &str) -> String {
    s.split_whitespace().sorted().join(" ")
}

fn token_sort(a: &str, b: &str, partial: bool) -> u8 {
    let (a, b) = (sorted_tokens(a), sorted_tokens(b));
    if partial {
        partial_ratio(&a, &b)
    } else {
        ratio(&a, &b)
    }
}

fn token_set(a: &str, b: &str, partial: bool) -> u8 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection = tokens_a.intersection(&tokens_b).join(" ");
    let diff_ab = tokens_a.difference(&tokens_b).join(" ");
    let diff_ba = tokens_b.difference(&tokens_a).join(" ");

    let combined_ab = format!("{} {}", intersection, diff_ab).trim().to_string();
    let combined_ba = format!("{} {}", intersection, diff_ba).trim().to_string();

    let scorer = if partial { partial_ratio } else { ratio };
    [
        scorer(&intersection, &combined_ab),
        scorer(&intersection, &combined_ba),
        scorer(&combined_ab, &combined_ba),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

/// Ratio over sorted tokens, so word order does not matter.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    token_sort(&process(a), &process(b), false)
}

/// Ratio over the shared and differing token sets.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    token_set(&process(a), &process(b), false)
}

/// Weighted ratio of two raw strings.
pub fn weighted_ratio(a: &str, b: &str) -> u8 {
    weighted_ratio_processed(&process(a), &process(b))
}

fn weighted_ratio_processed(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let base = ratio(a, b) as f64;
    let len_a = a.chars().count() as f64;
    let len_b = b.chars().count() as f64;
    let len_ratio = len_a.max(len_b) / len_a.min(len_b);

    let best = if len_ratio < 1.5 {
        let sort = token_sort(a, b, false) as f64 * UNBASE_SCALE;
        let set = token_set(a, b, false) as f64 * UNBASE_SCALE;
        base.max(sort).max(set)
    } else {
        let partial_scale = if len_ratio > 8.0 {
            LONG_PARTIAL_SCALE
        } else {
            PARTIAL_SCALE
        };
        let partial = partial_ratio(a, b) as f64 * partial_scale;
        let sort = token_sort(a, b, true) as f64 * UNBASE_SCALE * partial_scale;
        let set = token_set(a, b, true) as f64 * UNBASE_SCALE * partial_scale;
        base.max(partial).max(sort).max(set)
    };

    // Same half-away-from-zero rounding as `to_score`.
    best.round() as u8
}

/// Absolute numeric distance.
pub fn numeric_distance(left: f64, right: f64) -> f64 {
    (left - right).abs()
}

/// Largest distance accepted for a numeric left key: `(1 - accuracy) * |left|`,
/// evaluated as `|left - left * accuracy|` so round values stay exact.
pub fn numeric_tolerance(left: f64, accuracy: f64) -> f64 {
    (left - left * accuracy).abs()
}

/// Absolute duration between two epoch-millisecond timestamps.
pub fn duration_millis(left: i64, right: i64) -> f64 {
    left.abs_diff(right) as f64
}

/// Span covered by a set of timestamps, zero when empty.
pub fn timestamp_range<'a>(values: impl IntoIterator<Item = &'a i64>) -> f64 {
    match values.into_iter().minmax() {
        itertools::MinMaxResult::NoElements | itertools::MinMaxResult::OneElement(_) => 0.0,
        itertools::MinMaxResult::MinMax(min, max) => duration_millis(*min, *max),
    }
}

/// Largest duration accepted between matched timestamps:
/// `(1 - accuracy) * min(left_range, right_range)`.
pub fn datetime_tolerance(left_range: f64, right_range: f64, accuracy: f64) -> f64 {
    let range = left_range.min(right_range);
    range - range * accuracy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process() {
        assert_eq!(process("  Hotel, Inc. "), "hotel  inc");
        assert_eq!(process("foxtrot-aa"), "foxtrot aa");
        assert_eq!(process("Café"), "caf");
    }

    #[test]
    fn test_scores_round_half_away_from_zero() {
        assert_eq!(to_score(0.625), 63);
        assert_eq!(to_score(0.614), 61);
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio("yankee", "yankee"), 100);
        assert_eq!(ratio("yankeee", "yankee"), 92);
        assert_eq!(ratio("otel", "hotel"), 89);
        assert_eq!(ratio("", "hotel"), 0);
        assert_eq!(ratio("", ""), 100);
    }

    #[test]
    fn test_partial_ratio_finds_substring() {
        assert_eq!(partial_ratio("yank", "yankee"), 100);
        assert_eq!(partial_ratio("yankee", "yank"), 100);
        assert!(partial_ratio("abcd", "xyzw") < 10);
    }

    #[test]
    fn test_token_ratios_ignore_order_and_extras() {
        assert_eq!(token_sort_ratio("new york mets", "mets new york"), 100);
        assert_eq!(token_set_ratio("foxtrot aa", "foxtrot"), 100);
    }

    #[test]
    fn test_weighted_ratio() {
        assert_eq!(weighted_ratio("Hotel", "hotel"), 100);
        assert_eq!(weighted_ratio("yankeee", "yankee"), 92);
        assert_eq!(weighted_ratio("yank", "yankee"), 90);
        assert_eq!(weighted_ratio("foxtrot aa", "foxtrot"), 95);
        assert_eq!(weighted_ratio("otel", "hotel"), 89);
        assert_eq!(weighted_ratio("!!!", "hotel"), 0);
    }

    #[test]
    fn test_case_and_punctuation_do_not_zero_the_score() {
        assert!(weighted_ratio("Hotel-California", "hotel california") >= 90);
        assert!(StringScorer::JaroWinkler.score("HOTEL", "hotel.") >= 90);
    }

    #[test]
    fn test_numeric_tolerance() {
        assert_eq!(numeric_tolerance(5.0, 0.9), 0.5);
        assert_eq!(numeric_tolerance(-5.0, 0.9), 0.5);
        assert_eq!(numeric_tolerance(0.0, 0.5), 0.0);
        assert_eq!(numeric_tolerance(10.0, 1.0), 0.0);
        assert!(numeric_distance(5.0, 5.5) <= numeric_tolerance(5.0, 0.9));
        assert!(numeric_distance(5.0, 5.51) > numeric_tolerance(5.0, 0.9));
    }

    #[test]
    fn test_datetime_tolerance_scales_with_ranges() {
        let single = datetime_tolerance(1_000.0, 4_000.0, 0.8);
        let doubled = datetime_tolerance(2_000.0, 8_000.0, 0.8);
        assert_eq!(doubled, single * 2.0);
        assert_eq!(timestamp_range(&[5, 1, 9]), 8.0);
        assert_eq!(timestamp_range(&[3]), 0.0);
        assert_eq!(timestamp_range(std::iter::empty::<&i64>()), 0.0);
    }
}
