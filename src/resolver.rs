//! Match resolvers and the match map.
//!
//! A resolver answers one question: which right-hand candidate, if any, does a
//! single left key match? The [`MatchMap`] asks it exactly once per distinct
//! left key and the join then applies the answer to every row carrying that
//! key, so matching cost scales with distinct values, not rows.

use crate::similarity::{self, StringScorer};
use std::collections::HashMap;
use std::hash::Hash;

/// A key value that can be memoized.
pub trait KeyValue: Clone {
    type Hashed: Eq + Hash;

    fn hashed(&self) -> Self::Hashed;
}

impl KeyValue for String {
    type Hashed = String;

    fn hashed(&self) -> String {
        self.clone()
    }
}

impl KeyValue for f64 {
    type Hashed = u64;

    fn hashed(&self) -> u64 {
        // -0.0 and 0.0 are the same key
        if *self == 0.0 {
            0.0f64.to_bits()
        } else {
            self.to_bits()
        }
    }
}

impl KeyValue for i64 {
    type Hashed = i64;

    fn hashed(&self) -> i64 {
        *self
    }
}

/// Distinct right-hand key values in order of first appearance.
#[derive(Debug, Clone)]
pub struct CandidateSet<V: KeyValue> {
    values: Vec<V>,
    positions: HashMap<V::Hashed, usize>,
}

impl<V: KeyValue> CandidateSet<V> {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Option<V>>) -> Self
    where
        V: 'a,
    {
        let mut set = CandidateSet {
            values: Vec::new(),
            positions: HashMap::new(),
        };
        for value in values.into_iter().flatten() {
            let key = value.hashed();
            if !set.positions.contains_key(&key) {
                set.positions.insert(key, set.values.len());
                set.values.push(value.clone());
            }
        }
        set
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn position(&self, value: &V) -> Option<usize> {
        self.positions.get(&value.hashed()).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Candidate id for every right row; nulls get none.
    pub fn row_ids(&self, rows: &[Option<V>]) -> Vec<Option<u32>> {
        rows.iter()
            .map(|v| v.as_ref().and_then(|v| self.position(v)).map(|p| p as u32))
            .collect()
    }
}

/// Finds the single best candidate for one left key.
pub trait Resolver {
    type Value: KeyValue;

    /// Index into `candidates.values()` of the match, or `None`.
    fn resolve(&self, left: &Self::Value, candidates: &CandidateSet<Self::Value>) -> Option<usize>;
}

/// Exact equality in the family's representation.
#[derive(Debug, Default)]
pub struct ExactResolver<V> {
    _value: std::marker::PhantomData<V>,
}

impl<V> ExactResolver<V> {
    pub fn new() -> Self {
        Self {
            _value: std::marker::PhantomData,
        }
    }
}

impl<V: KeyValue> Resolver for ExactResolver<V> {
    type Value = V;

    fn resolve(&self, left: &V, candidates: &CandidateSet<V>) -> Option<usize> {
        candidates.position(left)
    }
}

/// Best string similarity at or above `accuracy * 100`.
pub struct StringResolver {
    cutoff: f64,
    scorer: StringScorer,
    processed: Vec<String>,
}

impl StringResolver {
    /// Candidates are normalized once here rather than once per comparison.
    pub fn new(accuracy: f64, scorer: StringScorer, candidates: &CandidateSet<String>) -> Self {
        Self {
            cutoff: accuracy * 100.0,
            scorer,
            processed: candidates.values().iter().map(|c| similarity::process(c)).collect(),
        }
    }
}

impl StringResolver {
    /// Scores are integers, so a cutoff below 1 admits every candidate,
    /// including those scoring 0.
    fn eligible(&self, score: u8) -> bool {
        self.cutoff < 1.0 || score as f64 >= self.cutoff
    }
}

impl Resolver for StringResolver {
    type Value = String;

    fn resolve(&self, left: &String, _candidates: &CandidateSet<String>) -> Option<usize> {
        let query = similarity::process(left);
        let mut best: Option<(usize, u8)> = None;
        for (idx, candidate) in self.processed.iter().enumerate() {
            let score = self.scorer.score_processed(&query, candidate);
            if !self.eligible(score) {
                continue;
            }
            // Strictly greater: the first of several equal scores wins.
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// Closest number within `(1 - accuracy) * |left|`.
///
/// The running minimum accepts a candidate whose distance is *equal* to the
/// best so far, so among equidistant candidates the last one scanned wins.
/// Datetime matching keeps the first instead.
pub struct NumericResolver {
    accuracy: f64,
}

impl NumericResolver {
    pub fn new(accuracy: f64) -> Self {
        Self { accuracy }
    }
}

impl Resolver for NumericResolver {
    type Value = f64;

    fn resolve(&self, left: &f64, candidates: &CandidateSet<f64>) -> Option<usize> {
        let tolerance = similarity::numeric_tolerance(*left, self.accuracy);
        let mut best = None;
        let mut min_distance = f64::INFINITY;
        for (idx, candidate) in candidates.values().iter().enumerate() {
            let distance = similarity::numeric_distance(*left, *candidate);
            if distance <= tolerance && distance <= min_distance {
                min_distance = distance;
                best = Some(idx);
            }
        }
        best
    }
}

/// Closest timestamp within a tolerance derived from both sides' ranges.
pub struct DatetimeResolver {
    tolerance: f64,
}

impl DatetimeResolver {
    /// `left` and `right` are the full key sets of the join, nulls included.
    pub fn from_ranges(accuracy: f64, left: &[Option<i64>], right: &[Option<i64>]) -> Self {
        let left_range = similarity::timestamp_range(left.iter().flatten());
        let right_range = similarity::timestamp_range(right.iter().flatten());
        Self {
            tolerance: similarity::datetime_tolerance(left_range, right_range, accuracy),
        }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Tolerance in milliseconds.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl Resolver for DatetimeResolver {
    type Value = i64;

    fn resolve(&self, left: &i64, candidates: &CandidateSet<i64>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in candidates.values().iter().enumerate() {
            let duration = similarity::duration_millis(*left, *candidate);
            if duration > self.tolerance {
                continue;
            }
            if best.map_or(true, |(_, best_duration)| duration < best_duration) {
                best = Some((idx, duration));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// Resolution of every distinct left key to at most one candidate.
#[derive(Debug, Clone)]
pub struct MatchMap<V: KeyValue> {
    entries: HashMap<V::Hashed, Option<usize>>,
}

impl<V: KeyValue> MatchMap<V> {
    /// Resolve each distinct non-null left value once.
    pub fn build<R>(resolver: &R, left: &[Option<V>], candidates: &CandidateSet<V>) -> Self
    where
        R: Resolver<Value = V>,
    {
        let mut entries = HashMap::new();
        for value in left.iter().flatten() {
            entries
                .entry(value.hashed())
                .or_insert_with(|| resolver.resolve(value, candidates));
        }
        Self { entries }
    }

    pub fn get(&self, value: &V) -> Option<usize> {
        self.entries.get(&value.hashed()).copied().flatten()
    }

    /// Number of distinct left values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct left values that found a candidate.
    pub fn matched(&self) -> usize {
        self.entries.values().filter(|m| m.is_some()).count()
    }

    /// Re-key left rows by the candidate id their value resolved to.
    pub fn row_ids(&self, rows: &[Option<V>]) -> Vec<Option<u32>> {
        rows.iter()
            .map(|v| v.as_ref().and_then(|v| self.get(v)).map(|p| p as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;

    fn strings(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn test_candidate_set_keeps_first_appearance_order() {
        let rows = strings(&["hotel", "yankee", "hotel", "foxtrot"]);
        let set = CandidateSet::from_values(&rows);
        assert_eq!(set.values(), &["hotel", "yankee", "foxtrot"]);
        assert_eq!(set.row_ids(&rows), vec![Some(0), Some(1), Some(0), Some(2)]);
        assert_eq!(set.row_ids(&[None]), vec![None]);
    }

    #[test]
    fn test_string_resolver_threshold() {
        let rows = strings(&["hotel", "yankee", "foxtrot"]);
        let set = CandidateSet::from_values(&rows);
        let resolver = StringResolver::new(0.9, StringScorer::WeightedRatio, &set);

        assert_eq!(resolver.resolve(&"yankeee".to_string(), &set), Some(1));
        assert_eq!(resolver.resolve(&"yank".to_string(), &set), Some(1));
        assert_eq!(resolver.resolve(&"Hotel".to_string(), &set), Some(0));
        assert_eq!(resolver.resolve(&"foxtrot aa".to_string(), &set), Some(2));
        assert_eq!(resolver.resolve(&"otel".to_string(), &set), None);
    }

    #[test]
    fn test_string_resolver_exact_accuracy_requires_perfect_score() {
        let rows = strings(&["yankee"]);
        let set = CandidateSet::from_values(&rows);
        let resolver = StringResolver::new(1.0, StringScorer::WeightedRatio, &set);
        assert_eq!(resolver.resolve(&"YANKEE!".to_string(), &set), Some(0));
        assert_eq!(resolver.resolve(&"yankeee".to_string(), &set), None);
    }

    #[test]
    fn test_string_resolver_tiny_accuracy_matches_every_value() {
        let rows = strings(&["hotel", "yankee"]);
        let set = CandidateSet::from_values(&rows);
        let resolver = StringResolver::new(0.001, StringScorer::WeightedRatio, &set);
        assert_eq!(resolver.resolve(&"yank".to_string(), &set), Some(1));
        assert_eq!(resolver.resolve(&"otel".to_string(), &set), Some(0));
        assert_eq!(resolver.resolve(&"qqq".to_string(), &set), Some(0));
        assert_eq!(resolver.resolve(&"!!!".to_string(), &set), Some(0));

        let strict = StringResolver::new(0.01, StringScorer::WeightedRatio, &set);
        assert_eq!(strict.resolve(&"qqq".to_string(), &set), None);
    }

    #[test]
    fn test_string_resolver_first_best_wins() {
        let rows = strings(&["Hotel", "hotel"]);
        let set = CandidateSet::from_values(&rows);
        let resolver = StringResolver::new(0.5, StringScorer::WeightedRatio, &set);
        assert_eq!(resolver.resolve(&"hotel".to_string(), &set), Some(0));
    }

    #[test]
    fn test_numeric_resolver_boundary() {
        let rows = vec![Some(5.5), Some(4.49)];
        let set = CandidateSet::from_values(&rows);
        let resolver = NumericResolver::new(0.9);
        assert_eq!(resolver.resolve(&5.0, &set), Some(0));

        let rows = vec![Some(5.51)];
        let set = CandidateSet::from_values(&rows);
        assert_eq!(resolver.resolve(&5.0, &set), None);
    }

    #[test]
    fn test_numeric_resolver_later_equal_distance_wins() {
        let rows = vec![Some(9.0), Some(11.0)];
        let set = CandidateSet::from_values(&rows);
        let resolver = NumericResolver::new(0.8);
        assert_eq!(resolver.resolve(&10.0, &set), Some(1));
    }

    #[test]
    fn test_numeric_resolver_zero_only_matches_zero() {
        let rows = vec![Some(0.001), Some(-0.0)];
        let set = CandidateSet::from_values(&rows);
        let resolver = NumericResolver::new(0.01);
        assert_eq!(resolver.resolve(&0.0, &set), Some(1));

        let rows = vec![Some(0.001)];
        let set = CandidateSet::from_values(&rows);
        assert_eq!(resolver.resolve(&0.0, &set), None);
    }

    #[test]
    fn test_datetime_resolver_first_equal_duration_wins() {
        let rows = vec![Some(90), Some(110), Some(100_000)];
        let set = CandidateSet::from_values(&rows);
        let resolver = DatetimeResolver::with_tolerance(10.0);
        assert_eq!(resolver.resolve(&100, &set), Some(0));
        assert_eq!(resolver.resolve(&1_000, &set), None);
    }

    #[test]
    fn test_datetime_tolerance_from_ranges() {
        let left = vec![Some(0), Some(1_000), None];
        let right = vec![Some(0), Some(4_000)];
        let resolver = DatetimeResolver::from_ranges(0.8, &left, &right);
        assert_eq!(resolver.tolerance(), 200.0);

        let left = vec![Some(0), Some(2_000)];
        let right = vec![Some(0), Some(8_000)];
        let doubled = DatetimeResolver::from_ranges(0.8, &left, &right);
        assert_eq!(doubled.tolerance(), 400.0);
    }

    struct CountingResolver {
        calls: RefCell<Vec<String>>,
    }

    impl Resolver for CountingResolver {
        type Value = String;

        fn resolve(&self, left: &String, candidates: &CandidateSet<String>) -> Option<usize> {
            self.calls.borrow_mut().push(left.clone());
            candidates.position(left)
        }
    }

    #[test]
    fn test_match_map_resolves_each_distinct_value_once() {
        let right = strings(&["hotel", "yankee"]);
        let candidates = CandidateSet::from_values(&right);
        let left = vec![
            Some("yankee".to_string()),
            Some("yankee".to_string()),
            None,
            Some("zulu".to_string()),
            Some("yankee".to_string()),
        ];
        let resolver = CountingResolver {
            calls: RefCell::new(Vec::new()),
        };

        let map = MatchMap::build(&resolver, &left, &candidates);

        assert_eq!(resolver.calls.borrow().len(), 2);
        assert_eq!(map.len(), 2);
        assert_eq!(map.matched(), 1);
        assert_eq!(map.row_ids(&left), vec![Some(1), Some(1), None, None, Some(1)]);
    }

    #[test]
    fn test_exact_resolver() {
        let rows = vec![Some(1.5), Some(2.0)];
        let set = CandidateSet::from_values(&rows);
        let resolver = ExactResolver::<f64>::new();
        assert_eq!(resolver.resolve(&2.0, &set), Some(1));
        assert_eq!(resolver.resolve(&2.0000001, &set), None);
    }

    proptest! {
        #[test]
        fn prop_numeric_match_is_within_tolerance(
            left in -1_000.0f64..1_000.0,
            candidates in proptest::collection::vec(-1_000.0f64..1_000.0, 1..20),
            accuracy in 0.01f64..=1.0,
        ) {
            let rows: Vec<Option<f64>> = candidates.into_iter().map(Some).collect();
            let set = CandidateSet::from_values(&rows);
            let resolver = NumericResolver::new(accuracy);
            if let Some(idx) = resolver.resolve(&left, &set) {
                let matched = set.values()[idx];
                let distance = similarity::numeric_distance(left, matched);
                prop_assert!(distance <= similarity::numeric_tolerance(left, accuracy));
                for other in set.values() {
                    prop_assert!(distance <= similarity::numeric_distance(left, *other)
                        || similarity::numeric_distance(left, *other)
                            > similarity::numeric_tolerance(left, accuracy));
                }
            }
        }
    }
}
