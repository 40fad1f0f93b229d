//! The join engine: validates a request, resolves left keys to right keys and
//! assembles the combined, deterministically ordered table.

use crate::error::{FuzzyJoinError, Result};
use crate::keys::KeyColumn;
use crate::resolver::{
    CandidateSet, DatetimeResolver, ExactResolver, MatchMap, NumericResolver, Resolver,
    StringResolver,
};
use crate::semantic::SemanticType;
use crate::similarity::StringScorer;
use crate::table::{Dataset, Table};
use crate::type_selector::{select_family, MatchFamily};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

const TEMP_PREFIX: &str = "__fuzzy_join_";
const JOIN_KEY: &str = "__fuzzy_join_key";
const LEFT_ROW: &str = "__fuzzy_join_left_row";
const RIGHT_ROW: &str = "__fuzzy_join_right_row";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Tolerance-based matching; rows without a match are dropped.
    #[default]
    Fuzzy,
    /// Exact key equality; every left row is kept.
    Exact,
}

fn default_accuracy() -> f64 {
    0.9
}

fn default_left_suffix() -> String {
    "_1".to_string()
}

fn default_right_suffix() -> String {
    "_2".to_string()
}

/// Parameters of a single join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left_col: String,
    pub right_col: String,
    /// Match strictness in (0, 1]; 1.0 demands a perfect match.
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
    #[serde(default)]
    pub mode: JoinMode,
    #[serde(default)]
    pub string_scorer: StringScorer,
    #[serde(default = "default_left_suffix")]
    pub left_suffix: String,
    #[serde(default = "default_right_suffix")]
    pub right_suffix: String,
    /// Resource of the left dataset to join; defaults to its main table.
    #[serde(default)]
    pub left_resource: Option<String>,
    #[serde(default)]
    pub right_resource: Option<String>,
}

impl JoinSpec {
    pub fn new(left_col: &str, right_col: &str, accuracy: f64) -> Self {
        Self {
            left_col: left_col.to_string(),
            right_col: right_col.to_string(),
            accuracy,
            mode: JoinMode::default(),
            string_scorer: StringScorer::default(),
            left_suffix: default_left_suffix(),
            right_suffix: default_right_suffix(),
            left_resource: None,
            right_resource: None,
        }
    }

    pub fn with_mode(mut self, mode: JoinMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_string_scorer(mut self, scorer: StringScorer) -> Self {
        self.string_scorer = scorer;
        self
    }

    pub fn with_resources(mut self, left: Option<&str>, right: Option<&str>) -> Self {
        self.left_resource = left.map(str::to_string);
        self.right_resource = right.map(str::to_string);
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FuzzyJoinError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            FuzzyJoinError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.accuracy > 0.0 && self.accuracy <= 1.0) {
            return Err(FuzzyJoinError::InvalidAccuracy(self.accuracy));
        }
        if self.left_col.trim().is_empty() || self.right_col.trim().is_empty() {
            return Err(FuzzyJoinError::Configuration(
                "left and right join columns must be named".to_string(),
            ));
        }
        if self.left_suffix == self.right_suffix {
            return Err(FuzzyJoinError::Configuration(format!(
                "left and right suffixes must differ, both are '{}'",
                self.left_suffix
            )));
        }
        Ok(())
    }
}

/// Left and right rows keyed by candidate id, plus match statistics.
struct KeyAssignment {
    left: Vec<Option<u32>>,
    right: Vec<Option<u32>>,
    distinct_left: usize,
    matched_left: usize,
    candidates: usize,
}

fn assign<R: Resolver>(
    resolver: &R,
    left: &[Option<R::Value>],
    right: &[Option<R::Value>],
    candidates: &CandidateSet<R::Value>,
) -> KeyAssignment {
    let map = MatchMap::build(resolver, left, candidates);
    KeyAssignment {
        left: map.row_ids(left),
        right: candidates.row_ids(right),
        distinct_left: map.len(),
        matched_left: map.matched(),
        candidates: candidates.len(),
    }
}

pub struct FuzzyJoin {
    spec: JoinSpec,
}

impl FuzzyJoin {
    /// Validates the spec up front; no table is read when this fails.
    pub fn new(spec: JoinSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    /// Join the selected resources of two datasets and return the left dataset
    /// with its resource replaced by the joined table.
    pub fn produce(&self, left: &Dataset, right: &Dataset) -> Result<Dataset> {
        let (left_id, left_table) = left.tabular_resource(self.spec.left_resource.as_deref())?;
        let (right_id, right_table) = right.tabular_resource(self.spec.right_resource.as_deref())?;
        debug!("Joining resource '{}' with resource '{}'", left_id, right_id);

        let joined = self.join(left_table, right_table)?;
        let left_id = left_id.to_string();
        Ok(left.clone().with_resource(&left_id, joined))
    }

    /// Join two tables on the configured columns.
    pub fn join(&self, left: &Table, right: &Table) -> Result<Table> {
        let spec = &self.spec;
        left.require_column(&spec.left_col, "left")?;
        right.require_column(&spec.right_col, "right")?;
        if right.index_column() == Some(spec.right_col.as_str()) {
            return Err(FuzzyJoinError::Configuration(format!(
                "right join column '{}' is the row-identity column",
                spec.right_col
            )));
        }

        let family = select_family(
            &spec.left_col,
            &left.semantic_types(&spec.left_col),
            &spec.right_col,
            &right.semantic_types(&spec.right_col),
        )?;
        info!(
            "Joining '{}' to '{}' with {} {:?} matching (accuracy {})",
            spec.left_col, spec.right_col, family, spec.mode, spec.accuracy
        );

        let right_frame = right.frame_without_index()?;
        let left_keys = KeyColumn::extract(left.column(&spec.left_col)?, family)?;
        let right_keys = KeyColumn::extract(right_frame.column(&spec.right_col)?, family)?;
        let assignment = self.assign_keys(left_keys, right_keys)?;
        debug!(
            "{} distinct left value(s) against {} candidate(s)",
            assignment.distinct_left, assignment.candidates
        );

        let layout = ColumnLayout::new(left, &right_frame, spec)?;
        let mut left_frame = left.frame().clone();
        let mut right_frame = right_frame.drop(&spec.right_col)?;
        layout.apply(&mut left_frame, &mut right_frame)?;

        let left_rows: Vec<u32> = (0..left_frame.height() as u32).collect();
        let right_rows: Vec<u32> = (0..right_frame.height() as u32).collect();
        left_frame.with_column(Series::new(LEFT_ROW, left_rows))?;
        left_frame.with_column(Series::new(JOIN_KEY, assignment.left))?;
        right_frame.with_column(Series::new(JOIN_KEY, assignment.right.clone()))?;
        right_frame.with_column(Series::new(RIGHT_ROW, right_rows))?;
        if spec.mode == JoinMode::Exact {
            right_frame = right_frame.take(&first_per_key(&assignment.right))?;
        }

        let join_type = match spec.mode {
            JoinMode::Fuzzy => JoinType::Inner,
            JoinMode::Exact => JoinType::Left,
        };
        let joined = left_frame
            .lazy()
            .join(
                right_frame.lazy(),
                [col(JOIN_KEY)],
                [col(JOIN_KEY)],
                JoinArgs::new(join_type),
            )
            .collect()?;

        let index_column = left
            .index_column()
            .map(|index| layout.left_name(index).to_string());
        let sorted = sort_rows(
            joined,
            index_column.as_deref(),
            layout.left_name(&spec.left_col),
            family,
        )?;

        info!(
            "Matched {} of {} distinct left value(s); {} row(s) joined",
            assignment.matched_left,
            assignment.distinct_left,
            sorted.height()
        );

        Ok(Table::from_parts(
            sorted,
            index_column,
            layout.semantic_types(left, right, spec),
        ))
    }

    fn assign_keys(&self, left: KeyColumn, right: KeyColumn) -> Result<KeyAssignment> {
        let spec = &self.spec;
        let exact = spec.mode == JoinMode::Exact;
        let assignment = match (left, right) {
            (KeyColumn::Text(left), KeyColumn::Text(right)) => {
                let candidates = CandidateSet::from_values(&right);
                if exact {
                    assign(&ExactResolver::<String>::new(), &left, &right, &candidates)
                } else {
                    let resolver =
                        StringResolver::new(spec.accuracy, spec.string_scorer, &candidates);
                    assign(&resolver, &left, &right, &candidates)
                }
            }
            (KeyColumn::Number(left), KeyColumn::Number(right)) => {
                let candidates = CandidateSet::from_values(&right);
                if exact {
                    assign(&ExactResolver::<f64>::new(), &left, &right, &candidates)
                } else {
                    assign(&NumericResolver::new(spec.accuracy), &left, &right, &candidates)
                }
            }
            (KeyColumn::Timestamp(left), KeyColumn::Timestamp(right)) => {
                let candidates = CandidateSet::from_values(&right);
                if exact {
                    assign(&ExactResolver::<i64>::new(), &left, &right, &candidates)
                } else {
                    let resolver = DatetimeResolver::from_ranges(spec.accuracy, &left, &right);
                    debug!("Datetime tolerance: {} ms", resolver.tolerance());
                    assign(&resolver, &left, &right, &candidates)
                }
            }
            _ => {
                return Err(FuzzyJoinError::Configuration(
                    "join keys were extracted in different representations".to_string(),
                ))
            }
        };
        Ok(assignment)
    }
}

/// Positions of the first right row carrying each candidate id, in row order.
/// Rows without a key are dropped; they never join.
fn first_per_key(keys: &[Option<u32>]) -> IdxCa {
    let mut seen = HashSet::new();
    let rows: Vec<IdxSize> = keys
        .iter()
        .enumerate()
        .filter(|(_, key)| key.map_or(false, |k| seen.insert(k)))
        .map(|(row, _)| row as IdxSize)
        .collect();
    IdxCa::from_vec("", rows)
}

/// Output names for columns present on both sides.
struct ColumnLayout {
    left_renames: HashMap<String, String>,
    right_renames: HashMap<String, String>,
}

impl ColumnLayout {
    fn new(left: &Table, right_frame: &DataFrame, spec: &JoinSpec) -> Result<Self> {
        let right_names: BTreeSet<&str> = right_frame
            .get_column_names()
            .into_iter()
            .filter(|name| *name != spec.right_col)
            .collect();

        let mut left_renames = HashMap::new();
        let mut right_renames = HashMap::new();
        for name in left.column_names() {
            if right_names.contains(name.as_str()) {
                left_renames.insert(name.clone(), format!("{}{}", name, spec.left_suffix));
                right_renames.insert(name.clone(), format!("{}{}", name, spec.right_suffix));
            }
        }
        let layout = Self {
            left_renames,
            right_renames,
        };

        let left_names = left.column_names();
        let output = left_names
            .iter()
            .map(|name| layout.left_name(name))
            .chain(right_names.iter().map(|name| layout.right_name(name)));
        let mut seen = HashSet::new();
        for name in output {
            if !seen.insert(name) {
                return Err(FuzzyJoinError::Configuration(format!(
                    "output column '{}' would appear twice after suffixing",
                    name
                )));
            }
        }
        Ok(layout)
    }

    fn left_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.left_renames.get(name).map(String::as_str).unwrap_or(name)
    }

    fn right_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.right_renames.get(name).map(String::as_str).unwrap_or(name)
    }

    fn apply(&self, left: &mut DataFrame, right: &mut DataFrame) -> Result<()> {
        for (old, new) in &self.left_renames {
            left.rename(old, new)?;
        }
        for (old, new) in &self.right_renames {
            right.rename(old, new)?;
        }
        Ok(())
    }

    /// Tags of the output columns under their output names.
    fn semantic_types(
        &self,
        left: &Table,
        right: &Table,
        spec: &JoinSpec,
    ) -> HashMap<String, BTreeSet<SemanticType>> {
        let mut types = HashMap::new();
        for name in left.column_names() {
            let tags = left.semantic_types(&name);
            if !tags.is_empty() {
                types.insert(self.left_name(&name).to_string(), tags);
            }
        }
        for name in right.column_names() {
            if name == spec.right_col || right.index_column() == Some(name.as_str()) {
                continue;
            }
            let tags = right.semantic_types(&name);
            if !tags.is_empty() {
                types.insert(self.right_name(&name).to_string(), tags);
            }
        }
        types
    }
}

/// Order rows by the row-identity column when present, else by the left join
/// column, breaking ties by input position. Helper columns are dropped.
fn sort_rows(
    joined: DataFrame,
    index_column: Option<&str>,
    join_column: &str,
    family: MatchFamily,
) -> Result<DataFrame> {
    let order = match index_column {
        Some(index) => KeyColumn::for_ordering(joined.column(index)?)?,
        None => KeyColumn::extract(joined.column(join_column)?, family)?,
    };
    let left_rows: Vec<Option<u32>> = joined.column(LEFT_ROW)?.u32()?.into_iter().collect();
    let right_rows: Vec<Option<u32>> = joined.column(RIGHT_ROW)?.u32()?.into_iter().collect();

    let mut permutation: Vec<IdxSize> = (0..joined.height() as IdxSize).collect();
    permutation.sort_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        order
            .compare(a, b)
            .then_with(|| left_rows[a].cmp(&left_rows[b]))
            .then_with(|| right_rows[a].cmp(&right_rows[b]))
    });

    let mut sorted = joined.take(&IdxCa::from_vec("", permutation))?;
    let helpers: Vec<String> = sorted
        .get_column_names()
        .into_iter()
        .filter(|name| name.starts_with(TEMP_PREFIX))
        .map(str::to_string)
        .collect();
    for helper in helpers {
        sorted = sorted.drop(&helper)?;
    }
    Ok(sorted)
}
