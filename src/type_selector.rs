use crate::error::{FuzzyJoinError, Result};
use crate::semantic::SemanticType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Supported tags, most specific first. The first tag both columns share wins.
const PRIORITY: [(SemanticType, MatchFamily); 6] = [
    (SemanticType::DateTime, MatchFamily::Datetime),
    (SemanticType::Integer, MatchFamily::Numeric),
    (SemanticType::Float, MatchFamily::Numeric),
    (SemanticType::Categorical, MatchFamily::String),
    (SemanticType::Text, MatchFamily::String),
    (SemanticType::Boolean, MatchFamily::String),
];

/// Resolver family applied to a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFamily {
    String,
    Numeric,
    Datetime,
}

impl MatchFamily {
    fn of(tag: &SemanticType) -> Option<Self> {
        match tag {
            SemanticType::Categorical | SemanticType::Text | SemanticType::Boolean => {
                Some(MatchFamily::String)
            }
            SemanticType::Integer | SemanticType::Float => Some(MatchFamily::Numeric),
            SemanticType::DateTime => Some(MatchFamily::Datetime),
            SemanticType::Other(_) => None,
        }
    }
}

impl fmt::Display for MatchFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchFamily::String => "string",
            MatchFamily::Numeric => "numeric",
            MatchFamily::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

/// Pick the match family for a left/right column pair.
///
/// An exact shared category is preferred. Failing that, any numeric tag on
/// both sides coerces to numeric (integers and floats interoperate) and any
/// text-like tag on both sides (booleans included) coerces to string.
/// Anything else is `UnsupportedTypes`.
pub fn select_family(
    left_column: &str,
    left_types: &BTreeSet<SemanticType>,
    right_column: &str,
    right_types: &BTreeSet<SemanticType>,
) -> Result<MatchFamily> {
    if let Some((_, family)) = PRIORITY
        .iter()
        .find(|(tag, _)| left_types.contains(tag) && right_types.contains(tag))
    {
        return Ok(*family);
    }

    let families = |types: &BTreeSet<SemanticType>| -> BTreeSet<MatchFamily> {
        types.iter().filter_map(MatchFamily::of).collect()
    };
    let left_families = families(left_types);
    let right_families = families(right_types);

    for family in [MatchFamily::Numeric, MatchFamily::String] {
        if left_families.contains(&family) && right_families.contains(&family) {
            return Ok(family);
        }
    }

    Err(FuzzyJoinError::UnsupportedTypes {
        left_column: left_column.to_string(),
        right_column: right_column.to_string(),
        left_types: left_types.iter().map(|t| t.to_string()).collect(),
        right_types: right_types.iter().map(|t| t.to_string()).collect(),
    })
}
