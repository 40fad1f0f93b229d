//! Semantic type tags attached to table columns.
//!
//! Tags describe the logical kind of a column independently of how polars
//! stores it. They arrive from the host's schema metadata, usually as the
//! D3M / schema.org URIs, and only the kinds the join engine can match on are
//! given dedicated variants.

use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

const CATEGORICAL_URI: &str = "https://metadata.datadrivendiscovery.org/types/CategoricalData";
const TEXT_URI: &str = "http://schema.org/Text";
const BOOLEAN_URI: &str = "http://schema.org/Boolean";
const INTEGER_URI: &str = "http://schema.org/Integer";
const FLOAT_URI: &str = "http://schema.org/Float";
const DATETIME_URI: &str = "http://schema.org/DateTime";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SemanticType {
    Categorical,
    Text,
    Boolean,
    Integer,
    Float,
    DateTime,
    /// Any tag the engine does not match on (roles, attributes, ...).
    Other(String),
}

impl SemanticType {
    /// Parse a tag from either its URI or its short name. Never fails:
    /// unknown tags are preserved as `Other`.
    pub fn parse(tag: &str) -> Self {
        let trimmed = tag.trim();
        match trimmed {
            CATEGORICAL_URI => return SemanticType::Categorical,
            TEXT_URI => return SemanticType::Text,
            BOOLEAN_URI => return SemanticType::Boolean,
            INTEGER_URI => return SemanticType::Integer,
            FLOAT_URI => return SemanticType::Float,
            DATETIME_URI => return SemanticType::DateTime,
            _ => {}
        }

        match trimmed.to_lowercase().as_str() {
            "categorical" | "categoricaldata" => SemanticType::Categorical,
            "text" | "string" => SemanticType::Text,
            "boolean" | "bool" => SemanticType::Boolean,
            "integer" | "int" => SemanticType::Integer,
            "float" | "real" => SemanticType::Float,
            "datetime" | "date" => SemanticType::DateTime,
            _ => SemanticType::Other(trimmed.to_string()),
        }
    }

    /// Canonical URI form, as used by the host metadata.
    pub fn uri(&self) -> &str {
        match self {
            SemanticType::Categorical => CATEGORICAL_URI,
            SemanticType::Text => TEXT_URI,
            SemanticType::Boolean => BOOLEAN_URI,
            SemanticType::Integer => INTEGER_URI,
            SemanticType::Float => FLOAT_URI,
            SemanticType::DateTime => DATETIME_URI,
            SemanticType::Other(tag) => tag,
        }
    }

    /// Best-effort tag for a column whose metadata declares none.
    pub fn infer(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::String => Some(SemanticType::Text),
            DataType::Boolean => Some(SemanticType::Boolean),
            DataType::Float32 | DataType::Float64 => Some(SemanticType::Float),
            DataType::Date | DataType::Datetime(_, _) => Some(SemanticType::DateTime),
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Some(SemanticType::Integer),
            _ => None,
        }
    }
}

impl From<String> for SemanticType {
    fn from(tag: String) -> Self {
        SemanticType::parse(&tag)
    }
}

impl From<SemanticType> for String {
    fn from(tag: SemanticType) -> Self {
        tag.uri().to_string()
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uris_and_short_names() {
        assert_eq!(SemanticType::parse(CATEGORICAL_URI), SemanticType::Categorical);
        assert_eq!(SemanticType::parse("http://schema.org/Float"), SemanticType::Float);
        assert_eq!(SemanticType::parse("DateTime"), SemanticType::DateTime);
        assert_eq!(SemanticType::parse(" integer "), SemanticType::Integer);
        assert_eq!(
            SemanticType::parse("https://metadata.datadrivendiscovery.org/types/Attribute"),
            SemanticType::Other("https://metadata.datadrivendiscovery.org/types/Attribute".to_string())
        );
    }

    #[test]
    fn test_serde_uses_uri_strings() {
        let tags: Vec<SemanticType> =
            serde_json::from_str(r#"["categorical", "http://schema.org/DateTime"]"#).unwrap();
        assert_eq!(tags, vec![SemanticType::Categorical, SemanticType::DateTime]);

        let json = serde_json::to_string(&SemanticType::Boolean).unwrap();
        assert_eq!(json, format!("\"{}\"", BOOLEAN_URI));
    }

    #[test]
    fn test_infer_from_dtype() {
        assert_eq!(SemanticType::infer(&DataType::Int64), Some(SemanticType::Integer));
        assert_eq!(SemanticType::infer(&DataType::String), Some(SemanticType::Text));
        assert_eq!(SemanticType::infer(&DataType::Date), Some(SemanticType::DateTime));
        assert_eq!(SemanticType::infer(&DataType::Null), None);
    }
}
