//! Loads a dataset directory described by a `datasetDoc.json` file.
//!
//! ```json
//! {
//!   "entry_point": "0",
//!   "resources": [
//!     {
//!       "id": "0",
//!       "path": "learningData.csv",
//!       "index_column": "d3mIndex",
//!       "columns": [{ "name": "alpha", "semantic_types": ["categorical"] }]
//!     }
//!   ]
//! }
//! ```
//!
//! Columns without declared tags get one inferred from their polars dtype.

use crate::error::{FuzzyJoinError, Result};
use crate::semantic::SemanticType;
use crate::table::{Dataset, Table};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DATASET_DOC: &str = "datasetDoc.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDoc {
    #[serde(default)]
    pub entry_point: Option<String>,
    pub resources: Vec<ResourceDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDoc {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub index_column: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDoc {
    pub name: String,
    #[serde(default)]
    pub semantic_types: Vec<SemanticType>,
}

impl DatasetDoc {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(DATASET_DOC);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FuzzyJoinError::Metadata(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| FuzzyJoinError::Metadata(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Read every resource of the dataset in `dir`.
pub fn load_dataset(dir: impl AsRef<Path>) -> Result<Dataset> {
    let dir = dir.as_ref();
    let doc = DatasetDoc::load(dir)?;

    let mut dataset = Dataset::new();
    for resource in &doc.resources {
        let table = load_resource(dir, resource)?;
        debug!(
            "Loaded resource '{}' ({} rows) from {}",
            resource.id,
            table.height(),
            dir.display()
        );
        dataset = dataset.with_resource(&resource.id, table);
    }
    if let Some(entry_point) = &doc.entry_point {
        if dataset.get(entry_point).is_none() {
            return Err(FuzzyJoinError::Metadata(format!(
                "entry point '{}' is not a resource of {}",
                entry_point,
                dir.display()
            )));
        }
        dataset = dataset.with_entry_point(entry_point);
    }
    Ok(dataset)
}

fn load_resource(dir: &Path, resource: &ResourceDoc) -> Result<Table> {
    let path: PathBuf = dir.join(&resource.path);
    let frame = LazyCsvReader::new(&path)
        .with_infer_schema_length(Some(1000))
        .finish()
        .map_err(|e| FuzzyJoinError::Metadata(format!("Failed to read CSV {}: {}", path.display(), e)))?
        .collect()?;

    let declared: HashMap<&str, &ColumnDoc> = resource
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();

    let mut semantic_types: HashMap<String, BTreeSet<SemanticType>> = HashMap::new();
    for series in frame.get_columns() {
        let name = series.name();
        let tags: BTreeSet<SemanticType> = match declared.get(name) {
            Some(column) if !column.semantic_types.is_empty() => {
                column.semantic_types.iter().cloned().collect()
            }
            _ => SemanticType::infer(series.dtype()).into_iter().collect(),
        };
        if !tags.is_empty() {
            semantic_types.insert(name.to_string(), tags);
        }
    }

    for name in declared.keys() {
        if frame.column(name).is_err() {
            return Err(FuzzyJoinError::Metadata(format!(
                "column '{}' declared for resource '{}' is missing from {}",
                name,
                resource.id,
                path.display()
            )));
        }
    }

    let table = Table::new(frame);
    let table = match &resource.index_column {
        Some(index) => table.with_index_column(index)?,
        None => table,
    };
    let mut table = table;
    for (column, tags) in semantic_types {
        table = table.with_semantic_types(&column, tags)?;
    }
    Ok(table)
}

/// Write a table as CSV.
pub fn write_csv(table: &Table, path: impl AsRef<Path>) -> Result<()> {
    let mut frame = table.frame().clone();
    let mut file = std::fs::File::create(path.as_ref())?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut frame)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_dataset(dir: &Path) {
        fs::write(
            dir.join("learningData.csv"),
            "d3mIndex,alpha,whiskey,sierra\n1,yankee,10.0,2020-01-01\n2,hotel,20.0,2020-06-01\n",
        )
        .unwrap();
        fs::write(
            dir.join(DATASET_DOC),
            r#"{
                "entry_point": "0",
                "resources": [{
                    "id": "0",
                    "path": "learningData.csv",
                    "index_column": "d3mIndex",
                    "columns": [
                        {"name": "alpha", "semantic_types": ["https://metadata.datadrivendiscovery.org/types/CategoricalData"]},
                        {"name": "sierra", "semantic_types": ["datetime"]}
                    ]
                }]
            }"#,
        )
        .unwrap();
    }

    #[test]
    fn test_load_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let dataset = load_dataset(dir.path()).unwrap();
        assert_eq!(dataset.entry_point(), Some("0"));
        let (_, table) = dataset.tabular_resource(None).unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(table.index_column(), Some("d3mIndex"));
        assert!(table.semantic_types("alpha").contains(&SemanticType::Categorical));
        assert!(table.semantic_types("sierra").contains(&SemanticType::DateTime));
        assert!(table.semantic_types("whiskey").contains(&SemanticType::Float));
    }

    #[test]
    fn test_missing_doc_is_a_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dataset(dir.path()).unwrap_err();
        assert!(matches!(err, FuzzyJoinError::Metadata(_)));
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let dataset = load_dataset(dir.path()).unwrap();
        let (_, table) = dataset.tabular_resource(None).unwrap();

        let out = dir.path().join("out.csv");
        write_csv(table, &out).unwrap();
        let written = fs::read_to_string(&out).unwrap();
        assert!(written.starts_with("d3mIndex,alpha,whiskey,sierra"));
        assert_eq!(written.lines().count(), 3);
    }
}
