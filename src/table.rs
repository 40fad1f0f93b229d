use crate::error::{FuzzyJoinError, Result};
use crate::semantic::SemanticType;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A polars frame plus the metadata the join engine needs: the optional
/// row-identity column and the semantic type tags of each column.
#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
    index_column: Option<String>,
    semantic_types: HashMap<String, BTreeSet<SemanticType>>,
}

impl Table {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            index_column: None,
            semantic_types: HashMap::new(),
        }
    }

    /// Mark `column` as the row-identity column.
    pub fn with_index_column(mut self, column: &str) -> Result<Self> {
        self.require_column(column, "input")?;
        self.index_column = Some(column.to_string());
        Ok(self)
    }

    /// Attach semantic type tags to `column`, adding to any already present.
    pub fn with_semantic_types(
        mut self,
        column: &str,
        types: impl IntoIterator<Item = SemanticType>,
    ) -> Result<Self> {
        self.require_column(column, "input")?;
        self.semantic_types
            .entry(column.to_string())
            .or_default()
            .extend(types);
        Ok(self)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn index_column(&self) -> Option<&str> {
        self.index_column.as_deref()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.frame.get_column_names().contains(&column)
    }

    /// Tags declared for `column`; empty when none were declared.
    pub fn semantic_types(&self, column: &str) -> BTreeSet<SemanticType> {
        self.semantic_types.get(column).cloned().unwrap_or_default()
    }

    pub fn column(&self, column: &str) -> Result<&Series> {
        self.require_column(column, "input")?;
        Ok(self.frame.column(column)?)
    }

    /// The frame with the row-identity column removed, if there is one.
    pub fn frame_without_index(&self) -> Result<DataFrame> {
        match &self.index_column {
            Some(index) => Ok(self.frame.drop(index)?),
            None => Ok(self.frame.clone()),
        }
    }

    pub(crate) fn from_parts(
        frame: DataFrame,
        index_column: Option<String>,
        semantic_types: HashMap<String, BTreeSet<SemanticType>>,
    ) -> Self {
        Self {
            frame,
            index_column,
            semantic_types,
        }
    }

    pub(crate) fn require_column(&self, column: &str, table: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(FuzzyJoinError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }
}

/// A named collection of tables. Joins replace one resource and pass the rest
/// through untouched.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    resources: BTreeMap<String, Table>,
    entry_point: Option<String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dataset holding a single table under `id`.
    pub fn single(id: &str, table: Table) -> Self {
        Self::new().with_resource(id, table)
    }

    /// A copy of this dataset with `id` set to `table`.
    pub fn with_resource(mut self, id: &str, table: Table) -> Self {
        self.resources.insert(id.to_string(), table);
        self
    }

    pub fn with_entry_point(mut self, id: &str) -> Self {
        self.entry_point = Some(id.to_string());
        self
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&Table> {
        self.resources.get(id)
    }

    pub fn resource_ids(&self) -> Vec<&str> {
        self.resources.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolve the table a join operates on: the requested id, else the only
    /// resource, else the entry point.
    pub fn tabular_resource(&self, requested: Option<&str>) -> Result<(&str, &Table)> {
        if let Some(id) = requested {
            return self
                .resources
                .get_key_value(id)
                .map(|(k, t)| (k.as_str(), t))
                .ok_or_else(|| FuzzyJoinError::ResourceNotFound(id.to_string()));
        }

        if self.resources.len() == 1 {
            if let Some((k, t)) = self.resources.iter().next() {
                return Ok((k.as_str(), t));
            }
        }

        match &self.entry_point {
            Some(id) => self.tabular_resource(Some(id)),
            None => Err(FuzzyJoinError::ResourceNotFound(format!(
                "no resource requested and dataset has {} resources without an entry point",
                self.resources.len()
            ))),
        }
    }
}
