use thiserror::Error;

#[derive(Error, Debug)]
pub enum FuzzyJoinError {
    #[error("Configuration error: accuracy must be in (0, 1], got {0}")]
    InvalidAccuracy(f64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Unsupported join column types: '{left_column}' {left_types:?} cannot be matched against '{right_column}' {right_types:?}"
    )]
    UnsupportedTypes {
        left_column: String,
        right_column: String,
        left_types: Vec<String>,
        right_types: Vec<String>,
    },

    #[error("Column '{column}' not found in {table} table")]
    ColumnNotFound { table: String, column: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl FuzzyJoinError {
    /// Failures raised while validating a join request, before any matching runs.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            FuzzyJoinError::InvalidAccuracy(_)
                | FuzzyJoinError::Configuration(_)
                | FuzzyJoinError::UnsupportedTypes { .. }
                | FuzzyJoinError::ColumnNotFound { .. }
                | FuzzyJoinError::ResourceNotFound(_)
        )
    }
}

impl From<polars::error::PolarsError> for FuzzyJoinError {
    fn from(err: polars::error::PolarsError) -> Self {
        FuzzyJoinError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FuzzyJoinError>;
