//! Error taxonomy for the tract pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("table '{table}' is missing required column '{column}'")]
    Schema { table: String, column: String },

    #[error("{operation} requires at least one row")]
    EmptyInput { operation: &'static str },

    #[error("table '{table}' has duplicate tract id {id}")]
    DuplicateKey { table: String, id: String },

    #[error("invalid tract id '{0}'")]
    InvalidTractId(String),

    #[error("table '{table}' row {row}: column '{column}' has invalid value '{value}'")]
    InvalidValue {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn schema(table: &str, column: &str) -> Self {
        AnalysisError::Schema {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
