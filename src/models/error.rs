use polars::prelude::PolarsError;
use std::fmt;
use thiserror::Error;

use crate::validation::SchemaCheck;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("category `{level}` of `{column}` was not seen during training")]
    UnseenCategory { column: String, level: String },

    #[error("split produced an empty partition (train: {train} rows, test: {test} rows)")]
    EmptyPartition { train: usize, test: usize },

    #[error("cannot fit a model on an empty training set")]
    EmptyTrainingSet,

    #[error("model fitting failed: {0}")]
    ModelFit(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A raw field that could not be coerced into its canonical type. Row-level
/// and never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot normalize `{field}` value {value:?}: {reason}")]
pub struct NormalizationError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl NormalizationError {
    pub fn new(field: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// A persisted table broke one named invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationFailure {
    pub check: SchemaCheck,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(check: SchemaCheck, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema check `{}` failed: {}", self.check, self.message)
    }
}
