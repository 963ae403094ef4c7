// External crates
use polars::error::PolarsError;
use thiserror::Error;

/// Errors raised while loading data, engineering features, fitting models
/// or writing experiment outputs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input error: {0}")]
    Input(String),

    #[error("required column '{0}' not found in input data")]
    MissingColumn(String),

    #[error("could not parse timestamp '{value}' at row {row}")]
    TimestampParse { row: usize, value: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("model fitting failed: {0}")]
    Fitting(String),

    #[error("plot rendering failed: {0}")]
    Plot(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// True for malformed or missing input (files, columns, values).
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Input(_)
                | PipelineError::MissingColumn(_)
                | PipelineError::TimestampParse { .. }
        )
    }

    /// Errors that must abort the whole experiment instead of a single model variant.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Io(_) | PipelineError::Json(_) | PipelineError::Plot(_)
        ) || self.is_input_error()
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
