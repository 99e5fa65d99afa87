use thiserror::Error;

/// Errors raised while building or parsing masks and filters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryError {
    #[error("Unbalanced brackets in object mask: {0}")]
    UnbalancedMask(String),

    #[error("Empty field in object mask: {0}")]
    EmptyMaskField(String),

    #[error("Cannot merge '{left}' mask with '{right}' mask")]
    IncompatibleMasks { left: String, right: String },

    #[error("Invalid object filter at '{path}': {reason}")]
    InvalidFilter { path: String, reason: String },

    #[error("Invalid filter path: {0}")]
    InvalidPath(String),

    #[error("Invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },
}
