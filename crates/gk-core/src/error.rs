//! Error types for the gatekeep core library.

use thiserror::Error;

/// Core error types for gatekeep operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid element status: {0}")]
    InvalidStatus(String),

    #[error("Invalid element type: {0}")]
    InvalidElementType(String),

    #[error("Invalid dependency kind: {0}")]
    InvalidDependencyKind(String),

    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    #[error("Invalid complexity: {0}")]
    InvalidComplexity(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the gatekeep Error type.
pub type Result<T> = std::result::Result<T, Error>;
