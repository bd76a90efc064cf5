//! Application-level errors (wraps domain errors)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("cannot load {source_name}: {message}")]
    Load { source_name: String, message: String },

    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("no input file given and none configured")]
    NoInput,

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    pub fn load(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Load {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
