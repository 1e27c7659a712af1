use thiserror::Error;

/// A draft rejected before any remote call was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn required(field: &'static str) -> Self {
        Self::new(field, "is required")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("sign in required")]
    AuthRequired,

    #[error("{action} failed: {source:#}")]
    Remote {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{table} row {id} not found")]
    NotFound { table: String, id: String },
}

impl StoreError {
    pub fn remote(action: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Remote {
            action: action.into(),
            source,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
