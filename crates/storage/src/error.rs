use common::models::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid database configuration: {0}")]
    Config(String),
    #[error("Table {table} is missing columns: {missing:?}")]
    SchemaMismatch {
        table: &'static str,
        missing: Vec<&'static str>,
    },
}

impl StorageError {
    /// True when the failure points at the connection rather than at the
    /// statement, i.e. the handle should be re-established.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Rejected trade signal: {0}")]
    Validation(#[from] ValidationError),
    #[error("Failed to persist trade signal: {0}")]
    Persistence(#[from] StorageError),
}
