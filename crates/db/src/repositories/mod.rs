use thiserror::Error;

use pollbot_core::errors::{PollError, StoreError};

pub mod memory;
pub mod poll;

pub use memory::InMemoryPollStore;
pub use poll::SqlPollStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Corrupt(message),
        }
    }
}

impl From<RepositoryError> for PollError {
    fn from(value: RepositoryError) -> Self {
        StoreError::from(value).into()
    }
}
