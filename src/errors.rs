//! Error types for the resource pool

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool '{pool}' is exhausted - no object available after {retries} retries")]
    Exhausted { pool: String, retries: usize },

    #[error("Pool '{pool}' could not create an object: {reason}")]
    Creation { pool: String, reason: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Pool '{0}' is closed")]
    Closed(String),

    #[error("Invalid configuration for pool '{pool}': {reason}")]
    InvalidConfiguration { pool: String, reason: String },

    #[error("A pool named '{0}' is already registered")]
    DuplicatePool(String),

    #[error("Metrics export failed: {0}")]
    Metrics(String),
}

impl PoolError {
    /// Build a creation error from any displayable cause
    pub fn creation(pool: &str, reason: impl std::fmt::Display) -> Self {
        PoolError::Creation {
            pool: pool.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_config(pool: &str, reason: impl Into<String>) -> Self {
        PoolError::InvalidConfiguration {
            pool: pool.to_string(),
            reason: reason.into(),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
