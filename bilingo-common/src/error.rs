//! Common error types for Bilingo

use thiserror::Error;

/// Common result type for Bilingo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Bilingo crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested pair, mirror or user not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// User has no energy left for a billed action
    #[error("Not enough energy for user {user_id}")]
    InsufficientEnergy { user_id: String },

    /// User tried to change a mirror owned by someone else
    #[error("User {user_id} does not own mirror {mirror_id}")]
    OwnershipViolation { mirror_id: String, user_id: String },

    /// Primary search engine could not answer the query
    #[error("Search engine unavailable: {0}")]
    SearchUnavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that leave every store untouched and are caused by the caller
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::InsufficientEnergy { .. }
                | Error::OwnershipViolation { .. }
        )
    }
}
