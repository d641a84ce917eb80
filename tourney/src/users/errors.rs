//! User directory error types.

use thiserror::Error;

/// User directory errors
#[derive(Debug, Error)]
pub enum UserError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// Team not found
    #[error("Team not found: {0}")]
    TeamNotFound(i64),

    /// Username already exists
    #[error("Username already exists")]
    UsernameTaken,

    /// Invalid username format
    #[error("Invalid username: {0}")]
    InvalidUsername(String),
}

impl UserError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            UserError::Database(_) => "Internal server error".to_string(),
            UserError::UserNotFound(_) => "User not found".to_string(),
            UserError::TeamNotFound(_) => "Team not found".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for user directory operations
pub type UserResult<T> = Result<T, UserError>;
