//! Error types for the weather notification service
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the weather notification service
#[derive(Error, Debug)]
pub enum Error {
    /// Weather provider errors (unreachable service, invalid payload)
    #[error("Weather provider error: {0}")]
    Weather(String),

    /// Notifier errors (bot API rejected a message, token missing)
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// Account store errors
    #[error("Account store error: {0}")]
    AccountStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity already exists
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    /// Create a weather provider error
    pub fn weather(msg: impl Into<String>) -> Self {
        Self::Weather(msg.into())
    }

    /// Create a notifier error
    pub fn notifier(msg: impl Into<String>) -> Self {
        Self::Notifier(msg.into())
    }

    /// Create an account store error
    pub fn account_store(msg: impl Into<String>) -> Self {
        Self::AccountStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Password hashing failures surface as account store errors
impl From<bcrypt::BcryptError> for Error {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::AccountStore(format!("password hashing failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failing_concern() {
        assert_eq!(
            Error::weather("timeout").to_string(),
            "Weather provider error: timeout"
        );
        assert_eq!(
            Error::auth("bad password").to_string(),
            "Authentication failed: bad password"
        );
        assert_eq!(Error::conflict("alice").to_string(), "Conflict: alice");
    }

    #[test]
    fn test_io_and_json_errors_convert() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io, Error::Io(_)));

        let json: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(json, Error::Json(_)));
    }

    #[test]
    fn test_bcrypt_failure_is_account_store_error() {
        let err: Error = bcrypt::hash("secret", 2).unwrap_err().into();
        assert!(matches!(err, Error::AccountStore(ref m) if m.contains("password hashing")));
    }
}
