// --- File: crates/connectify_common/src/error.rs ---
use std::fmt;
use thiserror::Error;

/// The base error type surfaced by Connectify services.
///
/// Each crate keeps its own precise error enum and converts into this one at the HTTP or
/// process boundary by implementing `From<SpecificError> for ConnectifyError`.
#[derive(Error, Debug)]
pub enum ConnectifyError {
    /// Error occurred due to missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error occurred during authentication or authorization
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Error occurred during validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error occurred during database operation
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Error occurred during external service call
    #[error("External service error: {service_name} - {message}")]
    ExternalServiceError {
        service_name: String,
        message: String,
    },

    /// Error occurred due to a conflict with the current state of a resource
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Error occurred due to a resource not being found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Error occurred due to rate limiting
    #[error("Rate limited: {0}")]
    RateLimitError(String),
}

/// A trait for converting errors to HTTP status codes.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for ConnectifyError {
    fn status_code(&self) -> u16 {
        match self {
            ConnectifyError::ConfigError(_) => 500,
            ConnectifyError::AuthError(_) => 401,
            ConnectifyError::ValidationError(_) => 400,
            ConnectifyError::DatabaseError(_) => 500,
            ConnectifyError::ExternalServiceError { .. } => 502,
            ConnectifyError::ConflictError(_) => 409,
            ConnectifyError::NotFoundError(_) => 404,
            ConnectifyError::RateLimitError(_) => 429,
        }
    }
}

impl From<crate::services::ProviderError> for ConnectifyError {
    fn from(err: crate::services::ProviderError) -> Self {
        use crate::services::ProviderError;
        match err {
            ProviderError::Auth(message) => ConnectifyError::AuthError(message),
            ProviderError::NotFound(message) => ConnectifyError::NotFoundError(message),
            ProviderError::RateLimited(message) => ConnectifyError::RateLimitError(message),
            ProviderError::Payload(message) => ConnectifyError::ValidationError(message),
            other => ConnectifyError::ExternalServiceError {
                service_name: "calendar provider".to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub fn config_error<T: fmt::Display>(message: T) -> ConnectifyError {
    ConnectifyError::ConfigError(message.to_string())
}

pub fn validation_error<T: fmt::Display>(message: T) -> ConnectifyError {
    ConnectifyError::ValidationError(message.to_string())
}
