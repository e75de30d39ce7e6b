//! Error types for OTP operations

use thiserror::Error;

/// Errors that can occur in OTP operations
#[derive(Error, Debug)]
pub enum OtpError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, OtpError>;
