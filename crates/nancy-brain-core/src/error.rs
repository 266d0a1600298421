//! Error taxonomy shared by every core component.
//!
//! | Kind | Meaning | Adapter mapping |
//! |------|---------|-----------------|
//! | [`CoreError::Config`] | Malformed weights or settings, fatal at startup | 500 |
//! | [`CoreError::NotFound`] | Unknown doc id or chunk id | 404 |
//! | [`CoreError::Validation`] | Bad request parameters | 400 |
//! | [`CoreError::Embedding`] | Delegated embedding or index call failed | 500 |
//!
//! The core never logs or retries; it returns these values and leaves the
//! policy to the caller.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("embedding failed: {0}")]
    Embedding(String),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Stable machine-readable code, used in batch error slots and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Embedding(_) => "embedding_error",
        }
    }
}
