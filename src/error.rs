//! Error types for Authgate
//!
//! This module defines all error types used throughout the library,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Authgate operations
///
/// This enum encompasses all possible errors that can occur during
/// provider resolution, authorization flows, callback handling, and
/// token persistence.
#[derive(Error, Debug)]
pub enum AuthgateError {
    /// Caller requested or configured a grant type this library does not implement
    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Callback URL is missing/invalid state, failed verification, or has an unrecognized shape
    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    /// Requested provider name has no definition where one is required
    #[error("no provider configured: {0}")]
    ProviderNotFound(String),

    /// Token endpoint returned a non-success response
    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),

    /// Backend I/O failure on token load/save
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Authgate operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
