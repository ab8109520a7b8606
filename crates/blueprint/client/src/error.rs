//! Error types for the HTTP and file adapters

use thiserror::Error;

/// Failure to set up an adapter.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
