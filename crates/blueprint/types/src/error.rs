//! Error types shared across Blueprint crates

use thiserror::Error;

/// Structural problems with a submitted template.
///
/// These are detected before any lookup table is built and abort
/// validation immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template must be a JSON object")]
    NotAnObject,

    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    #[error("unsupported api_version \"{found}\", expected \"{expected}\"")]
    UnsupportedApiVersion {
        found: String,
        expected: &'static str,
    },

    #[error("field \"{0}\" must be an array")]
    NotAnArray(&'static str),

    #[error("field \"{0}\" must be a string")]
    NotAString(&'static str),

    #[error("{section}[{position}] must be a JSON object")]
    ElementNotAnObject {
        section: &'static str,
        position: usize,
    },

    #[error("create_components[{position}].{field} must be {expected}")]
    InvalidComponentField {
        position: usize,
        field: &'static str,
        expected: &'static str,
    },
}

/// Errors raised by external stores (progress, credentials, existing components).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
