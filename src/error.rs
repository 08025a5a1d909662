//! Error types surfaced at the estimation boundary.
//!
//! Pipeline internals work with `anyhow::Result` and attach context as they go.
//! Everything that leaves [`crate::service::PriceService`] is an [`EstimateError`],
//! which carries enough structure for a transport layer to pick a status.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used to pick a client-facing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent something we refuse to price.
    InvalidInput,
    /// The process is misconfigured (no model, bad env value).
    Configuration,
    /// Something failed inside a pipeline stage.
    Internal,
}

/// Errors returned by the public estimation API.
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("invalid `{field}`: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no model artifact found (explicit path: {explicit}, searched: {searched})")]
    ModelNotFound { explicit: String, searched: PathBuf },

    #[error("prediction failed: {0:#}")]
    Computation(#[from] anyhow::Error),
}

impl EstimateError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        EstimateError::InvalidField {
            field,
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EstimateError::InvalidField { .. } => ErrorClass::InvalidInput,
            EstimateError::Config(_) | EstimateError::ModelNotFound { .. } => {
                ErrorClass::Configuration
            }
            EstimateError::Computation(_) => ErrorClass::Internal,
        }
    }

    /// HTTP-style status code for the error class.
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::InvalidInput => 400,
            ErrorClass::Configuration => 503,
            ErrorClass::Internal => 500,
        }
    }

    /// Name of the offending field for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            EstimateError::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }
}
