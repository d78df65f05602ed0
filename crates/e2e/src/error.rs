//! Error types for E2E testing

use reqwest::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Expected a string stack output, got: {0}")]
    TargetNotString(serde_json::Value),

    #[error("Invalid request for {target}: {reason}")]
    InvalidRequest { target: String, reason: String },

    #[error("HTTP error for {url} after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Timeout after {waited_secs}s: {url} kept returning {status} ({attempts} attempt(s))")]
    Timeout {
        url: String,
        status: StatusCode,
        attempts: u32,
        waited_secs: u64,
    },

    #[error("Failed to read response body from {url}: {reason}")]
    BodyRead { url: String, reason: String },

    #[error("Response body from {url} did not satisfy the check")]
    PredicateRejected { url: String },

    #[error("Stack output not found or not a string: {0}")]
    MissingOutput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Runtime validation failed: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
