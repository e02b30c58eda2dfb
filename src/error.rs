//! Error types for the collector library.
//!
//! Each failure class of a run has its own type so the orchestrator can decide
//! locally whether it is fatal (directory fetch, connect) or only skips a unit
//! of work (one station, one purge).

use thiserror::Error;

// ---

/// Failure talking to one of the two remote endpoints.
#[derive(Debug, Error)]
pub enum FetchError {
    // ---
    /// Readings were requested without a station name.
    #[error("missing station name")]
    MissingStationName,

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("{endpoint} answered with HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    /// The body was not the expected JSON envelope.
    #[error("undecodable {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        source: serde_json::Error,
    },

    /// The envelope carried an API-level error code.
    #[error("{endpoint} returned result code {code}: {message}")]
    Api {
        endpoint: &'static str,
        code: String,
        message: String,
    },
}

/// A present field whose value cannot be coerced to its column type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert field '{field}' value {value} to {expected}")]
pub struct SanitizationError {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// A database read or write failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    // ---
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An existing table lacks something the collector relies on.
    #[error("incompatible schema: {0}")]
    IncompatibleSchema(&'static str),
}

/// Errors from operations that sanitize and then persist.
#[derive(Debug, Error)]
pub enum IngestError {
    // ---
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Sanitization(#[from] SanitizationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
