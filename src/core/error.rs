//! Error types for the advisor

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// No appliance profile is registered for the key (after alias resolution)
    #[error("Unknown appliance: {0}")]
    UnknownAppliance(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A sample or condition query failed
    #[error("Query error: {0}")]
    Query(String),

    /// An external call did not answer within its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
