//! Error types for the querier

use thiserror::Error;

use crate::query::error::QueryError;

/// Main error type for the querier
#[derive(Error, Debug)]
pub enum Error {
    /// Request compilation or execution failed
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Tree codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Column store errors
///
/// Anything raised after a compiled query has been handed to the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store rejected the query text or failed while executing it
    #[error("Query rejected: {0}")]
    Rejected(String),
}

/// Tree codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Encoding the merged tree failed
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Decoding a previously encoded tree failed
    #[error("Decoding failed: {0}")]
    Decode(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Rejected("Code: 62. Syntax error".to_string());
        assert!(err.to_string().contains("Syntax error"));

        let err: Error = err.into();
        assert!(err.to_string().starts_with("Store error"));
    }

    #[test]
    fn test_query_error_conversion() {
        let err: Error = QueryError::invalid_request("invalid type id").into();
        assert!(matches!(err, Error::Query(_)));
        assert!(err.to_string().contains("invalid type id"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("[store").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
