//! Query error types
//!
//! Every operation of the querier fails with a [`QueryError`]. Requests are
//! validated before anything is sent to the store, so an
//! [`QueryErrorKind::InvalidRequest`] never has store side effects.

use std::fmt;

use crate::error::{CodecError, StoreError};

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    /// Error kind for programmatic handling
    pub kind: QueryErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional source error
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add source error for error chaining
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::InvalidRequest, message)
    }

    /// Create a store failure error
    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::StoreFailure, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Internal, message)
    }

    /// True if the request was rejected before reaching the store
    pub fn is_invalid_request(&self) -> bool {
        self.kind == QueryErrorKind::InvalidRequest
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        QueryError::store_failure(err.to_string()).with_source(err)
    }
}

impl From<CodecError> for QueryError {
    fn from(err: CodecError) -> Self {
        QueryError::internal(err.to_string()).with_source(err)
    }
}

/// Categories of query errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Malformed type id, selector, unknown operator, missing step or name
    InvalidRequest,
    /// The store failed or returned rows that cannot be decoded
    StoreFailure,
    /// Internal error (bug, unexpected state)
    Internal,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::InvalidRequest => write!(f, "InvalidRequest"),
            QueryErrorKind::StoreFailure => write!(f, "StoreFailure"),
            QueryErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = std::result::Result<T, QueryError>;
