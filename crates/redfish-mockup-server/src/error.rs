//! Error taxonomy for the mockup server.
//!
//! Every variant maps to exactly one HTTP status; handlers bubble these up
//! with `?` and the router converts them at the edge.

use hyper::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Path did not resolve, or resolved to a tombstone.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    /// Merge/delete aimed at a collection, or member-add aimed at a
    /// non-collection.
    #[error("operation not allowed on {0}")]
    CollectionOperationNotAllowed(String),
    /// PUT, or a POST to a path that is neither a resource nor a known
    /// action.
    #[error("method not supported for {0}")]
    MethodNotSupported(String),
    /// Request body missing, not JSON, or missing required fields.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// `$top`/`$skip` present but not a non-negative decimal integer.
    #[error("malformed query parameter: {0}")]
    MalformedQuery(String),
    /// An on-disk fixture could not be read or parsed. This is a mockup
    /// configuration problem, never silently skipped.
    #[error("fixture error at {path}: {reason}")]
    Fixture { path: String, reason: String },
}

impl ServerError {
    /// The HTTP status this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::CollectionOperationNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::MethodNotSupported(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ServerError::MalformedQuery(_) => StatusCode::BAD_REQUEST,
            ServerError::Fixture { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
