//! Error types for the HTTP client

use thiserror::Error;

/// Errors that can occur while talking to a device over HTTP.
///
/// A response with a non-success status is not an error at this layer; it is
/// returned as an [`HttpResponse`](crate::HttpResponse) so callers can decide.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection refused, DNS failure, timeout or other transport failure
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The response body could not be read as text
    #[error("Failed to read response body: {0}")]
    Body(String),
}
