//! Error types for the callback server

use thiserror::Error;

/// Errors raised while starting or stopping the listener
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The requested port could not be bound
    #[error("Failed to bind listener on port {port}: {reason}")]
    Bind { port: u16, reason: String },

    /// The server task did not stop cleanly
    #[error("Listener shutdown failed: {0}")]
    Shutdown(String),
}
