use callback_server::ListenerError;
use http_client::HttpError;
use thiserror::Error;

/// Errors raised while addressing a device over one of its connections
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device has not been connected yet
    #[error("Device '{0}' has no active connection")]
    NoActiveConnection(String),

    /// None of the advertised connections answered the probe
    #[error("None of the {count} connections of device '{name}' answered")]
    NoReachableConnection { name: String, count: usize },

    /// The resource description could not be parsed
    #[error("Malformed device description: {0}")]
    Malformed(String),

    /// Transport failure talking to the device
    #[error("Request to '{name}' failed: {source}")]
    Http {
        name: String,
        #[source]
        source: HttpError,
    },
}

/// Errors raised by PlayQueue creation and mutation.
///
/// When a mutation fails, the local queue state is left exactly as it was.
#[derive(Debug, Error)]
pub enum PlayQueueError {
    /// The player headers lack a required identity header
    #[error("Player headers are missing {0}")]
    MissingHeader(&'static str),

    /// The item carries no server-assigned queue item id
    #[error("Item '{0}' is not part of a play queue")]
    ItemNotQueued(String),

    /// The server answered with a non-success status
    #[error("Server rejected the play queue request with status {0}")]
    Status(u16),

    /// The server answered with a body that is not a container
    #[error("Malformed play queue response: {0}")]
    Malformed(String),

    /// The server could not be reached
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors raised by watched-state updates on a media item
#[derive(Debug, Error)]
pub enum MediaError {
    /// Only items with a rating key can be scrobbled
    #[error("Item '{0}' has no rating key")]
    MissingRatingKey(String),

    #[error("Server rejected the request with status {0}")]
    Status(u16),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// High-level errors for remote control operations
///
/// Each kind maps to a different remedy for the embedding application:
/// connectivity errors point at the network, callback errors point at the
/// application's own timeline handler.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The player could not be reached or timed out
    ///
    /// Returned to the caller of a command. Background renewal logs this
    /// and retries on its next period.
    #[error("Connectivity error: {0}")]
    Connectivity(#[from] DeviceError),

    /// The user-supplied timeline callback returned an error or panicked
    #[error("Timeline callback failed: {0}")]
    CallbackFailed(String),

    /// The device does not advertise the player capability
    #[error("Device '{0}' does not provide a player")]
    NotAPlayer(String),

    /// The device does not advertise the server capability
    #[error("Device '{0}' does not provide a server")]
    NotAServer(String),

    /// A command parameter is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The callback listener could not be started or stopped
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    /// The background runtime could not be created or a task failed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Creating the play queue for playback failed
    #[error("Play queue error: {0}")]
    PlayQueue(#[from] PlayQueueError),
}

/// Type alias for results that can return a RemoteError
pub type Result<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_wraps_into_connectivity() {
        let err: RemoteError = DeviceError::NoActiveConnection("Living Room".to_string()).into();
        assert!(matches!(err, RemoteError::Connectivity(_)));
        assert!(err.to_string().contains("Living Room"));
    }

    #[test]
    fn test_play_queue_error_display() {
        assert_eq!(
            PlayQueueError::Status(500).to_string(),
            "Server rejected the play queue request with status 500"
        );
        assert_eq!(
            PlayQueueError::MissingHeader("X-Plex-Client-Identifier").to_string(),
            "Player headers are missing X-Plex-Client-Identifier"
        );
    }

    #[test]
    fn test_callback_failure_is_distinct() {
        let err = RemoteError::CallbackFailed("boom".to_string());
        assert!(!matches!(err, RemoteError::Connectivity(_)));
        assert_eq!(err.to_string(), "Timeline callback failed: boom");
    }
}
