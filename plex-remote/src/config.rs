//! Configuration for remote sessions
//!
//! This module defines the settings that control a [`RemoteSession`](crate::RemoteSession):
//! how it identifies itself, where the callback listener binds, how often the
//! timeline subscription is renewed and the transport timeouts.

use std::time::Duration;

use http_client::HttpClient;

/// Configuration for a RemoteSession
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Display name sent as `X-Plex-Device-Name`; also seeds the client identifier
    /// Default: "plex-remote"
    pub name: String,

    /// Port the callback listener binds to, 0 for OS-assigned
    /// Default: 8000
    pub listener_port: u16,

    /// Period between timeline subscription renewals
    /// Default: 30 seconds
    pub renewal_interval: Duration,

    /// Number of timeline payloads kept by the listener
    /// Default: 10
    pub history_capacity: usize,

    /// Timeout for establishing connections to devices
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Timeout for reading device responses
    /// Default: 10 seconds
    pub read_timeout: Duration,

    /// Upper bound on waiting for background tasks during unsubscribe
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: "plex-remote".to_string(),
            listener_port: 8000,
            renewal_interval: Duration::from_secs(30),
            history_capacity: callback_server::DEFAULT_HISTORY_CAPACITY,
            connect_timeout: http_client::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: http_client::DEFAULT_READ_TIMEOUT,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl RemoteConfig {
    /// Create a new RemoteConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.listener_port = port;
        self
    }

    pub fn with_renewal_interval(mut self, interval: Duration) -> Self {
        self.renewal_interval = interval;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Preset for players that drop subscriptions quickly
    ///
    /// Renews every 5 seconds and listens on an OS-assigned port.
    pub fn fast_renewal() -> Self {
        Self {
            listener_port: 0,
            renewal_interval: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Build the HTTP transport with the configured timeouts
    pub fn http_client(&self) -> HttpClient {
        HttpClient::with_timeouts(self.connect_timeout, self.read_timeout)
    }
}
