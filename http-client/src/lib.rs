//! Private blocking HTTP client for Plex device communication
//!
//! This crate wraps a `ureq` agent with the connect/read timeouts used across
//! the workspace. It knows nothing about the companion protocol: callers hand
//! it a method, a URL, headers and query parameters and get back the status
//! code and body text.

mod error;

pub use error::HttpError;

use std::time::Duration;

/// Default timeout for establishing a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for reading a response
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP methods used against players and media servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code and body text of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// `true` for any 2xx or 3xx status.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// A minimal blocking HTTP client
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    /// Create a new client with default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    /// Create a client with explicit connect and read timeouts
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Send a request and return the status and body.
    ///
    /// Error statuses (4xx/5xx) come back as a normal [`HttpResponse`]. Only
    /// transport failures produce [`HttpError::Network`].
    pub fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        params: &[(String, String)],
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self.agent.request(method.as_str(), url);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        for (name, value) in params {
            request = request.query(name, value);
        }

        tracing::trace!(%method, url, params = params.len(), "sending request");

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(HttpError::Network(transport.to_string()));
            }
        };

        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| HttpError::Body(e.to_string()))?;

        tracing::trace!(%method, url, status, "received response");

        Ok(HttpResponse { status, body })
    }

    /// Shorthand for a `GET` with no extra headers
    pub fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpResponse, HttpError> {
        self.send(Method::Get, url, &[], params)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
