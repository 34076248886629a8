//! HTTP server for receiving timeline pushes and command echoes.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::{Filter, Rejection, Reply};

use crate::error::ListenerError;
use crate::history::TimelineHistory;
use crate::router::{EventRouter, ListenerEvent};

/// Largest timeline body the listener accepts.
pub const MAX_TIMELINE_BYTES: u64 = 1024 * 1024;

/// How long `shutdown` waits for the server task before aborting it.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP listener the player posts its timeline to.
///
/// The server binds `0.0.0.0:<port>` (port `0` lets the OS choose) and
/// accepts two kinds of request on any path:
///
/// - `POST` with a timeline body, stored in the [`TimelineHistory`] and
///   forwarded as [`ListenerEvent::Timeline`]. Requests without a body are
///   acknowledged and ignored.
/// - `GET` with query parameters, forwarded as [`ListenerEvent::CommandEcho`]
///   and answered with a `"{path}\n{params}"` line.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackServer, ListenerEvent, TimelineHistory};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel::<ListenerEvent>();
///     let history = Arc::new(TimelineHistory::default());
///
///     let server = CallbackServer::new(0, history, tx)
///         .await
///         .expect("Failed to bind listener");
///
///     println!("Listening on port {}", server.port());
///
///     while let Some(event) = rx.recv().await {
///         println!("Received: {:?}", event);
///     }
/// }
/// ```
pub struct CallbackServer {
    /// Address the server is actually bound to
    local_addr: SocketAddr,
    /// Router shared with the request handlers
    event_router: Arc<EventRouter>,
    /// Upper bound on waiting for the server task during shutdown
    shutdown_timeout: Duration,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the listener and start serving.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(
        port: u16,
        history: Arc<TimelineHistory>,
        event_sender: mpsc::UnboundedSender<ListenerEvent>,
    ) -> Result<Self, ListenerError> {
        Self::with_router(port, EventRouter::new(history, event_sender)).await
    }

    /// Bind the listener around an existing router.
    pub async fn with_router(port: u16, event_router: EventRouter) -> Result<Self, ListenerError> {
        let event_router = Arc::new(event_router);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let routes = routes(event_router.clone());
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);

        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, async move {
                // Resolves on an explicit signal or when the sender is dropped
                shutdown_rx.recv().await;
            })
            .map_err(|e| ListenerError::Bind {
                port,
                reason: e.to_string(),
            })?;

        let server_handle = tokio::spawn(server);

        tracing::info!(%local_addr, "callback server listening");

        Ok(Self {
            local_addr,
            event_router,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Override how long `shutdown` waits for in-flight requests.
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// The bound address (useful when the port was OS-assigned).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// The history timeline pushes are written to.
    pub fn history(&self) -> &Arc<TimelineHistory> {
        self.event_router.history()
    }

    /// Stop accepting requests and wait for the server task to finish.
    ///
    /// When this returns `Ok`, the socket is closed and the port can be bound
    /// again. If the task does not finish within the shutdown timeout it is
    /// aborted and an error is returned.
    pub async fn shutdown(mut self) -> Result<(), ListenerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        let Some(mut handle) = self.server_handle.take() else {
            return Ok(());
        };

        match timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => {
                tracing::info!(local_addr = %self.local_addr, "callback server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ListenerError::Shutdown(format!("server task failed: {e}"))),
            Err(_) => {
                handle.abort();
                Err(ListenerError::Shutdown(format!(
                    "server task did not stop within {:?}",
                    self.shutdown_timeout
                )))
            }
        }
    }
}

/// Build the listener's filter tree.
fn routes(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static {
    let timeline_route = warp::post()
        .and(warp::path::full())
        .and(warp::body::content_length_limit(MAX_TIMELINE_BYTES))
        .and(warp::body::bytes())
        .map({
            let router = router.clone();
            move |path: FullPath, body: Bytes| {
                if body.is_empty() {
                    tracing::debug!(path = path.as_str(), "ignoring push without content");
                } else {
                    let payload = String::from_utf8_lossy(&body).into_owned();
                    tracing::debug!(path = path.as_str(), bytes = payload.len(), "timeline push");
                    router.route_timeline(path.as_str(), payload);
                }
                warp::reply::with_status(String::new(), StatusCode::OK)
            }
        });

    let echo_route = warp::get()
        .and(warp::path::full())
        .and(warp::query::<Vec<(String, String)>>())
        .map(move |path: FullPath, params: Vec<(String, String)>| {
            tracing::debug!(path = path.as_str(), params = params.len(), "command echo");
            let ack = router.route_command(path.as_str().to_string(), params);
            warp::reply::with_status(ack, StatusCode::OK)
        });

    timeline_route.or(echo_route).recover(handle_rejection)
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Timeline too large")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        (StatusCode::BAD_REQUEST, "Bad request")
    };

    Ok(warp::reply::with_status(message, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<ListenerEvent>,
        mpsc::UnboundedReceiver<ListenerEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_bind_os_assigned_port() {
        let (tx, _rx) = channel();
        let server = CallbackServer::new(0, Arc::new(TimelineHistory::default()), tx)
            .await
            .unwrap();

        assert_ne!(server.port(), 0);
        assert_eq!(server.local_addr().port(), server.port());
        assert!(server.history().is_empty());

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let (tx, _rx) = channel();
        let first = CallbackServer::new(0, Arc::new(TimelineHistory::default()), tx.clone())
            .await
            .unwrap();

        let result = CallbackServer::new(first.port(), Arc::new(TimelineHistory::default()), tx).await;
        match result {
            Err(ListenerError::Bind { port, .. }) => assert_eq!(port, first.port()),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second bind on the same port should fail"),
        }

        first.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_port_released_after_shutdown() {
        let (tx, _rx) = channel();
        let history = Arc::new(TimelineHistory::default());

        let server = CallbackServer::new(0, history.clone(), tx.clone()).await.unwrap();
        let port = server.port();
        server.shutdown().await.unwrap();

        let again = CallbackServer::new(port, history, tx).await.unwrap();
        assert_eq!(again.port(), port);
        again.shutdown().await.unwrap();
    }

    fn test_routes() -> (
        impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone,
        Arc<TimelineHistory>,
    ) {
        let (tx, _rx) = channel();
        let history = Arc::new(TimelineHistory::default());
        let router = Arc::new(EventRouter::new(history.clone(), tx));
        (routes(router), history)
    }

    #[tokio::test]
    async fn test_oversized_timeline_rejected() {
        let (filter, history) = test_routes();
        let body = vec![b'x'; MAX_TIMELINE_BYTES as usize + 1];

        let response = warp::test::request()
            .method("POST")
            .path("/:/timeline")
            .body(body)
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_push_without_length_rejected() {
        let (filter, history) = test_routes();

        let response = warp::test::request()
            .method("POST")
            .path("/:/timeline")
            .header("transfer-encoding", "chunked")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::LENGTH_REQUIRED);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_push_within_limit_recorded() {
        let (filter, history) = test_routes();

        let response = warp::test::request()
            .method("POST")
            .path("/:/timeline")
            .body(r#"<MediaContainer location="navigation"/>"#)
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(history.len(), 1);
    }
}
