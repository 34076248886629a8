//! Event routing for inbound player requests.
//!
//! This module provides the `EventRouter` which records timeline pushes in the
//! shared [`TimelineHistory`] and forwards every accepted request to a channel.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::history::TimelineHistory;

/// A request accepted by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// A POSTed timeline body
    Timeline {
        /// Request path the player posted to
        path: String,
        /// The raw timeline payload
        body: String,
    },
    /// A GET the player sent back to the controller
    CommandEcho {
        /// Request path, e.g. `/player/playback/play`
        path: String,
        /// Query parameters in the order they were received
        params: Vec<(String, String)>,
    },
}

/// Routes requests from the HTTP layer to the history and a channel.
#[derive(Debug, Clone)]
pub struct EventRouter {
    /// Shared ring buffer of timeline payloads
    history: Arc<TimelineHistory>,
    /// Channel for forwarding accepted requests
    event_sender: mpsc::UnboundedSender<ListenerEvent>,
}

impl EventRouter {
    /// Create a new event router.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tokio::sync::mpsc;
    /// use callback_server::{EventRouter, ListenerEvent, TimelineHistory};
    ///
    /// let (tx, _rx) = mpsc::unbounded_channel::<ListenerEvent>();
    /// let router = EventRouter::new(Arc::new(TimelineHistory::default()), tx);
    /// ```
    pub fn new(
        history: Arc<TimelineHistory>,
        event_sender: mpsc::UnboundedSender<ListenerEvent>,
    ) -> Self {
        Self {
            history,
            event_sender,
        }
    }

    /// Record a timeline body and forward it.
    ///
    /// Empty bodies are ignored. Returns `true` if the payload was stored.
    pub fn route_timeline(&self, path: &str, body: String) -> bool {
        if body.is_empty() {
            tracing::debug!(path, "ignoring empty timeline push");
            return false;
        }

        self.history.push(body.clone());

        if self
            .event_sender
            .send(ListenerEvent::Timeline {
                path: path.to_string(),
                body,
            })
            .is_err()
        {
            tracing::debug!(path, "timeline receiver dropped, payload kept in history only");
        }

        true
    }

    /// Forward a command echo and return the acknowledgement text.
    pub fn route_command(&self, path: String, params: Vec<(String, String)>) -> String {
        let ack = acknowledgement(&path, &params);

        if self
            .event_sender
            .send(ListenerEvent::CommandEcho { path, params })
            .is_err()
        {
            tracing::debug!("command echo receiver dropped");
        }

        ack
    }

    /// The history this router writes to.
    pub fn history(&self) -> &Arc<TimelineHistory> {
        &self.history
    }
}

/// Build the `"{path}\n{params}"` confirmation line sent back for a GET.
pub fn acknowledgement(path: &str, params: &[(String, String)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}\n{query}")
}
