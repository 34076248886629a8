//! Server-side play queues.
//!
//! A play queue is an ordered list of items held by a media server, with one
//! selected entry. Creating one always takes two round trips: the POST only
//! returns the new queue id, and the contents come from a follow-up GET.
//!
//! Mutations (`add`/`remove`) replace the whole local state from the server's
//! answer, or leave it untouched when the server rejects the request.

use std::collections::BTreeMap;

use http_client::{HttpClient, HttpResponse, Method};
use tracing::Span;

use crate::container::Container;
use crate::device::Device;
use crate::error::PlayQueueError;
use crate::identity::{Headers, ACCEPT_HEADER, CLIENT_IDENTIFIER_HEADER};
use crate::media::{MediaItem, MediaReference};

const PLAY_QUEUES: &str = "/playQueues";
const JSON: &str = "application/json";

/// Snapshot of a queue as last reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayQueueState {
    id: String,
    items: Vec<MediaItem>,
    selected_item_id: Option<u64>,
    /// Always a valid index into `items` when set
    selected_offset: Option<usize>,
    attributes: BTreeMap<String, String>,
}

impl PlayQueueState {
    pub fn new(id: impl Into<String>, items: Vec<MediaItem>) -> Self {
        Self {
            id: id.into(),
            items,
            ..Self::default()
        }
    }

    /// Build the state from a queue container.
    ///
    /// `fallback_id` is used when the container does not repeat the queue id.
    /// A selected offset outside the item list is dropped.
    pub fn from_container(container: Container, fallback_id: &str) -> Self {
        let (attributes, items) = container.into_parts();

        let id = attributes
            .get("playQueueID")
            .cloned()
            .unwrap_or_else(|| fallback_id.to_string());
        let selected_item_id = attributes
            .get("playQueueSelectedItemID")
            .and_then(|v| v.parse().ok());
        let selected_offset = attributes
            .get("playQueueSelectedItemOffset")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|offset| *offset < items.len());

        Self {
            id,
            items,
            selected_item_id,
            selected_offset,
            attributes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn selected_item_id(&self) -> Option<u64> {
        self.selected_item_id
    }

    pub fn selected_offset(&self) -> Option<usize> {
        self.selected_offset
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A play queue bound to the server that owns it
#[derive(Debug, Clone)]
pub struct PlayQueue {
    server: Device,
    http: HttpClient,
    state: PlayQueueState,
    span: Span,
}

impl PlayQueue {
    /// Create a queue seeded with `item` on `server`.
    ///
    /// `player_headers` must carry `X-Plex-Client-Identifier`; without it this
    /// fails before any request is made.
    pub fn create(
        server: &Device,
        http: &HttpClient,
        item: &MediaReference,
        player_headers: &Headers,
    ) -> Result<Self, PlayQueueError> {
        let client_identifier = player_headers
            .get(CLIENT_IDENTIFIER_HEADER)
            .ok_or(PlayQueueError::MissingHeader(CLIENT_IDENTIFIER_HEADER))?;

        let span = tracing::debug_span!("play_queue", server = %server.name);
        let params = queue_params(item, client_identifier);

        let response = {
            let _entered = span.enter();
            server.request(
                http,
                Method::Post,
                PLAY_QUEUES,
                &json_headers(player_headers),
                &params,
            )?
        };
        if !response.is_success() {
            return Err(PlayQueueError::Status(response.status));
        }

        let created =
            Container::decode(&response.body).map_err(|e| PlayQueueError::Malformed(e.to_string()))?;
        let id = created
            .get("playQueueID")
            .ok_or_else(|| PlayQueueError::Malformed("response has no playQueueID".to_string()))?
            .to_string();

        {
            let _entered = span.enter();
            tracing::debug!(%id, "play queue created");
        }

        let mut queue = Self {
            server: server.clone(),
            http: http.clone(),
            state: PlayQueueState::new(id, Vec::new()),
            span,
        };
        queue.refresh()?;
        Ok(queue)
    }

    /// Wrap a known state without contacting the server.
    pub fn from_state(server: Device, http: HttpClient, state: PlayQueueState) -> Self {
        let span = tracing::debug_span!("play_queue", server = %server.name, id = %state.id);
        Self {
            server,
            http,
            state,
            span,
        }
    }

    /// Re-fetch the queue and replace the local state.
    pub fn refresh(&mut self) -> Result<(), PlayQueueError> {
        let endpoint = format!("{PLAY_QUEUES}/{}", self.state.id);
        self.apply(Method::Get, &endpoint, &json_headers(&Headers::new()), &[])
    }

    /// Select `item` if it is queued and carries a queue item id.
    pub fn select(&mut self, item: &MediaItem) -> Option<&MediaItem> {
        let item_id = item.play_queue_item_id()?;
        let offset = self.state.items.iter().position(|queued| queued == item)?;

        self.state.selected_item_id = Some(item_id);
        self.state.selected_offset = Some(offset);
        self.state.items.get(offset)
    }

    /// Select the entry after the current one; nothing happens at the end.
    pub fn next(&mut self) -> Option<&MediaItem> {
        let offset = self.state.selected_offset?;
        let next = self.state.items.get(offset + 1)?.clone();
        self.select(&next)
    }

    /// Select the entry before the current one; nothing happens at the start.
    pub fn previous(&mut self) -> Option<&MediaItem> {
        let offset = self.state.selected_offset?.checked_sub(1)?;
        let previous = self.state.items.get(offset)?.clone();
        self.select(&previous)
    }

    /// Append `item` to the queue.
    pub fn add(
        &mut self,
        item: &MediaReference,
        player_headers: &Headers,
    ) -> Result<(), PlayQueueError> {
        let client_identifier = player_headers
            .get(CLIENT_IDENTIFIER_HEADER)
            .ok_or(PlayQueueError::MissingHeader(CLIENT_IDENTIFIER_HEADER))?;

        let params = queue_params(item, client_identifier);
        let endpoint = format!("{PLAY_QUEUES}/{}", self.state.id);
        self.apply(Method::Put, &endpoint, &json_headers(player_headers), &params)
    }

    /// Remove a queued entry.
    pub fn remove(&mut self, item: &MediaItem) -> Result<(), PlayQueueError> {
        let item_id = item
            .play_queue_item_id()
            .ok_or_else(|| PlayQueueError::ItemNotQueued(item.key().to_string()))?;

        let endpoint = format!("{PLAY_QUEUES}/{}/items/{item_id}", self.state.id);
        self.apply(Method::Delete, &endpoint, &json_headers(&Headers::new()), &[])
    }

    /// Send a request and replace the state from its answer.
    ///
    /// The state is only touched once the whole answer has decoded.
    fn apply(
        &mut self,
        method: Method,
        endpoint: &str,
        headers: &Headers,
        params: &[(String, String)],
    ) -> Result<(), PlayQueueError> {
        let _entered = self.span.enter();

        let result = self
            .server
            .request(&self.http, method, endpoint, headers, params)
            .map_err(PlayQueueError::from)
            .and_then(|response| decode_queue(response, &self.state.id));

        match result {
            Ok(state) => {
                tracing::debug!(id = %state.id, items = state.len(), "play queue updated");
                self.state = state;
                Ok(())
            }
            Err(e) => {
                tracing::error!(%method, endpoint, error = %e, "could not update play queue");
                Err(e)
            }
        }
    }

    pub fn id(&self) -> &str {
        self.state.id()
    }

    pub fn items(&self) -> &[MediaItem] {
        self.state.items()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn selected_offset(&self) -> Option<usize> {
        self.state.selected_offset()
    }

    pub fn selected_item(&self) -> Option<&MediaItem> {
        self.state.items.get(self.state.selected_offset?)
    }

    pub fn state(&self) -> &PlayQueueState {
        &self.state
    }

    pub fn server(&self) -> &Device {
        &self.server
    }
}

fn queue_params(item: &MediaReference, client_identifier: &str) -> Vec<(String, String)> {
    vec![
        ("type".to_string(), item.media_class().as_str().to_string()),
        ("uri".to_string(), item.queue_uri(client_identifier)),
    ]
}

fn json_headers(headers: &Headers) -> Headers {
    let mut headers = headers.clone();
    headers.insert(ACCEPT_HEADER.to_string(), JSON.to_string());
    headers
}

fn decode_queue(response: HttpResponse, id: &str) -> Result<PlayQueueState, PlayQueueError> {
    if !response.is_success() {
        return Err(PlayQueueError::Status(response.status));
    }
    let container =
        Container::decode(&response.body).map_err(|e| PlayQueueError::Malformed(e.to_string()))?;
    Ok(PlayQueueState::from_container(container, id))
}
