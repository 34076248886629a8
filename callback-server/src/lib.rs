//! Generic HTTP listener for player callbacks.
//!
//! This crate provides a lightweight HTTP server the remote player talks back
//! to. It has no knowledge of the timeline format or the command alphabet.
//!
//! # Overview
//!
//! The callback server consists of three main components:
//!
//! - [`CallbackServer`]: HTTP server bound to a local port. It accepts timeline
//!   pushes (`POST`) and command echoes (`GET`) on any path.
//! - [`EventRouter`]: Records timeline bodies in a [`TimelineHistory`] and
//!   forwards every accepted request to a channel as a [`ListenerEvent`].
//! - [`TimelineHistory`]: Fixed-capacity ring buffer of the latest payloads,
//!   readable from any thread.
//!
//! Decoding payloads and acting on echoed commands is left to the consuming
//! crate, which drains the channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use callback_server::{CallbackServer, ListenerError, ListenerEvent, TimelineHistory};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ListenerError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<ListenerEvent>();
//!     let history = Arc::new(TimelineHistory::new(10));
//!
//!     let server = CallbackServer::new(8000, history.clone(), tx).await?;
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             if let ListenerEvent::Timeline { body, .. } = event {
//!                 println!("timeline: {body}");
//!             }
//!         }
//!     });
//!
//!     // ... later
//!     println!("latest: {:?}", history.latest());
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod error;
pub mod history;
pub mod router;
mod server;

pub use error::ListenerError;
pub use history::{TimelineHistory, DEFAULT_HISTORY_CAPACITY};
pub use router::{acknowledgement, EventRouter, ListenerEvent};
pub use server::{CallbackServer, DEFAULT_SHUTDOWN_TIMEOUT, MAX_TIMELINE_BYTES};
