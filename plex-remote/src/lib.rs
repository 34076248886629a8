//! # plex-remote
//!
//! Remote control for Plex companion players.
//!
//! A [`RemoteSession`] sends navigation and playback commands to one player
//! and follows what it is doing, either by polling its timeline or by
//! subscribing to timeline pushes delivered to a local callback listener.
//! Media is started through server-side [`PlayQueue`]s.
//!
//! The API is blocking. Subscribe mode runs its listener and renewal loop on a
//! private runtime owned by the session.
//!
//! ```rust,ignore
//! use plex_remote::{Device, RemoteConfig, RemoteSession};
//!
//! let devices = Device::parse_resources(&resources_xml)?;
//! let Some(player) = devices.into_iter().find(|d| d.role().is_player()) else {
//!     return Ok(());
//! };
//!
//! let session = RemoteSession::new(player, RemoteConfig::default())?;
//! if let Some(timeline) = session.poll()? {
//!     println!("location: {:?}", timeline.location());
//! }
//! session.pause()?;
//! ```

pub mod command;
pub mod config;
pub mod container;
pub mod device;
mod error;
pub mod identity;
pub mod listener;
pub mod logging;
pub mod media;
pub mod play_queue;
pub mod session;
pub mod subscription;
pub mod timeline;

pub use command::{CommandChannel, CommandRequest, PlayerCommand};
pub use config::RemoteConfig;
pub use container::{Container, DecodeError};
pub use device::{Connection, Device, DeviceRole};
pub use error::{DeviceError, MediaError, PlayQueueError, RemoteError, Result};
pub use identity::{Headers, RemoteIdentity};
pub use listener::{CallbackError, TimelineCallback};
pub use media::{MediaBase, MediaClass, MediaItem, MediaKind, MediaReference};
pub use play_queue::{PlayQueue, PlayQueueState};
pub use session::RemoteSession;
pub use timeline::{Location, TimelineEntry, TimelineSnapshot};

pub use callback_server::TimelineHistory;
pub use http_client::HttpClient;
