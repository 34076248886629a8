//! Remote control session for a single player.
//!
//! [`RemoteSession`] is the blocking entry point of the crate. Commands go out
//! on the caller's thread. Subscribe mode additionally runs a private tokio
//! runtime that hosts the callback listener, its dispatcher and the renewal
//! loop; `unsubscribe` waits for all three before the runtime is shut down.
//!
//! Sessions must not be created, used or dropped from inside an async context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use callback_server::TimelineHistory;
use http_client::HttpClient;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tracing::Span;

use crate::command::{
    CommandChannel, CommandRequest, PlayerCommand, MIRROR_DETAILS, PLAY_MEDIA, TIMELINE_POLL,
    TIMELINE_SUBSCRIBE, TIMELINE_UNSUBSCRIBE,
};
use crate::config::RemoteConfig;
use crate::device::{Connection, Device};
use crate::error::{DeviceError, RemoteError, Result};
use crate::identity::{Headers, RemoteIdentity, TARGET_CLIENT_IDENTIFIER_HEADER};
use crate::listener::{CallbackError, CallbackFailures, CallbackListener, TimelineCallback};
use crate::media::MediaItem;
use crate::play_queue::PlayQueue;
use crate::subscription::SubscriptionLoop;
use crate::timeline::{Location, TimelineEntry, TimelineSnapshot};

const LISTENER_PROTOCOL: &str = "http";
const RUNTIME_THREADS: usize = 2;

/// Everything that lives only while subscribed
struct ActiveSubscription {
    runtime: Runtime,
    listener: CallbackListener,
    renewal: SubscriptionLoop,
}

/// Controls one player.
///
/// # Example
///
/// ```rust,ignore
/// use plex_remote::{Connection, Device, DeviceRole, RemoteConfig, RemoteSession};
///
/// let player = Device::new("Shield", "player-1", DeviceRole::Player)
///     .with_connection(Connection::new("http", "192.168.1.20", 32500));
///
/// let session = RemoteSession::new(player, RemoteConfig::default())?
///     .with_callback(|timeline| {
///         println!("playing: {}", timeline.is_playing());
///         Ok(())
///     });
///
/// session.subscribe()?;
/// session.play()?;
/// session.unsubscribe();
/// ```
pub struct RemoteSession {
    identity: RemoteIdentity,
    config: RemoteConfig,
    http: HttpClient,
    channel: Arc<CommandChannel>,
    subscribed: Arc<AtomicBool>,
    active: Mutex<Option<ActiveSubscription>>,
    history: Arc<TimelineHistory>,
    callback: Option<TimelineCallback>,
    failures: Arc<CallbackFailures>,
    span: Span,
}

impl RemoteSession {
    /// Create a session for `player`.
    ///
    /// A player without an active connection is probed once here.
    pub fn new(mut player: Device, config: RemoteConfig) -> Result<Self> {
        if !player.role().is_player() {
            return Err(RemoteError::NotAPlayer(player.name.clone()));
        }

        let http = config.http_client();
        if player.active_connection().is_none() {
            player.connect(&http)?;
        }

        let identity = RemoteIdentity::new(config.name.clone(), config.listener_port);
        let span = tracing::info_span!(
            "remote",
            client_id = %identity.client_identifier(),
            name = %identity.name(),
            player = %player.name,
        );

        let channel = Arc::new(CommandChannel::new(
            player,
            http.clone(),
            identity.headers(),
            span.clone(),
        ));
        let history = Arc::new(TimelineHistory::new(config.history_capacity));

        Ok(Self {
            identity,
            config,
            http,
            channel,
            subscribed: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
            history,
            callback: None,
            failures: Arc::new(CallbackFailures::new()),
            span,
        })
    }

    /// Call `callback` with every decoded timeline push.
    ///
    /// Takes effect from the next `subscribe`.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TimelineSnapshot) -> std::result::Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Send `/player/<path>` with `params` and return the raw body.
    pub fn command(&self, path: &str, params: &[(String, String)]) -> Result<String> {
        self.channel.send(path, params)
    }

    /// Send a typed command and return the raw body.
    ///
    /// # Arguments
    ///
    /// * `command` - The command to send. Invalid arguments, such as a volume
    ///   above 100, are rejected with `InvalidParameter` before anything is
    ///   sent and without consuming a command id.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// session.send(PlayerCommand::SeekTo { offset_ms: 90_000 })?;
    /// ```
    pub fn send(&self, command: PlayerCommand) -> Result<String> {
        self.send_request(command.into_request()?)
    }

    /// Send an already built request, e.g. from [`PlayerCommand::with_media_type`].
    pub fn send_request(&self, request: CommandRequest) -> Result<String> {
        self.channel.send(&request.path, &request.params)
    }

    /// Start receiving timeline pushes. Does nothing when already subscribed.
    ///
    /// Timelines kept from an earlier subscription are discarded.
    ///
    /// If the player does not accept the subscription, the listener is torn
    /// down again and the error is returned.
    pub fn subscribe(&self) -> Result<()> {
        let mut active = self.active.lock();
        if active.is_some() {
            tracing::debug!(parent: &self.span, "already subscribed");
            return Ok(());
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .thread_name("plex-remote")
            .enable_all()
            .build()
            .map_err(|e| RemoteError::Runtime(e.to_string()))?;

        // Each subscription starts without timelines from the previous one
        self.history.clear();
        let listener = runtime.block_on(CallbackListener::start(
            self.config.listener_port,
            Arc::clone(&self.history),
            Arc::clone(&self.channel),
            self.callback.clone(),
            Arc::clone(&self.failures),
            self.config.shutdown_timeout,
            self.span.clone(),
        ))?;

        let request = self.subscribe_request(listener.port());
        if let Err(e) = self.channel.send(&request.path, &request.params) {
            tracing::warn!(parent: &self.span, error = %e, "player refused subscription");
            if let Err(stop) = runtime.block_on(listener.stop()) {
                tracing::warn!(parent: &self.span, error = %stop, "listener did not stop cleanly");
            }
            runtime.shutdown_timeout(self.config.shutdown_timeout);
            return Err(e);
        }

        self.subscribed.store(true, Ordering::SeqCst);
        let renewal = SubscriptionLoop::start(
            runtime.handle(),
            Arc::clone(&self.channel),
            Arc::clone(&self.subscribed),
            request,
            self.config.renewal_interval,
            self.config.shutdown_timeout,
            self.span.clone(),
        );

        tracing::info!(parent: &self.span, port = listener.port(), "subscribed");
        *active = Some(ActiveSubscription {
            runtime,
            listener,
            renewal,
        });
        Ok(())
    }

    /// Stop receiving timeline pushes. Does nothing when not subscribed.
    ///
    /// The renewal loop is stopped before the unsubscribe command goes out, so
    /// no renewal reaches the player after it. Never fails: the unsubscribe
    /// command is best-effort and local teardown always completes.
    pub fn unsubscribe(&self) {
        let mut active = self.active.lock();
        let Some(ActiveSubscription {
            runtime,
            listener,
            renewal,
        }) = active.take()
        else {
            return;
        };

        // The loop must be gone, including a renewal already in flight,
        // before the player sees the unsubscribe.
        self.subscribed.store(false, Ordering::SeqCst);
        if let Err(e) = runtime.block_on(renewal.shutdown()) {
            tracing::warn!(parent: &self.span, error = %e, "renewal loop did not stop cleanly");
        }

        if let Err(e) = self.channel.send(TIMELINE_UNSUBSCRIBE, &[]) {
            tracing::warn!(parent: &self.span, error = %e, "unsubscribe command failed");
        }
        if let Err(e) = runtime.block_on(listener.stop()) {
            tracing::warn!(parent: &self.span, error = %e, "listener did not stop cleanly");
        }
        runtime.shutdown_timeout(self.config.shutdown_timeout);

        self.channel.reset();
        tracing::info!(parent: &self.span, "unsubscribed");
    }

    /// Ask the player for its timeline once.
    ///
    /// Works with or without a subscription and leaves it untouched. An
    /// undecodable answer yields `Ok(None)`.
    pub fn poll(&self) -> Result<Option<TimelineSnapshot>> {
        let body = self
            .channel
            .send(TIMELINE_POLL, &[("wait".to_string(), "0".to_string())])?;
        Ok(TimelineSnapshot::decode(&body))
    }

    /// The latest timeline pushed to the listener, if any.
    pub fn current_timeline(&self) -> Option<TimelineSnapshot> {
        self.history
            .latest()
            .and_then(|payload| TimelineSnapshot::decode(&payload))
    }

    /// Entry for the media class currently full screen.
    pub fn active_timeline(&self) -> Option<TimelineEntry> {
        self.current_timeline()?.active().cloned()
    }

    pub fn active_location(&self) -> Option<Location> {
        self.current_timeline()?.location()
    }

    pub fn is_playing(&self) -> bool {
        self.current_timeline()
            .map(|timeline| timeline.is_playing())
            .unwrap_or(false)
    }

    /// Queue `item` on `server` and have the player start it.
    pub fn play_media(&self, item: &MediaItem, server: &Device) -> Result<PlayQueue> {
        let connection = self.server_connection(server)?;

        let mut headers = self.identity.headers();
        headers.insert(
            TARGET_CLIENT_IDENTIFIER_HEADER.to_string(),
            self.channel.player().client_identifier.clone(),
        );
        let queue = PlayQueue::create(server, &self.http, &item.reference(), &headers)?;

        let offset = if item.in_progress() {
            item.view_offset().unwrap_or(0)
        } else {
            0
        };

        let mut params = media_params(item, server, &connection, &connection.protocol);
        params.push(("offset".to_string(), offset.to_string()));
        params.push((
            "containerKey".to_string(),
            format!("/playQueues/{}?own=1&window=200", queue.id()),
        ));

        self.channel.send(PLAY_MEDIA, &params)?;
        Ok(queue)
    }

    /// Show the details screen for `item` on the player.
    pub fn mirror(&self, item: &MediaItem, server: &Device) -> Result<String> {
        let connection = self.server_connection(server)?;
        let protocol = if server.https_required {
            connection.protocol.as_str()
        } else {
            "http"
        };
        let params = media_params(item, server, &connection, protocol);
        self.channel.send(MIRROR_DETAILS, &params)
    }

    /// Move the cursor up.
    pub fn up(&self) -> Result<String> {
        self.send(PlayerCommand::MoveUp)
    }

    /// Move the cursor down.
    pub fn down(&self) -> Result<String> {
        self.send(PlayerCommand::MoveDown)
    }

    /// Move the cursor left.
    pub fn left(&self) -> Result<String> {
        self.send(PlayerCommand::MoveLeft)
    }

    /// Move the cursor right.
    pub fn right(&self) -> Result<String> {
        self.send(PlayerCommand::MoveRight)
    }

    /// Activate the focused element.
    pub fn select(&self) -> Result<String> {
        self.send(PlayerCommand::Select)
    }

    /// Go back one screen.
    pub fn back(&self) -> Result<String> {
        self.send(PlayerCommand::Back)
    }

    /// Jump to the home screen.
    pub fn home(&self) -> Result<String> {
        self.send(PlayerCommand::Home)
    }

    /// Jump to the now-playing music screen.
    pub fn music(&self) -> Result<String> {
        self.send(PlayerCommand::Music)
    }

    /// Resume playback.
    pub fn play(&self) -> Result<String> {
        self.send(PlayerCommand::Play)
    }

    /// Pause playback.
    pub fn pause(&self) -> Result<String> {
        self.send(PlayerCommand::Pause)
    }

    /// Stop playback.
    pub fn stop(&self) -> Result<String> {
        self.send(PlayerCommand::Stop)
    }

    /// Skip to the next item in the queue.
    pub fn skip_next(&self) -> Result<String> {
        self.send(PlayerCommand::SkipNext)
    }

    /// Skip to the previous item in the queue.
    pub fn skip_previous(&self) -> Result<String> {
        self.send(PlayerCommand::SkipPrevious)
    }

    /// Jump back a few seconds. The step size is chosen by the player.
    pub fn step_back(&self) -> Result<String> {
        self.send(PlayerCommand::StepBack)
    }

    /// Jump forward a few seconds. The step size is chosen by the player.
    pub fn step_forward(&self) -> Result<String> {
        self.send(PlayerCommand::StepForward)
    }

    /// Seek to `offset_ms` milliseconds from the start of the item.
    pub fn seek(&self, offset_ms: u64) -> Result<String> {
        self.send(PlayerCommand::SeekTo { offset_ms })
    }

    /// Skip to the queued item with library key `key`.
    pub fn skip_to(&self, key: impl Into<String>) -> Result<String> {
        self.send(PlayerCommand::SkipTo { key: key.into() })
    }

    /// Set the volume as a percentage, 0 to 100.
    ///
    /// Values above 100 fail with `InvalidParameter` and nothing is sent.
    pub fn set_volume(&self, volume: u8) -> Result<String> {
        self.send(PlayerCommand::SetVolume { volume })
    }

    /// Oldest timeline callback failure not yet collected.
    pub fn take_callback_error(&self) -> Option<RemoteError> {
        self.failures.take()
    }

    /// All pending callback failures, oldest first.
    pub fn callback_errors(&self) -> Vec<RemoteError> {
        self.failures.drain()
    }

    /// Whether a subscription is currently active.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Port the callback listener is bound to while subscribed.
    pub fn listener_port(&self) -> Option<u16> {
        self.active
            .lock()
            .as_ref()
            .map(|active| active.listener.port())
    }

    /// The `commandID` the next command will carry.
    pub fn sequence(&self) -> u64 {
        self.channel.sequence()
    }

    pub fn identity(&self) -> &RemoteIdentity {
        &self.identity
    }

    pub fn headers(&self) -> Headers {
        self.identity.headers()
    }

    pub fn player(&self) -> &Device {
        self.channel.player()
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn timeline_history(&self) -> Vec<String> {
        self.history.entries()
    }

    fn subscribe_request(&self, port: u16) -> CommandRequest {
        CommandRequest::new(
            TIMELINE_SUBSCRIBE,
            vec![
                ("protocol".to_string(), LISTENER_PROTOCOL.to_string()),
                ("port".to_string(), port.to_string()),
            ],
        )
    }

    fn server_connection(&self, server: &Device) -> Result<Connection> {
        if !server.role().is_server() {
            return Err(RemoteError::NotAServer(server.name.clone()));
        }
        server
            .active_connection()
            .cloned()
            .ok_or_else(|| DeviceError::NoActiveConnection(server.name.clone()).into())
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Parameters shared by `playMedia` and `mirror/details`.
fn media_params(
    item: &MediaItem,
    server: &Device,
    connection: &Connection,
    protocol: &str,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("key".to_string(), item.key().to_string()),
        ("machineIdentifier".to_string(), server.client_identifier.clone()),
        ("address".to_string(), connection.address.clone()),
        ("port".to_string(), connection.port.to_string()),
        ("protocol".to_string(), protocol.to_string()),
    ];
    if let Some(token) = &server.access_token {
        params.push(("token".to_string(), token.clone()));
    }
    params
}
