//! Protocol side of the callback listener.
//!
//! [`CallbackServer`] accepts the player's HTTP requests and records timeline
//! payloads. The dispatcher task here consumes the resulting events: it
//! decodes each timeline for the user callback and forwards command echoes
//! back through the [`CommandChannel`].

use std::collections::VecDeque;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use callback_server::{CallbackServer, ListenerEvent, TimelineHistory};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, Span};

use crate::command::{command_path, CommandChannel};
use crate::error::{RemoteError, Result};
use crate::timeline::TimelineSnapshot;

/// Error type user callbacks may return
pub type CallbackError = Box<dyn Error + Send + Sync>;

/// User handler invoked with every decoded timeline push
pub type TimelineCallback =
    Arc<dyn Fn(&TimelineSnapshot) -> std::result::Result<(), CallbackError> + Send + Sync>;

const MAX_PENDING_FAILURES: usize = 32;

/// Callback failures waiting to be collected by the session owner.
///
/// Holds at most 32 failures; older ones are dropped first.
#[derive(Debug, Default)]
pub struct CallbackFailures {
    pending: Mutex<VecDeque<RemoteError>>,
}

impl CallbackFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: RemoteError) {
        let mut pending = self.pending.lock();
        if pending.len() == MAX_PENDING_FAILURES {
            pending.pop_front();
        }
        pending.push_back(error);
    }

    /// Oldest pending failure.
    pub fn take(&self) -> Option<RemoteError> {
        self.pending.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<RemoteError> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// Running listener: the HTTP server plus its dispatcher task
pub struct CallbackListener {
    server: CallbackServer,
    dispatcher: Option<JoinHandle<()>>,
    dispatcher_shutdown: Option<mpsc::Sender<()>>,
    shutdown_timeout: Duration,
}

impl CallbackListener {
    /// Bind on `port` (0 for OS-assigned) and start dispatching.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        port: u16,
        history: Arc<TimelineHistory>,
        channel: Arc<CommandChannel>,
        callback: Option<TimelineCallback>,
        failures: Arc<CallbackFailures>,
        shutdown_timeout: Duration,
        span: Span,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let server = CallbackServer::new(port, history, event_tx)
            .await?
            .with_shutdown_timeout(shutdown_timeout);

        let (dispatcher_shutdown, shutdown_rx) = mpsc::channel(1);
        let dispatcher = tokio::spawn(
            dispatch(event_rx, shutdown_rx, channel, callback, failures).instrument(span),
        );

        Ok(Self {
            server,
            dispatcher: Some(dispatcher),
            dispatcher_shutdown: Some(dispatcher_shutdown),
            shutdown_timeout,
        })
    }

    /// Port the listener is actually bound to.
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn history(&self) -> &Arc<TimelineHistory> {
        self.server.history()
    }

    /// Stop the server, release the port and stop the dispatcher.
    pub async fn stop(mut self) -> Result<()> {
        let server_result = self.server.shutdown().await;

        if let Some(tx) = self.dispatcher_shutdown.take() {
            let _ = tx.send(()).await;
        }

        let dispatcher_result = match self.dispatcher.take() {
            Some(mut task) => match timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(RemoteError::Runtime(format!("dispatcher failed: {e}"))),
                Err(_) => {
                    task.abort();
                    Err(RemoteError::Runtime(
                        "dispatcher did not stop in time".to_string(),
                    ))
                }
            },
            None => Ok(()),
        };

        server_result?;
        dispatcher_result
    }
}

async fn dispatch(
    mut events: mpsc::UnboundedReceiver<ListenerEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
    channel: Arc<CommandChannel>,
    callback: Option<TimelineCallback>,
    failures: Arc<CallbackFailures>,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        };

        match event {
            ListenerEvent::Timeline { path, body } => {
                tracing::debug!(%path, bytes = body.len(), "timeline received");
                if let Some(callback) = &callback {
                    run_callback(Arc::clone(callback), body, &failures).await;
                }
            }
            ListenerEvent::CommandEcho { path, params } => {
                forward_echo(Arc::clone(&channel), path, params).await;
            }
        }
    }

    tracing::debug!("dispatcher stopped");
}

/// Run the user callback off the runtime threads and keep its failure.
async fn run_callback(callback: TimelineCallback, body: String, failures: &CallbackFailures) {
    let Some(snapshot) = TimelineSnapshot::decode(&body) else {
        return;
    };

    let outcome = tokio::task::spawn_blocking(move || callback(&snapshot)).await;

    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "callback panicked".to_string());
            format!("panic: {message}")
        }
        Err(e) => e.to_string(),
    };

    tracing::warn!(error = %failure, "timeline callback failed");
    failures.push(RemoteError::CallbackFailed(failure));
}

async fn forward_echo(channel: Arc<CommandChannel>, path: String, params: Vec<(String, String)>) {
    let command = command_path(&path).to_string();
    if command.is_empty() {
        return;
    }

    tracing::debug!(%command, "forwarding command echo");
    let sent = tokio::task::spawn_blocking(move || channel.send(&command, &params)).await;

    match sent {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "command echo forwarding failed"),
        Err(e) => tracing::warn!(error = %e, "command echo task failed"),
    }
}
