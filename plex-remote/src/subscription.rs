//! Periodic renewal of the timeline subscription.
//!
//! Players treat a timeline subscription as a lease that silently expires, so
//! the subscribe command is re-sent every period while the session stays
//! subscribed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, Span};

use crate::command::{CommandChannel, CommandRequest};
use crate::error::{RemoteError, Result};

/// Background task re-issuing the subscribe command.
///
/// The subscribed flag is checked before sleeping and again right after
/// waking, so clearing it stops the loop without a stray renewal. The first
/// renewal is one full period after start.
pub struct SubscriptionLoop {
    background_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SubscriptionLoop {
    /// Spawn the loop on `handle`.
    pub fn start(
        handle: &Handle,
        channel: Arc<CommandChannel>,
        subscribed: Arc<AtomicBool>,
        request: CommandRequest,
        period: Duration,
        shutdown_timeout: Duration,
        span: Span,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let background_task = handle.spawn(
            Self::renewal_task(channel, subscribed, request, period, shutdown_rx).instrument(span),
        );

        Self {
            background_task: Some(background_task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        }
    }

    async fn renewal_task(
        channel: Arc<CommandChannel>,
        subscribed: Arc<AtomicBool>,
        request: CommandRequest,
        period: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::debug!(period_ms = period.as_millis() as u64, "renewal loop started");

        loop {
            if !subscribed.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = sleep(period) => {}
                _ = shutdown_rx.recv() => break,
            }

            if !subscribed.load(Ordering::SeqCst) {
                break;
            }

            let channel = Arc::clone(&channel);
            let CommandRequest { path, params } = request.clone();
            let renewal =
                tokio::task::spawn_blocking(move || channel.send(&path, &params)).await;

            match renewal {
                Ok(Ok(_)) => tracing::debug!("subscription renewed"),
                Ok(Err(e)) => tracing::warn!(error = %e, "subscription renewal failed"),
                Err(e) => tracing::warn!(error = %e, "renewal task failed"),
            }
        }

        tracing::debug!("renewal loop stopped");
    }

    /// Signal the loop and wait for it to finish.
    ///
    /// A loop that does not stop within the shutdown timeout is aborted.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            // The loop may already have exited on the flag
            let _ = shutdown_tx.send(()).await;
        }

        let Some(mut task) = self.background_task.take() else {
            return Ok(());
        };

        match timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RemoteError::Runtime(format!("renewal task failed: {e}"))),
            Err(_) => {
                task.abort();
                Err(RemoteError::Runtime(format!(
                    "renewal task did not stop within {:?}",
                    self.shutdown_timeout
                )))
            }
        }
    }
}
