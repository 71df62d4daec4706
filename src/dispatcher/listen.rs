//! Notification intake: one spawned handler per engine notification.

use crate::engine::EngineNotification;
use crate::error::{Error, Result};
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Dispatcher;

/// Running notification loop started by [`Dispatcher::listen`]
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Token that stops the loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop taking notifications and wait for the loop to exit
    ///
    /// Handlers already spawned keep running to completion.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("stopping notification listener");
        self.shutdown.cancel();
        self.join().await
    }

    /// Wait for the loop to exit on its own (stream ended or token cancelled)
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("notification listener panicked: {e}")))
    }
}

impl Dispatcher {
    /// Consume engine notifications until the stream ends or `shutdown` fires
    ///
    /// Each notification is handled on its own spawned task, so a handler
    /// waiting on a slow transfer never delays unrelated notifications. A quiet
    /// period of `notification_idle_timeout` is logged and the loop keeps
    /// waiting.
    pub fn listen<S>(&self, notifications: S, shutdown: CancellationToken) -> DispatcherHandle
    where
        S: Stream<Item = EngineNotification> + Send + 'static,
    {
        let dispatcher = self.clone();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            dispatcher.run_listener(notifications, token).await;
        });
        DispatcherHandle { shutdown, task }
    }

    /// Spawn the handler for one notification
    ///
    /// Handler errors are logged; they never reach the caller.
    pub fn dispatch(&self, notification: EngineNotification) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let kind = notification.kind;
            let gid = notification.gid.clone();
            if let Err(e) = dispatcher.handle(notification).await {
                tracing::error!(%kind, gid = %gid, error = %e, "notification handler failed");
            }
        })
    }

    async fn run_listener<S>(self, notifications: S, shutdown: CancellationToken)
    where
        S: Stream<Item = EngineNotification> + Send + 'static,
    {
        let idle_timeout = self.config.timing.notification_idle_timeout;
        let mut notifications = Box::pin(notifications);
        tracing::info!(?idle_timeout, "listening for engine notifications");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("notification listener stopped");
                    break;
                }
                next = tokio::time::timeout(idle_timeout, notifications.next()) => match next {
                    Ok(Some(notification)) => {
                        tracing::debug!(kind = %notification.kind, gid = %notification.gid, "engine notification");
                        self.dispatch(notification);
                    }
                    Ok(None) => {
                        tracing::info!("engine notification stream ended");
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(?idle_timeout, "no engine notifications, still listening");
                    }
                }
            }
        }
    }
}
