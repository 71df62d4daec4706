//! # download-dispatcher
//!
//! Lifecycle event dispatcher for download engines such as aria2.
//!
//! The engine emits a notification whenever a transfer starts, fails, stops,
//! completes or finishes its torrent data. The dispatcher turns each one into a
//! task-level decision: admission limits, duplicate rejection, file-selection
//! cleanup, seed-or-stop, and user notification through the task's
//! [`Listener`].
//!
//! ## Design Philosophy
//!
//! - **Orchestration only** - transfer, storage and rendering stay behind
//!   collaborator traits ([`DownloadEngine`], [`Messenger`],
//!   [`DuplicateIndex`](storage::DuplicateIndex), [`FileSystem`](fsops::FileSystem))
//! - **Fire-and-forget handlers** - every notification runs on its own task
//! - **Race-tolerant** - a task that vanished mid-handling is a normal exit
//! - **Event-driven** - observers subscribe to [`Event`]s, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use download_dispatcher::engine::DownloadEngine;
//! use download_dispatcher::messaging::Messenger;
//! use download_dispatcher::storage::DuplicateIndex;
//! use download_dispatcher::{
//!     Collaborators, Config, Dispatcher, EngineNotification, run_with_shutdown,
//! };
//! use futures::Stream;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(
//!     engine: Arc<dyn DownloadEngine>,
//!     messenger: Arc<dyn Messenger>,
//!     index: Arc<dyn DuplicateIndex>,
//!     notifications: impl Stream<Item = EngineNotification> + Send + 'static,
//! ) -> download_dispatcher::Result<()> {
//!     let config = Config::from_json_str(r#"{"duplicate": {"stop_duplicate": true}}"#)?;
//!     let dispatcher = Dispatcher::new(config, Collaborators::new(engine, messenger, index))?;
//!
//!     // Subscribe to events
//!     let mut events = dispatcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             tracing::info!(?event, "dispatcher event");
//!         }
//!     });
//!
//!     let handle = dispatcher.listen(notifications, CancellationToken::new());
//!     run_with_shutdown(handle).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Engine-notification dispatcher (decomposed into one submodule per handler)
pub mod dispatcher;
/// Download engine surface
pub mod engine;
/// Error types
pub mod error;
/// Filesystem cleanup after torrent completion
pub mod fsops;
/// Per-task listener contract
pub mod listener;
/// Messaging collaborator and fixed message texts
pub mod messaging;
/// Admission, duplicate and seed policy evaluators
pub mod policy;
/// In-flight task registry
pub mod registry;
/// Remote-storage duplicate index
pub mod storage;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::{Collaborators, Dispatcher, DispatcherHandle};
pub use engine::{DownloadEngine, DownloadSnapshot, EngineNotification};
pub use error::{EngineError, Error, Result};
pub use listener::{Listener, ListenerContext, TaskListener, UploadDestination};
pub use messaging::{Controls, MessageRef, Messenger};
pub use registry::{TaskRecord, TaskRegistry};
pub use types::{Event, Gid, LifecycleState, NotificationKind, TaskId, UserId};

/// Run the notification loop until a termination signal arrives, then stop it.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns early if the loop exits on its own (stream ended or its token was
/// cancelled elsewhere).
pub async fn run_with_shutdown(handle: DispatcherHandle) -> Result<()> {
    let token = handle.shutdown_token();
    tokio::select! {
        _ = wait_for_signal() => {}
        _ = token.cancelled() => {
            tracing::info!("dispatcher cancelled before any signal");
        }
    }
    handle.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
