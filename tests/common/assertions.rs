//! Event waiting helpers

use download_dispatcher::Event;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

/// Wait until an event matching `predicate` arrives
///
/// Returns the matching event, or `None` on timeout or a closed channel.
pub async fn wait_for_event(
    events: &mut Receiver<Event>,
    timeout: Duration,
    predicate: impl Fn(&Event) -> bool,
) -> Option<Event> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
///
/// Returns whether the condition was met.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
