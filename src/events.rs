//! Typed event hub for connection lifecycle and message events
//!
//! A closed event enumeration broadcast to all registered listeners in
//! publish order. No I/O happens here; the hub is the seam between the
//! connection layer and everything above it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::{FeedError, Result};
use crate::protocol::Inbound;

/// Events observable on a feed pipeline
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The socket transitioned to open
    Open,
    /// The socket closed and will not transparently recover
    Close,
    /// A non-fatal failure, e.g. reconnect exhaustion
    Error(String),
    /// A classified inbound frame
    Message(Inbound),
    /// A subscribe request was acknowledged with this channel id
    Subscribed(u64),
    /// The active subscription was torn down
    Unsubscribed(u64),
}

/// Publish/subscribe registry for [`FeedEvent`]s
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<FeedEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current listeners. Lost events (no listeners)
    /// are fine: the hub does not buffer for future subscribers.
    pub fn emit(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    /// Register a listener receiving every event from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Wait for the next event matching `predicate`, or fail after `wait`.
    ///
    /// The listener is registered synchronously, before the returned future
    /// is polled, so a caller can install the waiter and then send the
    /// request that provokes the reply without racing it. The listener is
    /// dropped on every exit path: match, timeout, or cancellation.
    pub fn wait_for<F>(
        &self,
        wait: Duration,
        what: &'static str,
        mut predicate: F,
    ) -> impl Future<Output = Result<FeedEvent>> + Send
    where
        F: FnMut(&FeedEvent) -> bool + Send,
    {
        let mut rx = self.tx.subscribe();

        async move {
            let deadline = tokio::time::Instant::now() + wait;
            loop {
                let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Ok(event)) => event,
                    Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                    Ok(Err(broadcast::error::RecvError::Closed)) => {
                        return Err(FeedError::EventStreamClosed(what));
                    }
                    Err(_) => return Err(FeedError::AckTimeout(what)),
                };

                if predicate(&event) {
                    return Ok(event);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
