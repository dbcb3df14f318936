//! Channel subscription management
//!
//! Turns raw message events into an acknowledged `book` channel
//! subscription and resynchronizes on option change without losing
//! consistency. Holds a [`ConnectionManager`] by composition; the waiting
//! primitive is the hub's `wait_for`.

use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{FeedError, Result};
use crate::events::FeedEvent;
use crate::protocol::{self, Inbound, OptionsUpdate, SubscriptionOptions};
use crate::websocket::ConnectionManager;

pub struct SubscriptionManager {
    conn: ConnectionManager,
    options: RwLock<SubscriptionOptions>,
    chan_id: RwLock<Option<u64>>,
    /// Serializes the option-change protocol; supersession of pending
    /// requests is handled upstream by the orchestrator's latest-wins slot.
    change_gate: Mutex<()>,
    ack_timeout: Duration,
}

impl SubscriptionManager {
    pub fn new(
        conn: ConnectionManager,
        options: SubscriptionOptions,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            options: RwLock::new(options),
            chan_id: RwLock::new(None),
            change_gate: Mutex::new(()),
            ack_timeout,
        }
    }

    pub fn options(&self) -> SubscriptionOptions {
        self.options.read().unwrap().clone()
    }

    pub fn chan_id(&self) -> Option<u64> {
        *self.chan_id.read().unwrap()
    }

    /// Subscribe with the current options and wait for the acknowledgment.
    ///
    /// The waiter is installed before the request is sent, so the ack cannot
    /// slip past it. On success the channel id is recorded and a
    /// `Subscribed` event published; on timeout the failure propagates.
    pub async fn subscribe(&self) -> Result<u64> {
        let frame = protocol::subscribe_frame(&self.options())?;

        let ack = self.conn.hub().wait_for(self.ack_timeout, "subscribe ack", |e| {
            matches!(e, FeedEvent::Message(Inbound::Subscribed { .. }))
        });
        self.conn.send(&frame).await?;

        let event = ack.await.map_err(|e| {
            warn!(error = %e, "Subscribe not acknowledged");
            e
        })?;
        let FeedEvent::Message(Inbound::Subscribed { chan_id }) = event else {
            return Err(FeedError::AckTimeout("subscribe ack"));
        };

        *self.chan_id.write().unwrap() = Some(chan_id);
        self.conn.hub().emit(FeedEvent::Subscribed(chan_id));
        info!(chan_id, "Subscribed to book channel");
        Ok(chan_id)
    }

    /// Unsubscribe from the active channel and wait for the acknowledgment.
    /// A no-op when nothing is subscribed.
    pub async fn unsubscribe(&self) -> Result<()> {
        let Some(chan_id) = self.chan_id() else {
            return Ok(());
        };

        let frame = protocol::unsubscribe_frame(chan_id)?;

        let ack = self.conn.hub().wait_for(self.ack_timeout, "unsubscribe ack", |e| {
            matches!(e, FeedEvent::Message(Inbound::Unsubscribed { .. }))
        });
        self.conn.send(&frame).await?;

        ack.await.map_err(|e| {
            warn!(chan_id, error = %e, "Unsubscribe not acknowledged");
            e
        })?;

        *self.chan_id.write().unwrap() = None;
        self.conn.hub().emit(FeedEvent::Unsubscribed(chan_id));
        info!(chan_id, "Unsubscribed from book channel");
        Ok(())
    }

    /// Option-change protocol: optimistically apply the merged options, then
    /// unsubscribe and resubscribe. Any failure rolls the options back to
    /// the prior snapshot; the channel id is left as the failing step left
    /// it (`None` when the unsubscribe succeeded first).
    pub async fn apply_change(&self, update: OptionsUpdate) -> Result<()> {
        let _gate = self.change_gate.lock().await;

        let previous = self.options();
        let merged = previous.merge(&update);
        *self.options.write().unwrap() = merged;

        let outcome = self.resync().await;
        if let Err(e) = &outcome {
            warn!(error = %e, "Option change failed, rolling back options");
            *self.options.write().unwrap() = previous;
        }
        outcome
    }

    async fn resync(&self) -> Result<()> {
        self.unsubscribe().await?;
        self.subscribe().await?;
        Ok(())
    }

    /// Forget the channel and restore default options (pipeline teardown)
    pub fn reset(&self, options: SubscriptionOptions) {
        *self.chan_id.write().unwrap() = None;
        *self.options.write().unwrap() = options;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHub;
    use crate::websocket::ConnectionConfig;

    fn test_subs() -> SubscriptionManager {
        let hub = EventHub::new(64);
        let conn = ConnectionManager::new(
            "ws://127.0.0.1:9/ws".to_string(),
            hub,
            ConnectionConfig {
                base_reconnect_delay: Duration::from_millis(1),
                max_reconnect_attempts: 1,
                open_timeout: Duration::from_millis(50),
                close_timeout: Duration::from_millis(50),
            },
        );
        SubscriptionManager::new(conn, SubscriptionOptions::default(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_unsubscribe_without_channel_is_noop() {
        let subs = test_subs();
        assert!(subs.unsubscribe().await.is_ok());
        assert_eq!(subs.chan_id(), None);
    }

    #[tokio::test]
    async fn test_failed_change_rolls_back_options() {
        let subs = test_subs();
        let previous = subs.options();

        // No server: the subscribe step inside the change fails.
        let result = subs
            .apply_change(OptionsUpdate {
                prec: Some(crate::protocol::Precision::P1),
                ..Default::default()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(subs.options(), previous);
        assert_eq!(subs.chan_id(), None);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let subs = test_subs();
        *subs.chan_id.write().unwrap() = Some(99);
        *subs.options.write().unwrap() = SubscriptionOptions {
            prec: crate::protocol::Precision::P3,
            ..SubscriptionOptions::default()
        };

        subs.reset(SubscriptionOptions::default());
        assert_eq!(subs.chan_id(), None);
        assert_eq!(subs.options(), SubscriptionOptions::default());
    }
}
