//! WebSocket connection manager
//!
//! Owns exactly one logical connection: open/close transitions, the read
//! pump, and reconnection with increasing backoff. Callers never observe a
//! half-initialized socket; a send on a dead connection either rides a
//! successful reconnect or fails with an explicit error event.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::client::{self, Frame, WsReader, WsWriter};
use crate::error::{FeedError, Result};
use crate::events::{EventHub, FeedEvent};
use crate::metrics;
use crate::protocol::Inbound;

/// Connection lifecycle state, owned exclusively by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
    Reconnecting = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            4 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// Reconnect/close tuning
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Delay before attempt N is `base_reconnect_delay * N`
    pub base_reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// Bound on a single open (connect + handshake) attempt
    pub open_timeout: Duration,
    /// Bound on waiting for the close event during teardown
    pub close_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_reconnect_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
            open_timeout: Duration::from_millis(3000),
            close_timeout: Duration::from_millis(3000),
        }
    }
}

impl ConnectionConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            base_reconnect_delay: Duration::from_millis(config.base_reconnect_delay_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
            open_timeout: Duration::from_millis(config.open_timeout_ms),
            close_timeout: Duration::from_millis(config.ack_timeout_ms),
        }
    }
}

struct ConnInner {
    url: String,
    hub: EventHub,
    config: ConnectionConfig,
    writer: Mutex<Option<WsWriter>>,
    state: AtomicU8,
    /// Cleared by `close()`; the reconnect loop and the unexpected-close
    /// path check it before scheduling further attempts.
    auto_reconnect: AtomicBool,
    /// Single-flight gate: a concurrent reconnect trigger joins the
    /// in-flight sequence instead of starting a duplicate.
    reconnect_gate: Mutex<()>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnInner {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Manages one streaming socket with automatic recovery
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnInner>,
}

impl ConnectionManager {
    pub fn new(url: String, hub: EventHub, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                url,
                hub,
                config,
                writer: Mutex::new(None),
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                auto_reconnect: AtomicBool::new(true),
                reconnect_gate: Mutex::new(()),
                reader_task: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.inner.hub
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// True iff the state machine says open and the socket handle is live
    pub async fn is_connected(&self) -> bool {
        self.inner.state() == ConnectionState::Open
            && self.inner.writer.lock().await.is_some()
    }

    /// Establish the connection, emit `Open`, and start the read pump
    ///
    /// Returns a boxed future to break the `open -> read_pump ->
    /// on_connection_lost -> reconnect -> open` auto-trait cycle the
    /// compiler cannot resolve for opaque futures.
    pub fn open(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.open_impl())
    }

    async fn open_impl(&self) -> Result<()> {
        self.inner.set_state(ConnectionState::Connecting);

        let (writer, reader) =
            match timeout(self.inner.config.open_timeout, client::connect(&self.inner.url)).await {
                Ok(Ok(parts)) => parts,
                Ok(Err(e)) => {
                    self.inner.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
                Err(_) => {
                    self.inner.set_state(ConnectionState::Disconnected);
                    return Err(FeedError::AckTimeout("websocket open"));
                }
            };

        *self.inner.writer.lock().await = Some(writer);

        let pump = tokio::spawn(read_pump(Arc::clone(&self.inner), reader));
        if let Some(previous) = self.inner.reader_task.lock().unwrap().replace(pump) {
            previous.abort();
        }

        self.inner.set_state(ConnectionState::Open);
        self.inner.hub.emit(FeedEvent::Open);
        info!(url = %self.inner.url, "WebSocket open");
        Ok(())
    }

    /// Send a text frame; a dead connection triggers a reconnect first.
    ///
    /// Never drops silently: if the reconnect fails or the socket handle is
    /// gone, an error event is emitted and the failure returned.
    pub async fn send(&self, text: &str) -> Result<()> {
        if !self.is_connected().await {
            self.reconnect().await?;
        }

        let mut guard = self.inner.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.send_text(text).await,
            None => {
                self.inner
                    .hub
                    .emit(FeedEvent::Error("connection is dead".to_string()));
                Err(FeedError::NotConnected)
            }
        }
    }

    /// Reconnect with increasing backoff: attempt N waits `base * N`, then
    /// opens with a bounded handshake. Resolves failure after
    /// `max_reconnect_attempts`. Idempotent under concurrent triggers.
    pub async fn reconnect(&self) -> Result<()> {
        let _gate = self.inner.reconnect_gate.lock().await;

        // A concurrent trigger that waited on the gate joins the result of
        // the sequence that just ran.
        if self.is_connected().await {
            return Ok(());
        }

        self.inner.set_state(ConnectionState::Reconnecting);

        for attempt in 1..=self.inner.config.max_reconnect_attempts {
            sleep(self.inner.config.base_reconnect_delay * attempt).await;

            if !self.inner.auto_reconnect.load(Ordering::SeqCst) {
                debug!("Reconnect cancelled by teardown");
                self.inner.set_state(ConnectionState::Disconnected);
                return Err(FeedError::NotConnected);
            }

            metrics::feed().reconnect_attempts.inc();
            match self.open().await {
                Ok(()) => {
                    info!(attempt, "Reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }

        self.inner.set_state(ConnectionState::Disconnected);
        self.inner
            .hub
            .emit(FeedEvent::Error("connection is dead".to_string()));
        Err(FeedError::ReconnectExhausted)
    }

    /// Orderly teardown: disables auto-reconnect, closes the socket, waits
    /// (bounded) for the close notification, and releases the handle.
    /// Safe to call when already closed.
    pub async fn close(&self) {
        self.inner.auto_reconnect.store(false, Ordering::SeqCst);

        let had_writer = self.inner.writer.lock().await.is_some();
        if !had_writer && self.inner.state() == ConnectionState::Disconnected {
            return;
        }

        self.inner.set_state(ConnectionState::Closing);

        if had_writer {
            let closed = self.inner.hub.wait_for(
                self.inner.config.close_timeout,
                "close event",
                |e| matches!(e, FeedEvent::Close),
            );

            if let Some(writer) = self.inner.writer.lock().await.as_mut() {
                writer.close().await;
            }

            if closed.await.is_err() {
                debug!("No close event within timeout, releasing socket anyway");
            }
        }

        if let Some(pump) = self.inner.reader_task.lock().unwrap().take() {
            pump.abort();
        }
        self.inner.writer.lock().await.take();
        self.inner.set_state(ConnectionState::Disconnected);
        info!("WebSocket closed");
    }
}

/// Forwards inbound frames to the hub until the connection breaks, then
/// runs the unexpected-close policy.
async fn read_pump(inner: Arc<ConnInner>, mut reader: WsReader) {
    loop {
        match reader.next().await {
            Ok(Some(Frame::Text(text))) => {
                metrics::feed().frames_received.inc();
                match Inbound::parse(&text) {
                    Some(message) => inner.hub.emit(FeedEvent::Message(message)),
                    None => {
                        metrics::feed().malformed_frames.inc();
                        debug!(len = text.len(), "Dropped unclassifiable frame");
                    }
                }
            }
            Ok(Some(Frame::Ping(data))) => {
                if let Some(writer) = inner.writer.lock().await.as_mut() {
                    let _ = writer.pong(data).await;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                on_connection_lost(inner, e).await;
                return;
            }
        }
    }
}

/// Unexpected-close policy: reconnect if allowed; success suppresses the
/// close notification so callers only see continuity, failure surfaces an
/// error before the close.
///
/// The reconnect runs on a detached task: the pump observing the loss is
/// ending, and the replacement pump spawned by a successful `open()` must
/// not be awaited from inside it.
async fn on_connection_lost(inner: Arc<ConnInner>, cause: FeedError) {
    inner.writer.lock().await.take();
    inner.set_state(ConnectionState::Disconnected);

    if inner.auto_reconnect.load(Ordering::SeqCst) {
        warn!(error = %cause, "Connection lost unexpectedly, reconnecting");
        let manager = ConnectionManager { inner };
        tokio::spawn(async move {
            if manager.reconnect().await.is_err() {
                manager.inner.hub.emit(FeedEvent::Close);
            }
        });
    } else {
        debug!(error = %cause, "Connection closed");
        inner.hub.emit(FeedEvent::Close);
    }
}
