//! Feed pipeline orchestration
//!
//! Wires the connection manager, subscription manager, and order book
//! together under one supervisory task, and exposes the boundary the
//! external UI/state layer consumes: start/stop, option-change requests,
//! and a read-only status stream.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::events::{EventHub, FeedEvent};
use crate::metrics;
use crate::orderbook::{DeltaBuffer, DepthProfile, OrderBook, OrderBookState};
use crate::protocol::{BookPayload, Inbound, OptionsUpdate};
use crate::subscription::SubscriptionManager;
use crate::websocket::{ConnectionConfig, ConnectionManager, ConnectionState};

const EVENT_CAPACITY: usize = 256;

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Externally-observable pipeline state
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub connection: ConnectionState,
    pub chan_id: Option<u64>,
    pub book: OrderBookState,
    pub depth: DepthProfile,
    pub last_error: Option<String>,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            chan_id: None,
            book: OrderBookState::default(),
            depth: DepthProfile::default(),
            last_error: None,
        }
    }
}

struct Active {
    conn: ConnectionManager,
    subs: Arc<SubscriptionManager>,
    change_tx: watch::Sender<Option<OptionsUpdate>>,
    task: JoinHandle<()>,
}

/// One order book feed pipeline
pub struct Feed {
    config: Config,
    state: AtomicU8,
    active: Mutex<Option<Active>>,
    status_tx: watch::Sender<FeedStatus>,
    status_rx: watch::Receiver<FeedStatus>,
}

impl Feed {
    pub fn new(config: Config) -> Self {
        let (status_tx, status_rx) = watch::channel(FeedStatus::default());
        Self {
            config,
            state: AtomicU8::new(PipelineState::Idle as u8),
            active: Mutex::new(None),
            status_tx,
            status_rx,
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Read-only subscription to status changes
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status_rx.clone()
    }

    /// Open the connection and run the supervisory task.
    /// A no-op when already running.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.active.lock().await;
        if slot.is_some() {
            debug!("Start ignored, pipeline already running");
            return Ok(());
        }
        self.set_state(PipelineState::Starting);

        let hub = EventHub::new(EVENT_CAPACITY);
        // Register the supervisor's listener before opening so the first
        // open event is not missed.
        let events = hub.subscribe();

        let conn = ConnectionManager::new(
            self.config.ws_endpoint.clone(),
            hub,
            ConnectionConfig::from_config(&self.config),
        );
        let subs = Arc::new(SubscriptionManager::new(
            conn.clone(),
            self.config.default_options(),
            self.config.ack_timeout(),
        ));

        if let Err(e) = conn.open().await {
            self.set_state(PipelineState::Idle);
            self.status_tx.send_modify(|s| {
                s.connection = ConnectionState::Disconnected;
                s.last_error = Some(e.to_string());
            });
            return Err(e);
        }

        let (change_tx, change_rx) = watch::channel(None);
        let task = tokio::spawn(run_loop(LoopCtx {
            events,
            conn: conn.clone(),
            subs: Arc::clone(&subs),
            change_rx,
            status_tx: self.status_tx.clone(),
            flush_interval: self.config.flush_interval(),
            book: OrderBook::new(),
            buffer: DeltaBuffer::new(),
        }));

        *slot = Some(Active {
            conn,
            subs,
            change_tx,
            task,
        });
        self.set_state(PipelineState::Running);
        info!("Feed pipeline running");
        Ok(())
    }

    /// Full teardown: cancel background activity, close the connection,
    /// reset book state and options, publish an empty status. Safe to call
    /// from any state; a double stop is a no-op.
    pub async fn stop(&self) {
        let mut slot = self.active.lock().await;
        let Some(active) = slot.take() else {
            self.set_state(PipelineState::Idle);
            return;
        };
        self.set_state(PipelineState::Stopping);

        // Cancels the event loop, the flush tick, and any in-flight
        // option-change step; close() clears the auto-reconnect flag so a
        // mid-backoff reconnect loop stops scheduling attempts.
        active.task.abort();
        active.conn.close().await;
        active.subs.reset(self.config.default_options());

        self.status_tx.send_replace(FeedStatus::default());
        self.set_state(PipelineState::Idle);
        info!("Feed pipeline stopped");
    }

    /// Request a subscription parameter change. Latest-wins: a request made
    /// while another is pending replaces it instead of queuing. Ignored
    /// when the pipeline is not running.
    pub fn request_option_change(&self, update: OptionsUpdate) {
        match self.active.try_lock() {
            Ok(slot) => match slot.as_ref() {
                Some(active) => {
                    let _ = active.change_tx.send(Some(update));
                }
                None => debug!("Option change ignored, pipeline not running"),
            },
            Err(_) => debug!("Option change ignored during lifecycle transition"),
        }
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

struct LoopCtx {
    events: broadcast::Receiver<FeedEvent>,
    conn: ConnectionManager,
    subs: Arc<SubscriptionManager>,
    change_rx: watch::Receiver<Option<OptionsUpdate>>,
    status_tx: watch::Sender<FeedStatus>,
    flush_interval: Duration,
    book: OrderBook,
    buffer: DeltaBuffer,
}

async fn run_loop(mut ctx: LoopCtx) {
    let mut flush = tokio::time::interval(ctx.flush_interval);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = ctx.events.recv() => match event {
                Ok(event) => handle_event(&mut ctx, event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Supervisor lagging behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = flush.tick() => flush_deltas(&mut ctx),
            changed = ctx.change_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = ctx.change_rx.borrow_and_update().clone();
                if let Some(update) = update {
                    if let Err(e) = ctx.subs.apply_change(update).await {
                        publish_error(&ctx, e.to_string());
                    }
                }
            }
        }
    }
}

async fn handle_event(ctx: &mut LoopCtx, event: FeedEvent) {
    match event {
        FeedEvent::Open => {
            publish(ctx);
            // Every fresh open resubscribes with current options; this is
            // how reconnection restores the live feed. A failed attempt is
            // left for the next reconnect cycle.
            if let Err(e) = ctx.subs.subscribe().await {
                warn!(error = %e, "Post-open subscribe failed, awaiting next reconnect");
                publish_error(ctx, e.to_string());
            }
        }
        FeedEvent::Close => publish(ctx),
        FeedEvent::Error(msg) => publish_error(ctx, msg),
        FeedEvent::Subscribed(_) => publish(ctx),
        FeedEvent::Unsubscribed(_) => {
            // Resync boundary: stale buffered deltas must never touch the
            // book that the next snapshot seeds.
            ctx.book.clear();
            ctx.buffer.clear();
            publish(ctx);
        }
        FeedEvent::Message(Inbound::Book(msg)) => match msg.payload {
            BookPayload::Snapshot(entries) => {
                ctx.book.apply_snapshot(&entries);
                publish(ctx);
            }
            BookPayload::Delta(entry) => ctx.buffer.push(entry),
        },
        // Acks are consumed by the subscription manager's waiters;
        // heartbeats and info frames carry no state.
        FeedEvent::Message(_) => {}
    }
}

fn flush_deltas(ctx: &mut LoopCtx) {
    if ctx.buffer.is_empty() {
        return;
    }
    let batch = ctx.buffer.drain();
    ctx.book.apply_deltas(&batch);
    metrics::feed().batches_flushed.inc();
    publish(ctx);
}

fn publish(ctx: &LoopCtx) {
    let book = ctx.book.state();
    let depth = DepthProfile::from_state(&book);
    let connection = ctx.conn.state();
    let chan_id = ctx.subs.chan_id();
    ctx.status_tx.send_modify(|status| {
        status.connection = connection;
        status.chan_id = chan_id;
        status.book = book;
        status.depth = depth;
    });
}

fn publish_error(ctx: &LoopCtx, message: String) {
    ctx.status_tx.send_modify(|status| {
        status.connection = ctx.conn.state();
        status.last_error = Some(message);
    });
}
