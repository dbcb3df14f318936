//! bookfeed - Live order book feed pipeline
//!
//! Maintains a locally-consistent view of a Bitfinex order book by
//! consuming the incremental `book` channel over a persistent WebSocket
//! connection, surviving disconnects and resynchronizing on subscription
//! parameter changes.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod orderbook;
pub mod pipeline;
pub mod protocol;
pub mod subscription;
pub mod websocket;

pub use config::Config;
pub use error::{FeedError, Result};
pub use events::{EventHub, FeedEvent};
pub use orderbook::{BookLevel, DeltaBuffer, DepthLevel, DepthProfile, OrderBook, OrderBookState};
pub use pipeline::{Feed, FeedStatus, PipelineState};
pub use protocol::{
    BookEntry, BookLength, BookMessage, BookPayload, Frequency, Inbound, OptionsUpdate,
    Precision, SubscriptionOptions,
};
pub use subscription::SubscriptionManager;
pub use websocket::{ConnectionConfig, ConnectionManager, ConnectionState};
