//! Order book module
//!
//! Deterministic merge of snapshot and delta messages into a price-keyed,
//! sorted book, plus the cumulative-depth read model for presentation.

mod book;
mod buffer;
mod depth;

pub use book::OrderBook;
pub use buffer::DeltaBuffer;
pub use depth::{DepthLevel, DepthProfile};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single price level as published to observers
///
/// `amount` keeps the sign it arrived with: positive for bids, negative
/// for asks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

/// Published book state: bids sorted descending, asks ascending by price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookState {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookState {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
