//! Configuration module for the feed pipeline

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::protocol::{BookLength, Frequency, Precision, SubscriptionOptions};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket endpoint for the public Bitfinex API
    pub ws_endpoint: String,

    /// Default trading pair (e.g. "tBTCUSD")
    pub symbol: String,

    /// Default price aggregation level
    pub precision: Precision,

    /// Default update frequency
    pub frequency: Frequency,

    /// Default number of price levels per side
    pub length: BookLength,

    /// Timeout for subscribe/unsubscribe acknowledgments in milliseconds
    pub ack_timeout_ms: u64,

    /// Reconnection settings
    pub base_reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub open_timeout_ms: u64,

    /// Delta batching interval in milliseconds
    pub flush_interval_ms: u64,

    /// Port for the health/metrics HTTP server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| "wss://api-pub.bitfinex.com/ws/2".to_string()),
            symbol: env::var("SYMBOL").unwrap_or_else(|_| "tBTCUSD".to_string()),
            precision: env::var("PRECISION")
                .ok()
                .and_then(|s| Precision::parse(&s))
                .unwrap_or(Precision::P0),
            frequency: env::var("FREQUENCY")
                .ok()
                .and_then(|s| Frequency::parse(&s))
                .unwrap_or(Frequency::F0),
            length: env::var("BOOK_LENGTH")
                .ok()
                .and_then(|s| BookLength::parse(&s))
                .unwrap_or(BookLength::L25),
            ack_timeout_ms: env::var("ACK_TIMEOUT_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            base_reconnect_delay_ms: env::var("BASE_RECONNECT_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            max_reconnect_attempts: env::var("MAX_RECONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            open_timeout_ms: env::var("OPEN_TIMEOUT_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            flush_interval_ms: env::var("FLUSH_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .unwrap_or(9090),
        })
    }

    /// Subscription options used at start and restored on teardown
    pub fn default_options(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            symbol: self.symbol.clone(),
            prec: self.precision,
            freq: self.frequency,
            len: self.length,
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://api-pub.bitfinex.com/ws/2".to_string(),
            symbol: "tBTCUSD".to_string(),
            precision: Precision::P0,
            frequency: Frequency::F0,
            length: BookLength::L25,
            ack_timeout_ms: 3000,
            base_reconnect_delay_ms: 1000,
            max_reconnect_attempts: 5,
            open_timeout_ms: 3000,
            flush_interval_ms: 500,
            health_port: 9090,
        }
    }
}
