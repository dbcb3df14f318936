//! Error types for the feed pipeline

use thiserror::Error;

/// Feed pipeline errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("websocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("websocket message error: {0}")]
    WebSocketMessage(String),

    #[error("timed out waiting for {0}")]
    AckTimeout(&'static str),

    #[error("event stream closed while waiting for {0}")]
    EventStreamClosed(&'static str),

    #[error("connection is dead")]
    NotConnected,

    #[error("max reconnection attempts exceeded")]
    ReconnectExhausted,

    #[error("failed to serialize frame: {0}")]
    Serialization(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
