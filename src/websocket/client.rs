//! Low-level WebSocket plumbing
//!
//! Connects, splits the stream, and normalizes tungstenite frames into
//! text-or-control events for the connection manager's read pump.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::error::{FeedError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A frame the read pump cares about
#[derive(Debug)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
}

/// Write half of the socket
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Read half of the socket
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

/// Connect to the endpoint and split the socket into halves
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    debug!(url = %url, "Connecting WebSocket");

    let (ws_stream, response) = connect_async(url)
        .await
        .map_err(|e| FeedError::WebSocketConnection(format!("failed to connect: {}", e)))?;

    debug!(status = ?response.status(), "WebSocket connected");

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

impl WsWriter {
    /// Send a text frame
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| FeedError::WebSocketMessage(e.to_string()))
    }

    /// Answer a ping
    pub async fn pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(Message::Pong(data))
            .await
            .map_err(|e| FeedError::WebSocketMessage(e.to_string()))
    }

    /// Send a close frame and flush
    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

impl WsReader {
    /// Receive the next frame
    ///
    /// `Ok(None)` means a non-data frame was consumed and the caller should
    /// poll again; `Err` means the connection is gone.
    pub async fn next(&mut self) -> Result<Option<Frame>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(Frame::Text(text))),
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(Frame::Text(text)))
            }
            Some(Ok(Message::Ping(data))) => Ok(Some(Frame::Ping(data))),
            Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "Received close frame");
                Err(FeedError::WebSocketConnection("connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket error");
                Err(FeedError::WebSocketMessage(e.to_string()))
            }
            None => Err(FeedError::WebSocketConnection("stream ended".to_string())),
        }
    }
}
