//! WebSocket module: connection ownership and recovery

mod client;
mod manager;

pub use manager::{ConnectionConfig, ConnectionManager, ConnectionState};
