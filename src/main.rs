//! bookfeed - Live order book feed demo binary
//!
//! Runs the feed pipeline against the public Bitfinex API, logs
//! top-of-book changes, and serves health/metrics endpoints.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookfeed::{Config, Feed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting bookfeed");

    let config = Config::load()?;
    info!(
        endpoint = %config.ws_endpoint,
        symbol = %config.symbol,
        "Configuration loaded"
    );

    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    let feed = Arc::new(Feed::new(config));
    feed.start().await?;

    let mut status = feed.status();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                if let (Some(bid), Some(ask)) =
                    (snapshot.book.bids.first(), snapshot.book.asks.first())
                {
                    info!(
                        bid = %bid.price,
                        ask = %ask.price,
                        bid_levels = snapshot.book.bids.len(),
                        ask_levels = snapshot.book.asks.len(),
                        max_depth = %snapshot.depth.max_total,
                        "Book update"
                    );
                }
                if let Some(error) = snapshot.last_error {
                    warn!(error = %error, "Feed error");
                }
            }
        }
    }

    info!("Shutting down");
    feed.stop().await;
    Ok(())
}

/// HTTP server for health checks and metrics
async fn start_health_server(port: u16) -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "bookfeed",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
