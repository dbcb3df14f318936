//! Process metrics for the feed pipeline

use std::sync::OnceLock;

use prometheus::IntCounter;

/// Counters registered against the default prometheus registry
pub struct FeedMetrics {
    /// Frames received on the socket
    pub frames_received: IntCounter,
    /// Frames that failed classification and were dropped
    pub malformed_frames: IntCounter,
    /// Reconnect attempts (not sequences)
    pub reconnect_attempts: IntCounter,
    /// Individual book levels applied (snapshot or delta)
    pub book_updates: IntCounter,
    /// Buffered delta batches flushed into the book
    pub batches_flushed: IntCounter,
}

static METRICS: OnceLock<FeedMetrics> = OnceLock::new();

fn register(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter spec");
    // Double registration only happens in tests running several pipelines
    // in one process; the first registration wins.
    let _ = prometheus::default_registry().register(Box::new(counter.clone()));
    counter
}

/// Lazily-initialized global feed metrics
pub fn feed() -> &'static FeedMetrics {
    METRICS.get_or_init(|| FeedMetrics {
        frames_received: register("bookfeed_frames_received_total", "Frames received"),
        malformed_frames: register("bookfeed_malformed_frames_total", "Unclassifiable frames dropped"),
        reconnect_attempts: register("bookfeed_reconnect_attempts_total", "Reconnect attempts"),
        book_updates: register("bookfeed_book_updates_total", "Book levels applied"),
        batches_flushed: register("bookfeed_batches_flushed_total", "Delta batches flushed"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let before = feed().frames_received.get();
        feed().frames_received.inc();
        assert_eq!(feed().frames_received.get(), before + 1);
    }
}
