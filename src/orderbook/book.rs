//! Core order book implementation
//!
//! Uses BTreeMap for sorted price level management. The side of an entry is
//! chosen by the sign of its amount; a zero count is a tombstone for the
//! level at that price.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{BookLevel, OrderBookState, Side};
use crate::metrics;
use crate::protocol::BookEntry;

#[derive(Debug, Clone, Copy)]
struct LevelData {
    count: u32,
    amount: Decimal,
}

/// Price-keyed book for a single subscription
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, LevelData>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, LevelData>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Apply a snapshot message.
    ///
    /// An empty book is seeded wholesale: entries are partitioned by the
    /// sign of their amount. A snapshot arriving while the book is populated
    /// is a resync and is merged as a delta batch instead, which tolerates
    /// partial snapshots.
    pub fn apply_snapshot(&mut self, entries: &[BookEntry]) {
        if !self.is_empty() {
            self.apply_deltas(entries);
            return;
        }

        for entry in entries {
            if entry.count == 0 {
                continue;
            }
            let data = LevelData {
                count: entry.count,
                amount: entry.amount,
            };
            if entry.amount > Decimal::ZERO {
                self.bids.insert(Reverse(entry.price), data);
            } else if entry.amount < Decimal::ZERO {
                self.asks.insert(entry.price, data);
            }
        }
        metrics::feed().book_updates.inc_by(entries.len() as u64);
    }

    /// Apply one delta: upsert for a positive count, remove for zero.
    /// Removing an absent price is a no-op.
    pub fn apply_delta(&mut self, entry: &BookEntry) {
        let side = if entry.amount > Decimal::ZERO {
            Side::Bid
        } else {
            Side::Ask
        };

        match side {
            Side::Bid => {
                if entry.count == 0 {
                    self.bids.remove(&Reverse(entry.price));
                } else {
                    self.bids.insert(
                        Reverse(entry.price),
                        LevelData {
                            count: entry.count,
                            amount: entry.amount,
                        },
                    );
                }
            }
            Side::Ask => {
                if entry.count == 0 {
                    self.asks.remove(&entry.price);
                } else {
                    self.asks.insert(
                        entry.price,
                        LevelData {
                            count: entry.count,
                            amount: entry.amount,
                        },
                    );
                }
            }
        }
        metrics::feed().book_updates.inc();
    }

    /// Apply a batch of deltas in arrival order
    pub fn apply_deltas(&mut self, entries: &[BookEntry]) {
        for entry in entries {
            self.apply_delta(entry);
        }
    }

    /// Drop all levels (resync or teardown)
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Export the current state, sorted for display
    pub fn state(&self) -> OrderBookState {
        OrderBookState {
            bids: self
                .bids
                .iter()
                .map(|(Reverse(price), data)| BookLevel {
                    price: *price,
                    count: data.count,
                    amount: data.amount,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(price, data)| BookLevel {
                    price: *price,
                    count: data.count,
                    amount: data.amount,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(price: Decimal, count: u32, amount: Decimal) -> BookEntry {
        BookEntry {
            price,
            count,
            amount,
        }
    }

    fn seeded_book() -> OrderBook {
        let mut book = OrderBook::new();
        book.apply_snapshot(&[
            entry(dec!(100), 1, dec!(0.5)),
            entry(dec!(101), 2, dec!(1.2)),
            entry(dec!(99), 2, dec!(-0.3)),
            entry(dec!(98), 1, dec!(-0.8)),
        ]);
        book
    }

    #[test]
    fn test_snapshot_partitions_by_amount_sign() {
        let book = seeded_book();
        let state = book.state();

        assert_eq!(state.bids.len(), 2);
        assert_eq!(state.asks.len(), 2);
        assert_eq!(state.bids[0].price, dec!(101));
        assert_eq!(state.asks[0].price, dec!(98));
    }

    #[test]
    fn test_resync_snapshot_merges_as_deltas() {
        let mut book = seeded_book();

        // Same message shape as a snapshot, arriving on a populated book:
        // updates one bid, tombstones one ask, adds a new ask.
        book.apply_snapshot(&[
            entry(dec!(100), 3, dec!(0.9)),
            entry(dec!(98), 0, dec!(-1)),
            entry(dec!(97), 1, dec!(-0.4)),
        ]);

        let state = book.state();
        // The untouched levels survived; a wholesale replace would have
        // dropped them.
        assert_eq!(state.bids.len(), 2);
        let updated = state.bids.iter().find(|l| l.price == dec!(100)).unwrap();
        assert_eq!(updated.count, 3);
        assert_eq!(updated.amount, dec!(0.9));

        assert!(state.asks.iter().all(|l| l.price != dec!(98)));
        assert!(state.asks.iter().any(|l| l.price == dec!(97)));
    }

    #[test]
    fn test_delta_insert_new_level() {
        let mut book = seeded_book();
        book.apply_delta(&entry(dec!(102), 1, dec!(0.1)));

        let state = book.state();
        assert_eq!(state.bids[0].price, dec!(102));
        assert_eq!(state.bids.len(), 3);
    }

    #[test]
    fn test_delta_replaces_existing_level() {
        let mut book = seeded_book();
        book.apply_delta(&entry(dec!(100), 5, dec!(2.0)));
        book.apply_delta(&entry(dec!(100), 7, dec!(0.25)));

        let state = book.state();
        let level = state.bids.iter().find(|l| l.price == dec!(100)).unwrap();
        assert_eq!(level.count, 7);
        assert_eq!(level.amount, dec!(0.25));
        // Still exactly one level at that price
        assert_eq!(
            state.bids.iter().filter(|l| l.price == dec!(100)).count(),
            1
        );
    }

    #[test]
    fn test_zero_count_removes_level() {
        let mut book = seeded_book();
        // Bitfinex signals the side of a tombstone with amount 1/-1
        book.apply_delta(&entry(dec!(100), 0, dec!(1)));

        let state = book.state();
        assert!(state.bids.iter().all(|l| l.price != dec!(100)));
    }

    #[test]
    fn test_delete_absent_price_is_noop() {
        let mut book = seeded_book();
        let before = book.state();

        book.apply_delta(&entry(dec!(55), 0, dec!(1)));
        book.apply_delta(&entry(dec!(555), 0, dec!(-1)));

        assert_eq!(book.state(), before);
    }

    #[test]
    fn test_sort_invariant() {
        let mut book = seeded_book();
        book.apply_deltas(&[
            entry(dec!(100.5), 1, dec!(0.2)),
            entry(dec!(97.5), 1, dec!(-0.2)),
        ]);

        let state = book.state();
        assert!(state.bids.windows(2).all(|w| w[0].price > w[1].price));
        assert!(state.asks.windows(2).all(|w| w[0].price < w[1].price));
    }

    #[test]
    fn test_no_zero_count_level_ever_stored() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&[entry(dec!(100), 0, dec!(0.5)), entry(dec!(99), 1, dec!(0.5))]);

        let state = book.state();
        assert_eq!(state.bids.len(), 1);
        assert!(state.bids.iter().all(|l| l.count > 0));
    }

    #[test]
    fn test_clear() {
        let mut book = seeded_book();
        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.state(), OrderBookState::default());
    }
}
