//! Cumulative depth read model
//!
//! For each side, a running sum of level sizes from the best price outward.
//! The maximum cumulative total across both sides lets a presentation layer
//! scale depth bars to a 0..=100 range.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderBookState;

/// A price level annotated with its cumulative size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub count: u32,
    /// Unsigned level size
    pub amount: Decimal,
    /// Cumulative size from the best price through this level
    pub total: Decimal,
}

/// Depth view of a full book state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthProfile {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    /// Largest cumulative total on either side
    pub max_total: Decimal,
}

impl DepthProfile {
    /// Build the depth view from a sorted book state
    pub fn from_state(state: &OrderBookState) -> Self {
        let bids = accumulate(&state.bids);
        let asks = accumulate(&state.asks);

        let side_max = |levels: &[DepthLevel]| {
            levels.last().map(|l| l.total).unwrap_or(Decimal::ZERO)
        };
        let max_total = side_max(&bids).max(side_max(&asks));

        Self {
            bids,
            asks,
            max_total,
        }
    }

    /// Scale a cumulative total into 0..=100 against the book-wide maximum
    pub fn bar_percent(&self, total: Decimal) -> Decimal {
        if self.max_total.is_zero() {
            return Decimal::ZERO;
        }
        (total / self.max_total * Decimal::from(100)).min(Decimal::from(100))
    }
}

fn accumulate(levels: &[super::BookLevel]) -> Vec<DepthLevel> {
    let mut total = Decimal::ZERO;
    levels
        .iter()
        .map(|level| {
            let amount = level.amount.abs();
            total += amount;
            DepthLevel {
                price: level.price,
                count: level.count,
                amount,
                total,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::BookLevel;
    use rust_decimal_macros::dec;

    fn state() -> OrderBookState {
        OrderBookState {
            bids: vec![
                BookLevel {
                    price: dec!(101),
                    count: 1,
                    amount: dec!(0.5),
                },
                BookLevel {
                    price: dec!(100),
                    count: 2,
                    amount: dec!(1.5),
                },
            ],
            asks: vec![
                BookLevel {
                    price: dec!(102),
                    count: 1,
                    amount: dec!(-1.0),
                },
                BookLevel {
                    price: dec!(103),
                    count: 3,
                    amount: dec!(-2.5),
                },
            ],
        }
    }

    #[test]
    fn test_totals_accumulate_outward() {
        let depth = DepthProfile::from_state(&state());

        assert_eq!(depth.bids[0].total, dec!(0.5));
        assert_eq!(depth.bids[1].total, dec!(2.0));
        assert_eq!(depth.asks[0].total, dec!(1.0));
        assert_eq!(depth.asks[1].total, dec!(3.5));
    }

    #[test]
    fn test_totals_monotonically_non_decreasing() {
        let depth = DepthProfile::from_state(&state());
        for side in [&depth.bids, &depth.asks] {
            assert!(side.windows(2).all(|w| w[1].total >= w[0].total));
        }
    }

    #[test]
    fn test_max_total_spans_both_sides() {
        let depth = DepthProfile::from_state(&state());
        assert_eq!(depth.max_total, dec!(3.5));
    }

    #[test]
    fn test_amounts_exported_unsigned() {
        let depth = DepthProfile::from_state(&state());
        assert!(depth.asks.iter().all(|l| l.amount > Decimal::ZERO));
    }

    #[test]
    fn test_bar_percent_scaling() {
        let depth = DepthProfile::from_state(&state());
        assert_eq!(depth.bar_percent(dec!(3.5)), dec!(100));
        assert_eq!(depth.bar_percent(dec!(1.75)), dec!(50));
    }

    #[test]
    fn test_bar_percent_empty_book() {
        let depth = DepthProfile::from_state(&OrderBookState::default());
        assert_eq!(depth.bar_percent(dec!(1)), Decimal::ZERO);
    }
}
