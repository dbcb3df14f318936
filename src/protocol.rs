//! Wire protocol for the Bitfinex `book` channel
//!
//! Serializes subscribe/unsubscribe requests and classifies inbound frames
//! as acknowledgments, heartbeats, snapshots, or single deltas.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Price aggregation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    P0,
    P1,
    P2,
    P3,
    P4,
}

impl Precision {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "P0" => Some(Self::P0),
            "P1" => Some(Self::P1),
            "P2" => Some(Self::P2),
            "P3" => Some(Self::P3),
            "P4" => Some(Self::P4),
            _ => None,
        }
    }
}

/// Update frequency: F0 = realtime, F1 = throttled to 2s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    F0,
    F1,
}

impl Frequency {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "F0" => Some(Self::F0),
            "F1" => Some(Self::F1),
            _ => None,
        }
    }
}

/// Number of price levels per side; the server expects the string form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookLength {
    #[serde(rename = "1")]
    L1,
    #[serde(rename = "25")]
    L25,
    #[serde(rename = "100")]
    L100,
    #[serde(rename = "250")]
    L250,
}

impl BookLength {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1" => Some(Self::L1),
            "25" => Some(Self::L25),
            "100" => Some(Self::L100),
            "250" => Some(Self::L250),
            _ => None,
        }
    }
}

/// Immutable snapshot of the parameters a subscription was issued with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    pub symbol: String,
    pub prec: Precision,
    pub freq: Frequency,
    pub len: BookLength,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            symbol: "tBTCUSD".to_string(),
            prec: Precision::P0,
            freq: Frequency::F0,
            len: BookLength::L25,
        }
    }
}

impl SubscriptionOptions {
    /// Apply a partial update, leaving unspecified fields untouched
    pub fn merge(&self, update: &OptionsUpdate) -> Self {
        Self {
            symbol: update.symbol.clone().unwrap_or_else(|| self.symbol.clone()),
            prec: update.prec.unwrap_or(self.prec),
            freq: update.freq.unwrap_or(self.freq),
            len: update.len.unwrap_or(self.len),
        }
    }
}

/// Partial options carried by a change request; latest request wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsUpdate {
    pub symbol: Option<String>,
    pub prec: Option<Precision>,
    pub freq: Option<Frequency>,
    pub len: Option<BookLength>,
}

#[derive(Serialize)]
struct SubscribeFrame<'a> {
    event: &'static str,
    channel: &'static str,
    #[serde(flatten)]
    options: &'a SubscriptionOptions,
}

#[derive(Serialize)]
struct UnsubscribeFrame {
    event: &'static str,
    #[serde(rename = "chanId")]
    chan_id: u64,
}

/// Serialize a `book` channel subscribe request
pub fn subscribe_frame(options: &SubscriptionOptions) -> Result<String> {
    Ok(serde_json::to_string(&SubscribeFrame {
        event: "subscribe",
        channel: "book",
        options,
    })?)
}

/// Serialize an unsubscribe request for an active channel
pub fn unsubscribe_frame(chan_id: u64) -> Result<String> {
    Ok(serde_json::to_string(&UnsubscribeFrame {
        event: "unsubscribe",
        chan_id,
    })?)
}

/// A single price level change: `[price, count, amount]`
///
/// `amount > 0` is a bid, `amount < 0` an ask (magnitude is the size);
/// `count == 0` removes the level at `price`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BookEntry {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

/// Payload of a `[chanId, ...]` data frame
#[derive(Debug, Clone, PartialEq)]
pub enum BookPayload {
    /// List of levels seeding (or resyncing) the book
    Snapshot(Vec<BookEntry>),
    /// One incremental level change
    Delta(BookEntry),
}

/// An order book data frame
#[derive(Debug, Clone, PartialEq)]
pub struct BookMessage {
    pub chan_id: u64,
    pub payload: BookPayload,
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Subscribed { chan_id: u64 },
    Unsubscribed { chan_id: u64 },
    Heartbeat { chan_id: u64 },
    Info,
    Book(BookMessage),
}

impl Inbound {
    /// Classify a raw frame; anything malformed yields `None` and is dropped
    /// at this boundary without surfacing an error.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;

        match value {
            Value::Object(map) => {
                let event = map.get("event")?.as_str()?;
                match event {
                    "subscribed" => Some(Inbound::Subscribed {
                        chan_id: map.get("chanId")?.as_u64()?,
                    }),
                    "unsubscribed" => Some(Inbound::Unsubscribed {
                        chan_id: map.get("chanId")?.as_u64()?,
                    }),
                    "info" | "conf" | "pong" => Some(Inbound::Info),
                    _ => None,
                }
            }
            Value::Array(items) => {
                let chan_id = items.first()?.as_u64()?;
                let payload = items.get(1)?;

                if payload.as_str() == Some("hb") {
                    return Some(Inbound::Heartbeat { chan_id });
                }

                let seq = payload.as_array()?;
                if seq.first()?.is_array() {
                    let entries: Vec<BookEntry> =
                        seq.iter().map(parse_entry).collect::<Option<_>>()?;
                    Some(Inbound::Book(BookMessage {
                        chan_id,
                        payload: BookPayload::Snapshot(entries),
                    }))
                } else {
                    Some(Inbound::Book(BookMessage {
                        chan_id,
                        payload: BookPayload::Delta(parse_entry_fields(seq)?),
                    }))
                }
            }
            _ => None,
        }
    }
}

fn parse_entry(value: &Value) -> Option<BookEntry> {
    parse_entry_fields(value.as_array()?)
}

fn parse_entry_fields(fields: &[Value]) -> Option<BookEntry> {
    if fields.len() != 3 {
        return None;
    }
    let price = Decimal::from_f64(fields[0].as_f64()?)?;
    let count = u32::try_from(fields[1].as_u64()?).ok()?;
    let amount = Decimal::from_f64(fields[2].as_f64()?)?;
    Some(BookEntry {
        price,
        count,
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subscribe_frame_shape() {
        let options = SubscriptionOptions::default();
        let frame = subscribe_frame(&options).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["event"], "subscribe");
        assert_eq!(value["channel"], "book");
        assert_eq!(value["symbol"], "tBTCUSD");
        assert_eq!(value["prec"], "P0");
        assert_eq!(value["freq"], "F0");
        assert_eq!(value["len"], "25");
    }

    #[test]
    fn test_unsubscribe_frame_shape() {
        let frame = unsubscribe_frame(266343).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["event"], "unsubscribe");
        assert_eq!(value["chanId"], 266343);
    }

    #[test]
    fn test_parse_subscribed_ack() {
        let raw = r#"{"event":"subscribed","channel":"book","chanId":266343,"symbol":"tBTCUSD","prec":"P0","freq":"F0","len":"25"}"#;
        assert_eq!(
            Inbound::parse(raw),
            Some(Inbound::Subscribed { chan_id: 266343 })
        );
    }

    #[test]
    fn test_parse_unsubscribed_ack() {
        let raw = r#"{"event":"unsubscribed","status":"OK","chanId":266343}"#;
        assert_eq!(
            Inbound::parse(raw),
            Some(Inbound::Unsubscribed { chan_id: 266343 })
        );
    }

    #[test]
    fn test_parse_snapshot() {
        let raw = r#"[266343,[[41669,1,0.0008],[41664,2,-0.3]]]"#;
        let parsed = Inbound::parse(raw).unwrap();

        let Inbound::Book(msg) = parsed else {
            panic!("expected book message");
        };
        assert_eq!(msg.chan_id, 266343);
        let BookPayload::Snapshot(entries) = msg.payload else {
            panic!("expected snapshot");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].price, dec!(41669));
        assert_eq!(entries[0].count, 1);
        assert_eq!(entries[1].amount, dec!(-0.3));
    }

    #[test]
    fn test_parse_delta() {
        let raw = r#"[266343,[41664,0,-1]]"#;
        let parsed = Inbound::parse(raw).unwrap();

        let Inbound::Book(msg) = parsed else {
            panic!("expected book message");
        };
        let BookPayload::Delta(entry) = msg.payload else {
            panic!("expected delta");
        };
        assert_eq!(entry.price, dec!(41664));
        assert_eq!(entry.count, 0);
        assert_eq!(entry.amount, dec!(-1));
    }

    #[test]
    fn test_parse_heartbeat() {
        assert_eq!(
            Inbound::parse(r#"[266343,"hb"]"#),
            Some(Inbound::Heartbeat { chan_id: 266343 })
        );
    }

    #[test]
    fn test_parse_info_greeting() {
        let raw = r#"{"event":"info","version":2,"platform":{"status":1}}"#;
        assert_eq!(Inbound::parse(raw), Some(Inbound::Info));
    }

    #[test]
    fn test_malformed_frames_dropped() {
        assert_eq!(Inbound::parse("not json"), None);
        assert_eq!(Inbound::parse(r#""just a string""#), None);
        assert_eq!(Inbound::parse(r#"{"event":"totally-unknown"}"#), None);
        assert_eq!(Inbound::parse(r#"[266343]"#), None);
        assert_eq!(Inbound::parse(r#"[266343,[41664,0]]"#), None);
        assert_eq!(Inbound::parse(r#"["abc",[41664,0,-1]]"#), None);
    }

    #[test]
    fn test_options_merge() {
        let base = SubscriptionOptions::default();
        let merged = base.merge(&OptionsUpdate {
            prec: Some(Precision::P2),
            ..Default::default()
        });

        assert_eq!(merged.prec, Precision::P2);
        assert_eq!(merged.symbol, base.symbol);
        assert_eq!(merged.freq, base.freq);
        assert_eq!(merged.len, base.len);
    }

    #[test]
    fn test_options_merge_empty_update_is_identity() {
        let base = SubscriptionOptions::default();
        assert_eq!(base.merge(&OptionsUpdate::default()), base);
    }
}
