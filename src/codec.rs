//! Line format of the per-switch flat file records.
//!
//! A record is a single line of `key=value|` pairs:
//!
//! ```text
//! time=1389627240000|rxPackets=10|txPackets=5|...|collisions=0|
//! ```
//!
//! The field order is fixed and the trailing separator is part of the format.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const FIELD_TIME: &str = "time";
pub const FIELD_RX_PACKETS: &str = "rxPackets";
pub const FIELD_TX_PACKETS: &str = "txPackets";
pub const FIELD_RX_BYTES: &str = "rxBytes";
pub const FIELD_TX_BYTES: &str = "txBytes";
pub const FIELD_RX_DROPS: &str = "rxDrops";
pub const FIELD_TX_DROPS: &str = "txDrops";
pub const FIELD_RX_ERROR: &str = "rxError";
pub const FIELD_TX_ERROR: &str = "txError";
pub const FIELD_RX_FRAME_ERROR: &str = "rxFrameError";
pub const FIELD_RX_OVERRUN_ERROR: &str = "rxOverrunError";
pub const FIELD_RX_CRC_ERROR: &str = "rxCrcError";
pub const FIELD_COLLISIONS: &str = "collisions";

const KEY_VALUE_SEPARATOR: char = '=';
const FIELD_SEPARATOR: char = '|';

/// A decoded line: field name to raw text value.
pub type Record = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },
}

impl RecordError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }
}

/// Device-level totals for one sampling tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedPortSample {
    pub timestamp_millis: i64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_drops: u64,
    pub tx_drops: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_errors: u64,
    pub rx_overrun_errors: u64,
    pub rx_crc_errors: u64,
    pub collisions: u64,
}

impl AggregatedPortSample {
    /// Counter fields in on-disk order, without the timestamp.
    fn counters(&self) -> [(&'static str, u64); 12] {
        [
            (FIELD_RX_PACKETS, self.rx_packets),
            (FIELD_TX_PACKETS, self.tx_packets),
            (FIELD_RX_BYTES, self.rx_bytes),
            (FIELD_TX_BYTES, self.tx_bytes),
            (FIELD_RX_DROPS, self.rx_drops),
            (FIELD_TX_DROPS, self.tx_drops),
            (FIELD_RX_ERROR, self.rx_errors),
            (FIELD_TX_ERROR, self.tx_errors),
            (FIELD_RX_FRAME_ERROR, self.rx_frame_errors),
            (FIELD_RX_OVERRUN_ERROR, self.rx_overrun_errors),
            (FIELD_RX_CRC_ERROR, self.rx_crc_errors),
            (FIELD_COLLISIONS, self.collisions),
        ]
    }
}

/// Serializes a sample to one record line, without the newline.
pub fn encode(sample: &AggregatedPortSample) -> String {
    let mut line = String::with_capacity(256);
    push_field(&mut line, FIELD_TIME, sample.timestamp_millis);
    for (name, value) in sample.counters() {
        push_field(&mut line, name, value);
    }
    line
}

fn push_field(line: &mut String, name: &str, value: impl std::fmt::Display) {
    use std::fmt::Write;
    // writing into a String cannot fail
    let _ = write!(line, "{name}{KEY_VALUE_SEPARATOR}{value}{FIELD_SEPARATOR}");
}

/// Splits a record line into its fields.
///
/// Every field must be terminated by `|`, so a line cut short by an
/// interrupted write is rejected rather than returned partially.
pub fn decode(line: &str) -> Result<Record, RecordError> {
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    if line.is_empty() {
        return Err(RecordError::malformed("empty line"));
    }
    let mut record = Record::new();
    let mut rest = line;
    while !rest.is_empty() {
        let eq = rest
            .find(KEY_VALUE_SEPARATOR)
            .ok_or_else(|| RecordError::malformed(format!("missing '=' in '{rest}'")))?;
        let key = &rest[..eq];
        if key.is_empty() || key.contains(FIELD_SEPARATOR) {
            return Err(RecordError::malformed(format!("invalid key in '{rest}'")));
        }
        let after_eq = &rest[eq + 1..];
        let bar = after_eq
            .find(FIELD_SEPARATOR)
            .ok_or_else(|| RecordError::malformed(format!("unterminated field '{key}'")))?;
        record.insert(key.to_string(), after_eq[..bar].to_string());
        rest = &after_eq[bar + 1..];
    }
    Ok(record)
}

impl TryFrom<&Record> for AggregatedPortSample {
    type Error = RecordError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        fn field<T: std::str::FromStr>(record: &Record, name: &str) -> Result<T, RecordError> {
            let raw = record
                .get(name)
                .ok_or_else(|| RecordError::malformed(format!("missing field '{name}'")))?;
            raw.parse()
                .map_err(|_| RecordError::malformed(format!("non-numeric '{name}={raw}'")))
        }

        Ok(Self {
            timestamp_millis: field(record, FIELD_TIME)?,
            rx_packets: field(record, FIELD_RX_PACKETS)?,
            tx_packets: field(record, FIELD_TX_PACKETS)?,
            rx_bytes: field(record, FIELD_RX_BYTES)?,
            tx_bytes: field(record, FIELD_TX_BYTES)?,
            rx_drops: field(record, FIELD_RX_DROPS)?,
            tx_drops: field(record, FIELD_TX_DROPS)?,
            rx_errors: field(record, FIELD_RX_ERROR)?,
            tx_errors: field(record, FIELD_TX_ERROR)?,
            rx_frame_errors: field(record, FIELD_RX_FRAME_ERROR)?,
            rx_overrun_errors: field(record, FIELD_RX_OVERRUN_ERROR)?,
            rx_crc_errors: field(record, FIELD_RX_CRC_ERROR)?,
            collisions: field(record, FIELD_COLLISIONS)?,
        })
    }
}
