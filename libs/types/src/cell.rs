//! Tagged cell values for the columnar store
//!
//! Every table cell is one of five runtime shapes: text, signed integer,
//! fixed-point decimal, millisecond-epoch timestamp, or null. Prices and
//! other monetary amounts use `rust_decimal` for deterministic arithmetic
//! (no floating-point errors).
//!
//! Parsing is lossy on purpose: a field that fails to parse as its declared
//! type coerces to that type's zero/empty value instead of rejecting the
//! whole record.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wall-clock format accepted for timestamp cells alongside epoch millis.
const WALL_CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Declared type of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// Free text (identifiers, sides, statuses, venues, tags)
    Text,
    /// Signed 64-bit integer (sizes, volumes, counters)
    Integer,
    /// Fixed-point decimal (prices, amounts, ratios)
    Decimal,
    /// Millisecond epoch timestamp
    Timestamp,
}

/// A single tagged cell value.
///
/// `Null` is reserved for tombstoned rows and absent data; typed parse
/// failures produce the type's zero value, never `Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Timestamp(i64),
    Null,
}

impl CellValue {
    /// The zero/empty value of a declared column type.
    pub fn zero_of(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Text => CellValue::Text(String::new()),
            ColumnType::Integer => CellValue::Integer(0),
            ColumnType::Decimal => CellValue::Decimal(Decimal::ZERO),
            ColumnType::Timestamp => CellValue::Timestamp(0),
        }
    }

    /// Parse a raw field into a cell of the declared type.
    ///
    /// Unparseable input coerces to [`CellValue::zero_of`] so that one bad
    /// field never drops the record it belongs to.
    pub fn parse(raw: &str, ty: ColumnType) -> Self {
        let raw = raw.trim();
        match ty {
            ColumnType::Text => CellValue::Text(raw.to_string()),
            ColumnType::Integer => CellValue::Integer(raw.parse::<i64>().unwrap_or(0)),
            ColumnType::Decimal => {
                CellValue::Decimal(Decimal::from_str(raw).unwrap_or(Decimal::ZERO))
            }
            ColumnType::Timestamp => CellValue::Timestamp(parse_timestamp_ms(raw)),
        }
    }

    /// Whether this cell is the null sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Borrow the text content, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Coarse per-cell heap footprint in bytes, for store diagnostics.
    pub fn heap_size(&self) -> usize {
        let inline = std::mem::size_of::<CellValue>();
        match self {
            CellValue::Text(s) => inline + s.capacity(),
            _ => inline,
        }
    }
}

/// Parse a timestamp field: epoch milliseconds, or `YYYY-MM-DD HH:MM:SS.mmm`
/// wall-clock text interpreted as UTC. Anything else is zero.
fn parse_timestamp_ms(raw: &str) -> i64 {
    if let Ok(ms) = raw.parse::<i64>() {
        return ms;
    }
    NaiveDateTime::parse_from_str(raw, WALL_CLOCK_FORMAT)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0)
}

// Rendered form feeds both the wire format and substring search; timestamps
// render as epoch millis so formatted rows re-parse to themselves.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Integer(v) => write!(f, "{}", v),
            CellValue::Decimal(d) => write!(f, "{}", d),
            CellValue::Timestamp(ms) => write!(f, "{}", ms),
            CellValue::Null => Ok(()),
        }
    }
}
