//! Wire messages and lifecycle timestamps
//!
//! A [`DataMessage`] is one decoded change event: which table, which
//! operation, the producer's send timestamp, and the raw payload (a
//! 50-field CSV row for insert/update, the business key for delete).
//!
//! Six timestamps decorate a message through its life; they feed the
//! per-message latency metrics.

use crate::schema::TableKind;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time as millisecond epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Row-level change operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Decode a wire token. Unknown tokens default to `Insert`;
    /// the decoder is permissive by contract.
    pub fn from_wire(token: &str) -> Self {
        match token {
            "Update" => Operation::Update,
            "Delete" => Operation::Delete,
            _ => Operation::Insert,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "Insert"),
            Operation::Update => write!(f, "Update"),
            Operation::Delete => write!(f, "Delete"),
        }
    }
}

/// Millisecond-epoch timestamps stamped onto a message as it moves through
/// the pipeline. Zero means "not reached" (or, for the render pair, "no
/// consumer attached").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTiming {
    pub send_ms: i64,
    pub receive_ms: i64,
    pub queue_ms: i64,
    pub apply_ms: i64,
    pub render_start_ms: i64,
    pub render_end_ms: i64,
}

/// One decoded change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    /// Destination table.
    pub table: TableKind,
    /// Change operation.
    pub op: Operation,
    /// Payload: 50-field CSV row for insert/update, business key for delete.
    pub data: String,
    /// Lifecycle timestamps; `send_ms` comes from the wire.
    pub timing: MessageTiming,
}

impl DataMessage {
    /// Build a message as decoded off the wire, before receive stamping.
    pub fn new(table: TableKind, op: Operation, send_ts_ms: i64, data: String) -> Self {
        Self {
            table,
            op,
            data,
            timing: MessageTiming {
                send_ms: send_ts_ms,
                ..MessageTiming::default()
            },
        }
    }
}
