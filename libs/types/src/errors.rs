//! Error types for the ingestion engine
//!
//! Comprehensive error taxonomy using thiserror. The ingest hot path never
//! fails the process: parse and transport failures are counted and logged,
//! capacity and contract violations are returned to the caller.

use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Sentinel for operations attempted during cancellation; not a defect.
    #[error("Engine is shutting down")]
    ShuttingDown,
}

/// Columnar-store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Table capacity exceeded: {capacity} slots")]
    CapacityExceeded { capacity: usize },

    #[error("Row has {actual} cells, schema requires {expected}")]
    SchemaWidth { expected: usize, actual: usize },

    #[error("Business key is empty")]
    EmptyKey,
}

/// Wire decoding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Frame has {actual} fields, payload requires {expected}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Frame is empty")]
    EmptyFrame,

    #[error("Malformed JSON frame: {reason}")]
    Json { reason: String },
}

/// Transport-layer errors; a failed connection ends its handler while the
/// listener keeps accepting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("I/O failure on {endpoint}: {message}")]
    Io { endpoint: String, message: String },

    #[error("Listener failed to bind {endpoint}: {message}")]
    Bind { endpoint: String, message: String },
}

/// Startup configuration errors; fatal, the process exits with code 1.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} out of range: {value} (allowed {allowed})")]
    OutOfRange {
        field: &'static str,
        value: String,
        allowed: &'static str,
    },

    #[error("{field} must be non-empty")]
    Empty { field: &'static str },

    #[error("Cannot read config file {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("Cannot parse config file {path}: {message}")]
    Malformed { path: String, message: String },
}
