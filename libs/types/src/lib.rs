//! Types library for the trading-data ingestion engine
//!
//! This library provides the core type definitions shared by the ingest
//! service and the data simulator: cell values, table schemas, wire
//! messages, and the error taxonomy.
//!
//! # Modules
//! - `cell`: Tagged cell values and declared column types
//! - `schema`: Fixed 50-column OrderBook/TradeBook schemas
//! - `message`: Wire messages and lifecycle timestamps
//! - `errors`: Error taxonomy

// Public modules
pub mod cell;
pub mod errors;
pub mod message;
pub mod schema;

// Library version constant
pub const LIB_VERSION: &str = "0.1.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cell::*;
    pub use crate::errors::*;
    pub use crate::message::*;
    pub use crate::schema::*;
}
