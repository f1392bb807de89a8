//! Reference data simulator
//!
//! Produces OrderBook/TradeBook change events in the exact wire framing
//! the ingest engine decodes, from a seeded RNG so a given seed always
//! yields the same stream. Doubles as the round-trip fixture for codec
//! tests.

pub mod generator;

/// Library version
pub const VERSION: &str = "0.1.0";
