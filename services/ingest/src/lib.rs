//! Real-time trading-data ingestion and indexing engine
//!
//! Accepts a continuous feed of row-level change events over a TCP stream
//! socket and a local byte-stream endpoint, batches them between the
//! transports and a single applier, and maintains two in-memory columnar
//! tables with stable slot indices, key-indexed upserts, tombstoned
//! deletes, cell-level reads, and bounded substring search. Per-batch
//! summaries fan out to subscribers and per-message latency records feed
//! a CSV metrics pipeline.
//!
//! # Architecture
//!
//! ```text
//!  TCP listener ──┐
//!                 ├─► line frames ─► decoder ─► MPSC channel
//!  local socket ──┘                                  │
//!                                              ┌─────▼─────┐
//!                                              │  batcher  │ size OR timeout
//!                                              └─────┬─────┘
//!                                              ┌─────▼─────┐
//!                                              │  applier  │ one batch_upsert per table
//!                                              └─────┬─────┘
//!                         ┌──────────────┬───────────┼─────────────┐
//!                   table mutation  alive rows   metrics emit  BatchApplied
//! ```

pub mod applier;
pub mod batcher;
pub mod codec;
pub mod config;
pub mod engine;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod projection;
pub mod store;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
