//! Batch applier
//!
//! The single consumer of the ingest channel. For every message in a
//! batch it stamps `apply_ts` and routes by table: deletes hit the table
//! immediately; inserts and updates parse into rows and stage for one
//! `batch_upsert` per table, so sequential staging keeps last-writer-wins
//! per key within the batch. After the writer lock is released the alive
//! projections are rebuilt and a [`BatchApplied`] event fans out, so a
//! search issued after observing the event sees the batch.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::batcher::BatchCollector;
use crate::codec::parse_row;
use crate::engine::Book;
use crate::metrics::MetricsHub;
use crate::store::{BatchOutcome, Row};
use types::message::{now_ms, DataMessage, Operation};
use types::schema::TableKind;

/// Counters for one applied batch, delivered in apply order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchApplied {
    /// Messages in the batch.
    pub total: u64,
    pub orders_inserted: u64,
    pub orders_updated: u64,
    pub orders_deleted: u64,
    pub trades_inserted: u64,
    pub trades_updated: u64,
    pub trades_deleted: u64,
    /// Messages that did not succeed: parse failures, deletes of absent
    /// keys, capacity shortfall.
    pub rejected: u64,
    /// Last apply stamp minus first queue stamp.
    pub batch_latency_ms: i64,
}

impl BatchApplied {
    /// Sum of the six per-table outcome counters.
    pub fn applied(&self) -> u64 {
        self.orders_inserted
            + self.orders_updated
            + self.orders_deleted
            + self.trades_inserted
            + self.trades_updated
            + self.trades_deleted
    }
}

/// Dispatches batches into the two tables.
pub struct Applier {
    orders: Arc<Book>,
    trades: Arc<Book>,
    metrics: Arc<MetricsHub>,
    events: broadcast::Sender<BatchApplied>,
}

impl Applier {
    pub fn new(
        orders: Arc<Book>,
        trades: Arc<Book>,
        metrics: Arc<MetricsHub>,
        events: broadcast::Sender<BatchApplied>,
    ) -> Self {
        Self {
            orders,
            trades,
            metrics,
            events,
        }
    }

    /// Consume batches until the channel closes; the residual batch the
    /// collector returns at close applies like any other.
    pub async fn run(self, mut collector: BatchCollector) {
        while let Some(batch) = collector.next_batch().await {
            self.metrics.set_queue_depth(collector.depth());
            self.apply_batch(batch);
        }
        info!("ingest channel closed; applier exiting");
    }

    /// Apply one batch and emit its summary event.
    pub fn apply_batch(&self, mut batch: Vec<DataMessage>) -> BatchApplied {
        let first_queue_ms = batch.first().map(|m| m.timing.queue_ms).unwrap_or(0);
        let mut summary = BatchApplied {
            total: batch.len() as u64,
            ..BatchApplied::default()
        };

        let mut order_rows: Vec<Row> = Vec::new();
        let mut trade_rows: Vec<Row> = Vec::new();
        let mut orders_touched = false;
        let mut trades_touched = false;

        for msg in &mut batch {
            msg.timing.apply_ms = now_ms();
            match msg.op {
                Operation::Delete => {
                    let key = msg.data.trim();
                    let removed = match msg.table {
                        TableKind::OrderBook => self.orders.table.delete(key),
                        TableKind::TradeBook => self.trades.table.delete(key),
                    };
                    if removed {
                        match msg.table {
                            TableKind::OrderBook => {
                                summary.orders_deleted += 1;
                                orders_touched = true;
                            }
                            TableKind::TradeBook => {
                                summary.trades_deleted += 1;
                                trades_touched = true;
                            }
                        }
                    } else {
                        summary.rejected += 1;
                    }
                }
                Operation::Insert | Operation::Update => {
                    let (book, staged) = match msg.table {
                        TableKind::OrderBook => (&self.orders, &mut order_rows),
                        TableKind::TradeBook => (&self.trades, &mut trade_rows),
                    };
                    match parse_row(&msg.data, book.table.schema()) {
                        Ok(row) => staged.push(row),
                        Err(e) => {
                            self.metrics.incr_parse_errors();
                            summary.rejected += 1;
                            warn!(table = %msg.table, error = %e, "discarding unparseable payload");
                        }
                    }
                }
            }
        }

        if !order_rows.is_empty() {
            orders_touched = true;
            let outcome = self.orders.table.batch_upsert(order_rows);
            summary.orders_inserted = outcome.inserted;
            summary.orders_updated = outcome.updated;
            summary.rejected += outcome.rejected;
            log_shortfall(TableKind::OrderBook, &outcome);
        }
        if !trade_rows.is_empty() {
            trades_touched = true;
            let outcome = self.trades.table.batch_upsert(trade_rows);
            summary.trades_inserted = outcome.inserted;
            summary.trades_updated = outcome.updated;
            summary.rejected += outcome.rejected;
            log_shortfall(TableKind::TradeBook, &outcome);
        }

        if orders_touched {
            self.orders.projection.rebuild(&self.orders.table);
        }
        if trades_touched {
            self.trades.projection.rebuild(&self.trades.table);
        }

        let last_apply_ms = batch.last().map(|m| m.timing.apply_ms).unwrap_or(0);
        summary.batch_latency_ms = last_apply_ms - first_queue_ms;

        self.metrics.set_memory_usage(
            self.orders.table.memory_estimate() + self.trades.table.memory_estimate(),
        );
        for msg in &batch {
            if msg.op != Operation::Delete {
                self.metrics.record_message(&msg.timing, msg.table, msg.op);
            }
        }
        self.metrics.record_batch(&summary);

        // The writer lock is already released and the projections are
        // rebuilt, so subscribers can read their own writes on receipt.
        let _ = self.events.send(summary);

        summary
    }
}

fn log_shortfall(table: TableKind, outcome: &BatchOutcome) {
    if outcome.rejected > 0 {
        warn!(
            table = %table,
            rejected = outcome.rejected,
            "batch upsert shortfall"
        );
    }
}
