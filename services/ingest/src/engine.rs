//! Engine wiring and lifecycle
//!
//! Owns the two books, the ingest channel, the listeners, the applier,
//! and the metrics tasks; `start` brings them up, `shutdown` tears them
//! down in order: the watch signal stops accepting and unblocks handlers,
//! dropping the last producer closes the channel, the applier drains the
//! residue into a final batch, and metrics flush once more.
//!
//! Consumers read through the engine: dense-row cell fetches resolve via
//! the alive projection, searches and point lookups take shared access,
//! and `subscribe` delivers [`BatchApplied`] events in apply order.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::applier::{Applier, BatchApplied};
use crate::batcher::{ingest_channel, BatchCollector, IngestSender};
use crate::config::AppConfig;
use crate::listener::{run_local_listener, run_tcp_listener, ConnectionRegistry, HandlerContext};
use crate::metrics::{spawn_flush_task, MetricsHub};
use crate::projection::AliveProjection;
use crate::store::ColumnTable;
use types::cell::CellValue;
use types::errors::{IngestError, TransportError};
use types::schema::{TableKind, ORDER_BOOK, TRADE_BOOK};

/// A table paired with its published alive-row projection.
pub struct Book {
    pub table: ColumnTable,
    pub projection: AliveProjection,
}

impl Book {
    pub fn new(table: ColumnTable) -> Self {
        Self {
            table,
            projection: AliveProjection::new(),
        }
    }
}

/// The assembled ingestion engine.
pub struct IngestEngine {
    config: AppConfig,
    orders: Arc<Book>,
    trades: Arc<Book>,
    metrics: Arc<MetricsHub>,
    registry: Arc<ConnectionRegistry>,
    events: broadcast::Sender<BatchApplied>,
    shutdown: watch::Sender<bool>,
    sender: Option<IngestSender>,
    collector: Option<BatchCollector>,
    tasks: Vec<JoinHandle<()>>,
    tcp_addr: Option<SocketAddr>,
}

impl IngestEngine {
    /// Validate the configuration and assemble the engine, unstarted.
    pub fn new(config: AppConfig) -> Result<Self, IngestError> {
        config.validate()?;

        let (sender, collector) = ingest_channel(
            config.ingest_queue_capacity,
            config.batch_size,
            std::time::Duration::from_millis(config.batch_timeout_ms),
        );
        let (events, _) = broadcast::channel(256);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            metrics: Arc::new(MetricsHub::new(config.enable_metrics)),
            config,
            orders: Arc::new(Book::new(ColumnTable::new(&ORDER_BOOK))),
            trades: Arc::new(Book::new(ColumnTable::new(&TRADE_BOOK))),
            registry: Arc::new(ConnectionRegistry::new()),
            events,
            shutdown,
            sender: Some(sender),
            collector: Some(collector),
            tasks: Vec::new(),
            tcp_addr: None,
        })
    }

    /// Bind both transports and spawn the pipeline tasks.
    pub async fn start(&mut self) -> Result<(), IngestError> {
        let collector = self.collector.take().ok_or(IngestError::ShuttingDown)?;
        let sender = self.sender.clone().ok_or(IngestError::ShuttingDown)?;

        let tcp = TcpListener::bind(("0.0.0.0", self.config.tcp_port))
            .await
            .map_err(|e| TransportError::Bind {
                endpoint: format!("0.0.0.0:{}", self.config.tcp_port),
                message: e.to_string(),
            })?;
        self.tcp_addr = tcp.local_addr().ok();

        let socket_path = self.config.local_socket_path();
        // A stale socket file from a previous run blocks the bind
        let _ = std::fs::remove_file(&socket_path);
        let local = UnixListener::bind(&socket_path).map_err(|e| TransportError::Bind {
            endpoint: socket_path.display().to_string(),
            message: e.to_string(),
        })?;

        let ctx = HandlerContext {
            sender,
            metrics: self.metrics.clone(),
            registry: self.registry.clone(),
            buffer_size: self.config.tcp_buffer_size,
        };

        self.tasks
            .push(tokio::spawn(run_tcp_listener(tcp, ctx.clone(), self.shutdown.subscribe())));
        self.tasks
            .push(tokio::spawn(run_local_listener(local, ctx, self.shutdown.subscribe())));

        let applier = Applier::new(
            self.orders.clone(),
            self.trades.clone(),
            self.metrics.clone(),
            self.events.clone(),
        );
        self.tasks.push(tokio::spawn(applier.run(collector)));

        if self.config.enable_metrics {
            self.tasks.push(spawn_flush_task(
                self.metrics.clone(),
                self.config.log_directory.clone(),
                self.shutdown.subscribe(),
            ));
        }

        info!(
            tcp = ?self.tcp_addr,
            local = %self.config.local_socket_path().display(),
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout_ms,
            "ingest engine started"
        );
        Ok(())
    }

    /// Signal cancellation and wait for every task to drain and exit.
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        // Dropping the engine's producer lets the channel close once the
        // listener handlers release theirs; the applier then drains.
        self.sender.take();
        self.collector.take();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "pipeline task ended abnormally");
                }
            }
        }
        let _ = std::fs::remove_file(self.config.local_socket_path());
        info!("ingest engine stopped");
    }

    /// Producer handle for in-process feeds and tests.
    ///
    /// The channel closes only when every handle is gone; drop clones
    /// before calling [`IngestEngine::shutdown`] or the applier waits on
    /// them.
    pub fn sender(&self) -> Option<IngestSender> {
        self.sender.clone()
    }

    /// Subscribe to batch summaries, delivered in apply order.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchApplied> {
        self.events.subscribe()
    }

    pub fn book(&self, kind: TableKind) -> &Arc<Book> {
        match kind {
            TableKind::OrderBook => &self.orders,
            TableKind::TradeBook => &self.trades,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsHub> {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Actual TCP address once started (useful with an ephemeral port).
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Dense-grid cell fetch: `(row_index, column_index) → cell` through
    /// the alive projection. Out-of-range coordinates yield null.
    pub fn grid_cell(&self, kind: TableKind, row_index: usize, col: usize) -> CellValue {
        let book = self.book(kind);
        match book.projection.slot_at(row_index) {
            Some(slot) => book.table.cell(slot, col),
            None => CellValue::Null,
        }
    }

    /// Rows currently visible through the alive projection.
    pub fn grid_rows(&self, kind: TableKind) -> usize {
        self.book(kind).projection.len()
    }

    /// Bounded substring search over one column of a table.
    pub fn search(&self, kind: TableKind, needle: &str, col: usize, limit: usize) -> Vec<usize> {
        self.book(kind).table.search(needle, col, limit)
    }

    /// Render window reported by the external consumer.
    pub fn update_render_timing(&self, start_ms: i64, end_ms: i64) {
        self.metrics.update_render_timing(start_ms, end_ms);
    }
}
