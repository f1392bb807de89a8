//! Performance metrics pipeline
//!
//! Hot-path instrumentation is a non-blocking enqueue plus short mutexed
//! reservoir pushes; everything that touches a file happens on the flush
//! task. Every 1 s the task drains queued per-message records into a CSV
//! file, and every 10 s it appends a `# SUMMARY` comment line with
//! aggregate counters and percentiles. All file I/O is best-effort:
//! failures log a warning and never reach the mutators.
//!
//! Percentiles use linear interpolation between adjacent ranks of a
//! sorted copy of the reservoir.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::applier::BatchApplied;
use types::message::{now_ms, MessageTiming, Operation};
use types::schema::TableKind;

/// Samples kept per latency family.
const RESERVOIR_CAPACITY: usize = 10_000;

/// CSV header, fixed order. Hosts without a generational GC emit zeros in
/// the three collection columns; CPU sampling is likewise zero here.
pub const CSV_HEADER: &str = "Timestamp,MessageType,SendTimestamp,ReceiveTimestamp,\
QueueTimestamp,ApplyTimestamp,RenderStartTimestamp,RenderEndTimestamp,EndToEndLatency,\
ProcessingLatency,RenderLatency,QueueDepth,UIRenderQueueDepth,CPUUsage,MemoryUsage,\
Gen0Collections,Gen1Collections,Gen2Collections";

/// One per-message latency record bound for the CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRecord {
    pub recorded_ms: i64,
    pub message_type: String,
    pub timing: MessageTiming,
    pub end_to_end_ms: i64,
    pub processing_ms: i64,
    pub render_ms: i64,
    pub queue_depth: i64,
    pub ui_queue_depth: i64,
    pub memory_bytes: u64,
}

impl MetricRecord {
    /// Render as one CSV row matching [`CSV_HEADER`].
    pub fn csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},0,{},0,0,0",
            self.recorded_ms,
            self.message_type,
            self.timing.send_ms,
            self.timing.receive_ms,
            self.timing.queue_ms,
            self.timing.apply_ms,
            self.timing.render_start_ms,
            self.timing.render_end_ms,
            self.end_to_end_ms,
            self.processing_ms,
            self.render_ms,
            self.queue_depth,
            self.ui_queue_depth,
            self.memory_bytes,
        )
    }
}

/// Sliding reservoir of the most recent samples.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a sample, evicting the oldest at capacity.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Percentile (0..=100) with linear interpolation between adjacent
    /// ranks: `idx = p/100 × (n−1)`, blending `v[⌊idx⌋]` and `v[⌈idx⌉]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = p / 100.0 * (sorted.len() - 1) as f64;
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        let weight = idx - lo as f64;
        Some(sorted[lo] as f64 * (1.0 - weight) + sorted[hi] as f64 * weight)
    }
}

/// P50/P95/P99 for the three latency families, plus aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub messages_recorded: u64,
    pub messages_applied: u64,
    pub batches_applied: u64,
    pub parse_errors: u64,
    pub rejected: u64,
    pub queue_depth: i64,
    pub end_to_end: [f64; 3],
    pub processing: [f64; 3],
    pub render: [f64; 3],
}

/// Shared metrics state: lock-free counters, a non-blocking record queue,
/// and three reservoirs behind short mutexed sections.
pub struct MetricsHub {
    enabled: bool,
    running: AtomicBool,
    records_tx: mpsc::UnboundedSender<MetricRecord>,
    records_rx: Mutex<Option<mpsc::UnboundedReceiver<MetricRecord>>>,
    end_to_end: Mutex<LatencyTracker>,
    processing: Mutex<LatencyTracker>,
    render: Mutex<LatencyTracker>,
    messages_recorded: AtomicU64,
    messages_applied: AtomicU64,
    batches_applied: AtomicU64,
    parse_errors: AtomicU64,
    rejected: AtomicU64,
    render_start_ms: AtomicI64,
    render_end_ms: AtomicI64,
    queue_depth: AtomicI64,
    ui_queue_depth: AtomicI64,
    memory_bytes: AtomicU64,
}

impl MetricsHub {
    /// `enabled` gates only the CSV record queue; counters and reservoirs
    /// always run.
    pub fn new(enabled: bool) -> Self {
        let (records_tx, records_rx) = mpsc::unbounded_channel();
        Self {
            enabled,
            running: AtomicBool::new(false),
            records_tx,
            records_rx: Mutex::new(Some(records_rx)),
            end_to_end: Mutex::new(LatencyTracker::new(RESERVOIR_CAPACITY)),
            processing: Mutex::new(LatencyTracker::new(RESERVOIR_CAPACITY)),
            render: Mutex::new(LatencyTracker::new(RESERVOIR_CAPACITY)),
            messages_recorded: AtomicU64::new(0),
            messages_applied: AtomicU64::new(0),
            batches_applied: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            render_start_ms: AtomicI64::new(0),
            render_end_ms: AtomicI64::new(0),
            queue_depth: AtomicI64::new(0),
            ui_queue_depth: AtomicI64::new(0),
            memory_bytes: AtomicU64::new(0),
        }
    }

    /// Record one applied non-delete message.
    ///
    /// Render timestamps missing from the message are filled from the
    /// latest consumer-supplied pair; with none supplied the render-derived
    /// latencies degrade toward zero.
    pub fn record_message(&self, timing: &MessageTiming, table: TableKind, op: Operation) {
        let mut timing = *timing;
        if timing.render_start_ms == 0 {
            timing.render_start_ms = self.render_start_ms.load(Ordering::Relaxed);
        }
        if timing.render_end_ms == 0 {
            timing.render_end_ms = self.render_end_ms.load(Ordering::Relaxed);
        }

        let end_to_end_ms = (timing.render_end_ms - timing.send_ms).max(0);
        let processing_ms = (timing.apply_ms - timing.receive_ms).max(0);
        let render_ms = (timing.render_end_ms - timing.render_start_ms).max(0);

        if let Ok(mut tracker) = self.end_to_end.lock() {
            tracker.record(end_to_end_ms as u64);
        }
        if let Ok(mut tracker) = self.processing.lock() {
            tracker.record(processing_ms as u64);
        }
        if let Ok(mut tracker) = self.render.lock() {
            tracker.record(render_ms as u64);
        }
        self.messages_recorded.fetch_add(1, Ordering::Relaxed);

        if self.enabled {
            let record = MetricRecord {
                recorded_ms: now_ms(),
                message_type: format!("{}{}", table, op),
                timing,
                end_to_end_ms,
                processing_ms,
                render_ms,
                queue_depth: self.queue_depth.load(Ordering::Relaxed),
                ui_queue_depth: self.ui_queue_depth.load(Ordering::Relaxed),
                memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            };
            // Unbounded send never blocks; a closed flush task just drops.
            let _ = self.records_tx.send(record);
        }
    }

    /// Fold one batch summary into the aggregate counters.
    pub fn record_batch(&self, summary: &BatchApplied) {
        self.batches_applied.fetch_add(1, Ordering::Relaxed);
        self.messages_applied.fetch_add(summary.total, Ordering::Relaxed);
        self.rejected.fetch_add(summary.rejected, Ordering::Relaxed);
    }

    pub fn incr_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Latest render window from the external consumer.
    pub fn update_render_timing(&self, start_ms: i64, end_ms: i64) {
        self.render_start_ms.store(start_ms, Ordering::Relaxed);
        self.render_end_ms.store(end_ms, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn set_ui_queue_depth(&self, depth: i64) {
        self.ui_queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn set_memory_usage(&self, bytes: usize) {
        self.memory_bytes.store(bytes as u64, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Aggregate counters plus P50/P95/P99 per latency family.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_recorded: self.messages_recorded.load(Ordering::Relaxed),
            messages_applied: self.messages_applied.load(Ordering::Relaxed),
            batches_applied: self.batches_applied.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            end_to_end: family_percentiles(&self.end_to_end),
            processing: family_percentiles(&self.processing),
            render: family_percentiles(&self.render),
        }
    }
}

fn family_percentiles(tracker: &Mutex<LatencyTracker>) -> [f64; 3] {
    match tracker.lock() {
        Ok(tracker) => [
            tracker.percentile(50.0).unwrap_or(0.0),
            tracker.percentile(95.0).unwrap_or(0.0),
            tracker.percentile(99.0).unwrap_or(0.0),
        ],
        Err(_) => [0.0; 3],
    }
}

/// Spawn the flush task: 1 s record drain, 10 s summary, final flush on
/// shutdown. The hub transitions Running here and back to Stopped when the
/// task disposes.
pub fn spawn_flush_task(
    hub: Arc<MetricsHub>,
    directory: PathBuf,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = match hub.records_rx.lock() {
            Ok(mut slot) => match slot.take() {
                Some(rx) => rx,
                None => {
                    warn!("metrics flush task already started once; refusing second start");
                    return;
                }
            },
            Err(_) => return,
        };
        hub.running.store(true, Ordering::Release);

        let file_name = format!("metrics_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = directory.join(file_name);
        let mut writer = open_csv(&path);
        write_line(&mut writer, CSV_HEADER);
        info!(path = %path.display(), "metrics flush task started");

        let mut flush_tick = tokio::time::interval(std::time::Duration::from_secs(1));
        let mut summary_tick = tokio::time::interval(std::time::Duration::from_secs(10));
        // The first tick of an interval fires immediately; swallow both.
        flush_tick.tick().await;
        summary_tick.tick().await;

        loop {
            tokio::select! {
                _ = flush_tick.tick() => drain_records(&mut rx, &mut writer),
                _ = summary_tick.tick() => write_line(&mut writer, &summary_line(&hub)),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Disposal flushes once more.
        drain_records(&mut rx, &mut writer);
        write_line(&mut writer, &summary_line(&hub));
        if let Some(w) = writer.as_mut() {
            let _ = w.flush();
        }
        hub.running.store(false, Ordering::Release);
        info!("metrics flush task stopped");
    })
}

fn open_csv(path: &Path) -> Option<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    match File::create(path) {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot create metrics file; records will be dropped");
            None
        }
    }
}

fn drain_records(rx: &mut mpsc::UnboundedReceiver<MetricRecord>, writer: &mut Option<BufWriter<File>>) {
    while let Ok(record) = rx.try_recv() {
        write_line(writer, &record.csv_line());
    }
    if let Some(w) = writer.as_mut() {
        let _ = w.flush();
    }
}

fn write_line(writer: &mut Option<BufWriter<File>>, line: &str) {
    if let Some(w) = writer.as_mut() {
        if let Err(e) = writeln!(w, "{}", line) {
            warn!(error = %e, "metrics write failed");
        }
    }
}

fn summary_line(hub: &MetricsHub) -> String {
    let s = hub.snapshot();
    format!(
        "# SUMMARY ts={} messages={} applied={} batches={} parse_errors={} rejected={} \
queue_depth={} e2e_p50={:.2} e2e_p95={:.2} e2e_p99={:.2} proc_p50={:.2} proc_p95={:.2} \
proc_p99={:.2} render_p50={:.2} render_p95={:.2} render_p99={:.2}",
        now_ms(),
        s.messages_recorded,
        s.messages_applied,
        s.batches_applied,
        s.parse_errors,
        s.rejected,
        s.queue_depth,
        s.end_to_end[0],
        s.end_to_end[1],
        s.end_to_end[2],
        s.processing[0],
        s.processing[1],
        s.processing[2],
        s.render[0],
        s.render[1],
        s.render[2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates_between_ranks() {
        let mut tracker = LatencyTracker::new(100);
        for v in [10u64, 20, 30, 40] {
            tracker.record(v);
        }
        // idx = 1.5 → halfway between 20 and 30
        assert_eq!(tracker.percentile(50.0), Some(25.0));
        // idx = 2.85 → 30·0.15 + 40·0.85
        let p95 = tracker.percentile(95.0).unwrap();
        assert!((p95 - 38.5).abs() < 1e-9);
        // Endpoints are exact
        assert_eq!(tracker.percentile(0.0), Some(10.0));
        assert_eq!(tracker.percentile(100.0), Some(40.0));
    }

    #[test]
    fn test_percentile_empty_is_none() {
        let tracker = LatencyTracker::new(10);
        assert_eq!(tracker.percentile(50.0), None);
    }

    #[test]
    fn test_reservoir_drops_oldest() {
        let mut tracker = LatencyTracker::new(3);
        for v in 1..=5u64 {
            tracker.record(v);
        }
        assert_eq!(tracker.len(), 3);
        // 1 and 2 evicted; min is now 3
        assert_eq!(tracker.percentile(0.0), Some(3.0));
    }

    #[test]
    fn test_record_message_fills_render_pair() {
        let hub = MetricsHub::new(true);
        hub.update_render_timing(500, 600);

        let timing = MessageTiming {
            send_ms: 100,
            receive_ms: 110,
            queue_ms: 120,
            apply_ms: 130,
            ..MessageTiming::default()
        };
        hub.record_message(&timing, TableKind::OrderBook, Operation::Insert);

        let s = hub.snapshot();
        assert_eq!(s.messages_recorded, 1);
        // end_to_end = 600 − 100, processing = 130 − 110, render = 600 − 500
        assert_eq!(s.end_to_end[0], 500.0);
        assert_eq!(s.processing[0], 20.0);
        assert_eq!(s.render[0], 100.0);
    }

    #[test]
    fn test_absent_render_pair_degrades_to_zero() {
        let hub = MetricsHub::new(false);
        let timing = MessageTiming {
            send_ms: 100,
            receive_ms: 110,
            apply_ms: 130,
            ..MessageTiming::default()
        };
        hub.record_message(&timing, TableKind::TradeBook, Operation::Update);

        let s = hub.snapshot();
        assert_eq!(s.end_to_end[0], 0.0);
        assert_eq!(s.render[0], 0.0);
        assert_eq!(s.processing[0], 20.0);
    }

    #[test]
    fn test_csv_line_has_header_arity() {
        let record = MetricRecord {
            recorded_ms: 1,
            message_type: "OrderBookInsert".to_string(),
            timing: MessageTiming::default(),
            end_to_end_ms: 2,
            processing_ms: 3,
            render_ms: 4,
            queue_depth: 5,
            ui_queue_depth: 6,
            memory_bytes: 7,
        };
        let fields = record.csv_line().split(',').count();
        assert_eq!(fields, CSV_HEADER.split(',').count());
    }

    #[tokio::test]
    async fn test_flush_task_writes_records_and_summary() {
        let hub = Arc::new(MetricsHub::new(true));
        let dir = std::env::temp_dir().join(format!("metrics-test-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_flush_task(hub.clone(), dir.clone(), shutdown_rx);
        // Give the task a beat to open the file and go Running
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(hub.is_running());

        let timing = MessageTiming {
            send_ms: 1,
            receive_ms: 2,
            queue_ms: 3,
            apply_ms: 4,
            ..MessageTiming::default()
        };
        hub.record_message(&timing, TableKind::OrderBook, Operation::Insert);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(!hub.is_running());

        let entry = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .find(|e| e.file_name().to_string_lossy().starts_with("metrics_"))
            .expect("metrics file created");
        let contents = std::fs::read_to_string(entry.path()).unwrap();
        assert!(contents.starts_with(CSV_HEADER));
        assert!(contents.contains("OrderBookInsert"));
        assert!(contents.contains("# SUMMARY"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_flush_task_refuses_second_start() {
        let hub = Arc::new(MetricsHub::new(true));
        let dir = std::env::temp_dir();
        let (_tx, rx) = watch::channel(false);

        let first = spawn_flush_task(hub.clone(), dir.clone(), rx.clone());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = spawn_flush_task(hub.clone(), dir, rx);
        // Second task exits immediately without stealing the queue
        second.await.unwrap();
        assert!(hub.is_running());
        first.abort();
    }
}
