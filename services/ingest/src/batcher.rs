//! Ingest channel and batch collection
//!
//! A bounded multi-producer/single-consumer queue sits between the
//! transport handlers and the applier. Producers stamp `queue_ts` and
//! block when the channel is full, which bounds memory under sustained
//! overload. The consumer releases a batch when it reaches the size
//! threshold OR when the deadline since the batch opened expires,
//! whichever comes first. No separate timer task exists; the deadline
//! bounds the channel wait directly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::debug;

use types::errors::IngestError;
use types::message::{now_ms, DataMessage};

/// Create the ingest channel with the given capacity bound.
pub fn ingest_channel(
    capacity: usize,
    batch_size: usize,
    batch_timeout: Duration,
) -> (IngestSender, BatchCollector) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicI64::new(0));
    (
        IngestSender {
            tx,
            depth: depth.clone(),
        },
        BatchCollector {
            rx,
            depth,
            batch_size,
            batch_timeout,
        },
    )
}

/// Producer handle; cheap to clone, one per transport handler.
#[derive(Clone)]
pub struct IngestSender {
    tx: mpsc::Sender<DataMessage>,
    depth: Arc<AtomicI64>,
}

impl IngestSender {
    /// Stamp `queue_ts` and enqueue, blocking while the channel is full.
    ///
    /// Fails with the shutdown sentinel once the consumer is gone.
    pub async fn send(&self, mut msg: DataMessage) -> Result<(), IngestError> {
        msg.timing.queue_ms = now_ms();
        match self.tx.send(msg).await {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => Err(IngestError::ShuttingDown),
        }
    }

    /// Messages currently enqueued (approximate; advisory for metrics).
    pub fn depth(&self) -> i64 {
        self.depth.load(Ordering::Relaxed).max(0)
    }
}

/// The single consumer: pulls messages and forms batches.
pub struct BatchCollector {
    rx: mpsc::Receiver<DataMessage>,
    depth: Arc<AtomicI64>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl BatchCollector {
    /// Messages still enqueued behind the batch just taken.
    pub fn depth(&self) -> i64 {
        self.depth.load(Ordering::Relaxed).max(0)
    }

    /// Collect the next non-empty batch.
    ///
    /// Blocks for the first message, then gathers until the size threshold
    /// or the deadline. Returns `None` once the channel is closed and
    /// drained; anything still buffered at close comes back as the final
    /// batch first.
    pub async fn next_batch(&mut self) -> Option<Vec<DataMessage>> {
        let first = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::Relaxed);

        let deadline = Instant::now() + self.batch_timeout;
        let mut batch = Vec::with_capacity(self.batch_size.min(1_024));
        batch.push(first);

        while batch.len() < self.batch_size {
            // Drain whatever is already buffered before touching the clock.
            match self.rx.try_recv() {
                Ok(msg) => {
                    self.depth.fetch_sub(1, Ordering::Relaxed);
                    batch.push(msg);
                    continue;
                }
                Err(mpsc::error::TryRecvError::Empty) => {}
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }

            if Instant::now() >= deadline {
                break;
            }

            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(msg) => {
                        self.depth.fetch_sub(1, Ordering::Relaxed);
                        batch.push(msg);
                    }
                    None => break,
                },
                _ = time::sleep_until(deadline) => break,
            }
        }

        debug!(batch_len = batch.len(), "batch released");
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::message::Operation;
    use types::schema::TableKind;

    fn msg(n: usize) -> DataMessage {
        DataMessage::new(
            TableKind::OrderBook,
            Operation::Insert,
            n as i64,
            format!("payload-{}", n),
        )
    }

    #[tokio::test]
    async fn test_batch_released_by_size() {
        let (tx, mut collector) = ingest_channel(64, 3, Duration::from_secs(60));
        for n in 0..3 {
            tx.send(msg(n)).await.unwrap();
        }

        let batch = collector.next_batch().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].timing.send_ms, 0);
        assert_eq!(batch[2].timing.send_ms, 2);
    }

    #[tokio::test]
    async fn test_batch_released_by_timeout() {
        let (tx, mut collector) = ingest_channel(64, 1_000, Duration::from_millis(50));
        for n in 0..3 {
            tx.send(msg(n)).await.unwrap();
        }

        let start = Instant::now();
        let batch = collector.next_batch().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_queue_ts_stamped_on_enqueue() {
        let (tx, mut collector) = ingest_channel(64, 1, Duration::from_millis(10));
        let before = now_ms();
        tx.send(msg(0)).await.unwrap();

        let batch = collector.next_batch().await.unwrap();
        assert!(batch[0].timing.queue_ms >= before);
    }

    #[tokio::test]
    async fn test_close_flushes_residual_batch() {
        let (tx, mut collector) = ingest_channel(64, 1_000, Duration::from_secs(60));
        for n in 0..5 {
            tx.send(msg(n)).await.unwrap();
        }
        drop(tx);

        let batch = collector.next_batch().await.unwrap();
        assert_eq!(batch.len(), 5);
        assert!(collector.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_is_shutdown_sentinel() {
        let (tx, collector) = ingest_channel(64, 10, Duration::from_millis(10));
        drop(collector);

        let result = tx.send(msg(0)).await;
        assert!(matches!(result, Err(IngestError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_depth_tracks_enqueued_messages() {
        let (tx, mut collector) = ingest_channel(64, 2, Duration::from_millis(10));
        tx.send(msg(0)).await.unwrap();
        tx.send(msg(1)).await.unwrap();
        assert_eq!(tx.depth(), 2);

        collector.next_batch().await.unwrap();
        assert_eq!(tx.depth(), 0);
    }
}
