//! Transport listeners
//!
//! Two accept loops run concurrently: a TCP stream socket and a local
//! Unix-domain byte stream standing in for the platform-native named
//! channel (capped at four concurrent instances). Each accepted
//! connection gets its own handler task reading with a fixed buffer into
//! the line framer; a disconnected peer ends its handler and the listener
//! keeps accepting. A process-wide watch signal unblocks every accept and
//! read for shutdown; handlers finish the frames already read, then exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::batcher::IngestSender;
use crate::codec::{decode_frame, LineFramer};
use crate::metrics::MetricsHub;
use types::errors::ParseError;
use types::message::now_ms;

/// Concurrent local-endpoint connection instances.
pub const MAX_LOCAL_INSTANCES: usize = 4;

/// Live-connection registry for diagnostics.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<u64, String>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, peer: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(id, peer);
        id
    }

    fn unregister(&self, id: u64) {
        self.connections.remove(&id);
    }

    /// Connections currently being served, both transports.
    pub fn active(&self) -> usize {
        self.connections.len()
    }
}

/// Everything a connection handler needs; cheap to clone per accept.
#[derive(Clone)]
pub struct HandlerContext {
    pub sender: IngestSender,
    pub metrics: Arc<MetricsHub>,
    pub registry: Arc<ConnectionRegistry>,
    pub buffer_size: usize,
}

/// Accept TCP connections until the shutdown signal flips.
pub async fn run_tcp_listener(
    listener: TcpListener,
    ctx: HandlerContext,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(addr = ?listener.local_addr().ok(), "tcp listener accepting");
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = ctx.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, format!("tcp:{}", peer), ctx, shutdown).await;
                    });
                }
                Err(e) => warn!(error = %e, "tcp accept failed"),
            },
            changed = shutdown.changed() => {
                // A dropped sender means the engine is gone; stop either way
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("tcp listener stopped");
}

/// Accept local byte-stream connections, at most [`MAX_LOCAL_INSTANCES`]
/// concurrently; further peers queue on the instance permits.
pub async fn run_local_listener(
    listener: UnixListener,
    ctx: HandlerContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let instances = Arc::new(Semaphore::new(MAX_LOCAL_INSTANCES));
    info!(addr = ?listener.local_addr().ok(), "local listener accepting");
    loop {
        let permit = tokio::select! {
            permit = instances.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let ctx = ctx.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        let _instance = permit;
                        handle_connection(stream, "local".to_string(), ctx, shutdown).await;
                    });
                }
                Err(e) => warn!(error = %e, "local accept failed"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("local listener stopped");
}

/// Read loop for one connection: fixed-size reads feed the framer, every
/// decoded message is stamped with `receive_ts` and pushed to the ingest
/// channel (blocking on backpressure).
pub(crate) async fn handle_connection<S>(
    mut stream: S,
    peer: String,
    ctx: HandlerContext,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + Unpin,
{
    let conn_id = ctx.registry.register(peer.clone());
    debug!(peer = %peer, conn_id, "connection opened");

    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; ctx.buffer_size.max(1)];

    'outer: loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(peer = %peer, conn_id, "peer disconnected");
                    break;
                }
                Ok(n) => {
                    for line in framer.push(&buf[..n]) {
                        match decode_frame(&line) {
                            Ok(mut msg) => {
                                msg.timing.receive_ms = now_ms();
                                if ctx.sender.send(msg).await.is_err() {
                                    // Consumer gone: the engine is shutting down.
                                    break 'outer;
                                }
                            }
                            // Blank keep-alive lines are not defects
                            Err(ParseError::EmptyFrame) => {}
                            Err(e) => {
                                ctx.metrics.incr_parse_errors();
                                warn!(peer = %peer, error = %e, "dropping malformed frame");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, conn_id, error = %e, "read failed; closing connection");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    ctx.registry.unregister(conn_id);
    debug!(peer = %peer, conn_id, "connection closed");
}
