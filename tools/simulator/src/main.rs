use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

use simulator::generator::{DataSimulator, SimulatorConfig};
use types::message::now_ms;

/// Stream generated frames at the ingest engine over TCP.
///
/// Usage: `simulator [addr] [count] [rate_per_sec] [seed]`
/// Defaults: `127.0.0.1:9999 10000 1000 42`.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:9999".to_string());
    let count: u64 = args.next().map(|v| v.parse()).transpose()?.unwrap_or(10_000);
    let rate: u64 = args.next().map(|v| v.parse()).transpose()?.unwrap_or(1_000);
    let seed: u64 = args.next().map(|v| v.parse()).transpose()?.unwrap_or(42);

    let mut sim = DataSimulator::new(SimulatorConfig {
        seed,
        start_ts_ms: now_ms(),
        ..SimulatorConfig::default()
    });

    info!(addr = %addr, count, rate, seed, "connecting to ingest engine");
    let mut stream = TcpStream::connect(&addr).await?;

    // Pace in 10 ms slices to hold the target rate without a timer per frame
    let slice = Duration::from_millis(10);
    let per_slice = (rate / 100).max(1);
    let mut sent = 0u64;

    while sent < count {
        for _ in 0..per_slice.min(count - sent) {
            let frame = sim.next_frame();
            stream.write_all(frame.as_bytes()).await?;
            sent += 1;
        }
        tokio::time::sleep(slice).await;
    }
    stream.flush().await?;

    info!(sent, "stream complete");
    Ok(())
}
