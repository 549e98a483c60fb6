//! Push a few tasks through a spool directory and drain them with a worker

use std::sync::Arc;
use std::time::Duration;

use surfsense_core::{HandlerRegistry, SpoolBroker, Task, TaskBroker, TaskWorker, WorkerConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let broker = Arc::new(SpoolBroker::open(dir.path()).await?);

    println!("=== SurfSense Spool Example ===\n");
    println!("Spool: {}", broker.root().display());

    for _ in 0..3 {
        let id = broker.enqueue(Task::new("maintenance.heartbeat")).await?;
        println!("Enqueued heartbeat {}", id);
    }
    broker.enqueue(Task::new("documents.reindex")).await?;
    println!("\nBefore: {:?}", broker.stats().await?);

    let worker = TaskWorker::new(
        broker.clone(),
        HandlerRegistry::with_builtins(),
        WorkerConfig {
            poll_interval: Duration::from_millis(50),
            ..WorkerConfig::default()
        },
    );
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        stop.cancel();
    });

    let stats = worker.run(shutdown).await;
    println!("After:  {:?}", broker.stats().await?);
    println!("\nWorker: {:?}", stats);
    // documents.reindex has no handler, so it lands in failed/

    Ok(())
}
