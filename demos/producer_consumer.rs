use std::time::Duration;

use relayq::{Queue, QueueConfig};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct Thumbnail {
    image: String,
    width: u32,
}

/// Producers and consumers sharing one Redis-backed queue.
///
/// Point it at a server with `RELAYQ_ADDRESS` (and `RELAYQ_PASSWORD` if
/// needed), then start several copies to see work spread across processes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = QueueConfig::from_env("demo:thumbnails")?;
    let queue = Queue::from_config(config).await?;

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            for i in 0..20u32 {
                let job = Thumbnail {
                    image: format!("photo-{}.png", i),
                    width: 160 + i * 10,
                };
                queue.push(&job).await?;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok::<_, relayq::QueueError>(())
        })
    };

    let mut consumers = Vec::new();
    for worker in 0..3 {
        let queue = queue.clone();
        consumers.push(tokio::spawn(async move {
            let mut handled = 0u32;
            while let Some(job) = queue
                .bpop_timeout::<Thumbnail>(Duration::from_secs(2))
                .await?
            {
                println!("worker {} resized {} to {}px", worker, job.image, job.width);
                handled += 1;
            }
            Ok::<_, relayq::QueueError>(handled)
        }));
    }

    producer.await??;
    for (worker, handle) in consumers.into_iter().enumerate() {
        println!("worker {} handled {} jobs", worker, handle.await??);
    }

    let stats = queue.stats().await?;
    println!(
        "inbox={} outbox={} pushed_total={}",
        stats.inbox, stats.outbox, stats.pushed_total
    );
    Ok(())
}
