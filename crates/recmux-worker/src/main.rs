//! Recording reconciliation worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};

use recmux_queue::{JobQueue, QueueConfig, RedisStatusRepository};
use recmux_worker::{init_tracing, metrics, JobExecutor, WorkerConfig, WorkerContext};

#[tokio::main]
async fn main() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting recmux-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Serving metrics on port {}", port),
            Err(e) => warn!("Metrics disabled: {}", e),
        }
    }

    let queue_config = QueueConfig::from_env();
    let status_client = match redis::Client::open(queue_config.redis_url.as_str()) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid REDIS_URL: {}", e);
            std::process::exit(1);
        }
    };
    let status = Arc::new(RedisStatusRepository::new(
        status_client,
        queue_config.status_key_prefix.clone(),
        queue_config.status_ttl,
    ));

    let queue = match JobQueue::new(queue_config) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match WorkerContext::from_config(config, status).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to build worker context: {}", e);
            std::process::exit(1);
        }
    };

    let executor = JobExecutor::new(queue, ctx);

    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown.send(true);
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
