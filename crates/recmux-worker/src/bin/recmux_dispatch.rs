//! Drains the intent buffer into the destination queues.

use std::time::Duration;

use tracing::{error, info};

use recmux_queue::{DispatchOutcome, Dispatcher, JobQueue, DEFAULT_QUEUE, IO_LFS_QUEUE, IO_NET_QUEUE};
use recmux_storage::FailureTracker;
use recmux_worker::init_tracing;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let poll_interval = Duration::from_millis(
        std::env::var("DISPATCH_POLL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000),
    );

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    let queues = [DEFAULT_QUEUE, IO_LFS_QUEUE, IO_NET_QUEUE].map(String::from);
    if let Err(e) = queue.init(&queues).await {
        error!("Failed to initialize queues: {}", e);
        std::process::exit(1);
    }

    let dispatcher = Dispatcher::new(queue);
    info!("Starting recmux-dispatch (poll every {:?})", poll_interval);

    let mut failures = FailureTracker::new(5);
    loop {
        let step = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            step = dispatcher.dispatch_once() => step,
        };

        let wait = match step {
            Ok(DispatchOutcome::Dispatched(queue)) => {
                failures.record_success();
                info!(queue = queue, "Dispatched intent");
                None
            }
            Ok(DispatchOutcome::Dropped) => {
                failures.record_success();
                None
            }
            Ok(DispatchOutcome::Idle) | Ok(DispatchOutcome::Throttled(_)) => {
                failures.record_success();
                Some(poll_interval)
            }
            Err(e) => {
                if failures.record_failure() {
                    error!("Dispatch failed: {}", e);
                }
                let backoff = poll_interval * failures.failure_count().min(30);
                Some(backoff)
            }
        };

        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }

    info!("Dispatcher stopped");
}
