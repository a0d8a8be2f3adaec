use std::path::Path;

use recmux_storage::{create_accessor, BackendType, BackendsFile};
use recmux_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with tmp_dir={} base_dir={}",
        config.tmp_dir.display(),
        config.base_dir.display()
    );
    ensure_dir(&config.tmp_dir).await?;
    ensure_dir(&config.complete_dir()).await?;
    ensure_ffmpeg()?;
    ensure_env_present(&["REDIS_URL", "WORKER_QUEUES"])?;
    if config.is_prod() {
        ensure_env_present(&["NOTIFIER_ENDPOINT", "NOTIFIER_API_KEY"])?;
    }
    check_backends(&config).await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    let path = recmux_media::check_ffmpeg()?;
    println!("worker-selfcheck: ffmpeg at {}", path.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

/// Every declared backend must resolve; object stores must answer.
async fn check_backends(config: &WorkerConfig) -> anyhow::Result<()> {
    let backends = match &config.backends_path {
        Some(path) => BackendsFile::load(path).await?,
        None => BackendsFile::local_only(),
    };

    for backend in &backends.configs {
        create_accessor(&backend.name, &backends, &config.accessor_settings())?;
        if backend.backend_type == BackendType::S3 {
            if let Some(s3) = backend.s3.clone() {
                recmux_storage::ObjectStoreClient::new(s3, config.transfer.clone())?
                    .check_connectivity()
                    .await?;
            }
        }
        println!("worker-selfcheck: backend {} ok", backend.name);
    }
    Ok(())
}
