//! Object store server executable.

use anyhow::{Context, Result};
use os_01_block_registry::MmapRegionProvider;
use os_02_object_directory::{ControlPlaneHandler, ObjectStore};
use store_runtime::{ControlPlaneServer, DirectoryLock, RuntimeConfig, SocketServer};
use store_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("initializing telemetry")?;
    let config = RuntimeConfig::from_env().context("reading configuration")?;

    std::fs::create_dir_all(&config.shm_dir)
        .with_context(|| format!("creating {}", config.shm_dir.display()))?;
    let lock = DirectoryLock::acquire(&config.shm_dir).context("locking region directory")?;

    let regions = MmapRegionProvider::new(&config.shm_dir).context("opening region directory")?;
    let store = ObjectStore::with_regions(regions, config.pool.clone())
        .context("building object store")?;
    let (server, task) =
        ControlPlaneServer::spawn(ControlPlaneHandler::new(store), config.request_queue);
    let socket = SocketServer::bind(&config.socket_path, server.clone())
        .with_context(|| format!("binding {}", config.socket_path.display()))?
        .spawn();

    info!(
        shm_dir = %config.shm_dir.display(),
        socket = %config.socket_path.display(),
        pid = lock.pid(),
        min_class = config.pool.min_class_size,
        max_block = config.pool.max_block_size,
        "object store ready. Press Ctrl+C to stop."
    );
    tokio::signal::ctrl_c().await?;

    info!("initiating shutdown");
    let destroyed = server.shutdown().await.context("stopping server")?;
    task.await.context("joining server task")?;
    socket.await.context("joining socket task")?;

    if let Ok(metrics) = store_telemetry::encode_metrics() {
        debug!(%metrics, "final metrics");
    }
    info!(destroyed, "shutdown complete");
    Ok(())
}
