//! Node lifecycle: open the store, start the sync engine, serve the API,
//! shut everything down in order.

use crate::api::{create_router, AppState};
use crate::config::{ConfigError, NodeConfig, StorageBackend, StorageSettings};
use crate::observability::MetricsState;
use rescache_storage::{BlockStore, MemoryBlockStore, StorageError};
use rescache_sync::{SyncEngine, SyncError, SyncEvent};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Errors that stop the node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The block store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The sync engine failed to start or stop.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Binding or serving the API failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured storage backend was not compiled in.
    #[error("storage backend {0:?} is not available in this build")]
    BackendUnavailable(StorageBackend),
}

/// Opens the configured block store. The store is connected later by the
/// engine.
pub fn open_store(settings: &StorageSettings) -> Result<Arc<dyn BlockStore>, NodeError> {
    match settings.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryBlockStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            std::fs::create_dir_all(&settings.path)?;
            Ok(Arc::new(rescache_storage::RocksDbBlockStore::at_path(
                &settings.path,
            )))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => Err(NodeError::BackendUnavailable(StorageBackend::Rocksdb)),
    }
}

/// Feeds engine events into the metrics until the engine closes.
pub fn spawn_event_recorder(
    mut events: broadcast::Receiver<SyncEvent>,
    metrics: MetricsState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    metrics.record_event(&event);
                    if event == SyncEvent::Closed {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Metrics recorder lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Runs the node until `shutdown` resolves.
///
/// The API starts listening before the initial backfill so health probes
/// answer while the mirror catches up. On shutdown the API drains first, then
/// the engine closes.
pub async fn run<F>(config: NodeConfig, shutdown: F) -> Result<(), NodeError>
where
    F: Future<Output = ()> + Send,
{
    config.validate()?;

    let store = open_store(&config.storage)?;
    let engine = Arc::new(SyncEngine::new(
        config.ledger.clone(),
        config.sync.clone(),
        store.clone(),
        None,
    )?);

    let metrics = MetricsState::new();
    let recorder = spawn_event_recorder(engine.subscribe(), metrics.clone());
    let state = AppState::new(engine.clone(), store, metrics);
    let health = state.health.clone();

    let listener = TcpListener::bind(config.api.listen_addr).await?;
    info!(addr = %listener.local_addr()?, "API listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, create_router(state))
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::pin!(shutdown);

    let started = tokio::select! {
        result = engine.initialize() => Some(result),
        _ = &mut shutdown => None,
    };

    let outcome: Result<(), NodeError> = match started {
        Some(Ok(())) => {
            health.set_startup_complete(true);
            info!(cursor = engine.cursor(), "Node is ready");
            shutdown.await;
            Ok(())
        }
        Some(Err(e)) => {
            error!(error = %e, "Failed to start sync engine");
            Err(e.into())
        }
        None => Ok(()),
    };

    info!("Shutting down");
    let _ = stop_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "API server stopped with an error"),
        Err(e) => warn!(error = %e, "API server task failed"),
    }

    let closed = engine.close().await;
    if let Err(e) = recorder.await {
        warn!(error = %e, "Metrics recorder task failed");
    }
    info!("Node stopped");

    outcome.and(closed.map_err(Into::into))
}
