use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;

use hivebox::state::AppState;
use hivebox::storage::{self, MinioStore, StorageBackend};
use hivebox::{config, logging, routes, scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::load();
    logging::init(&settings.log_level)?;

    let store: Option<Arc<dyn StorageBackend>> = match MinioStore::from_env()? {
        Some(store) => {
            let store: Arc<dyn StorageBackend> = Arc::new(store);
            if env::var("SKIP_MINIO_CHECK").is_ok() {
                tracing::info!("skipping MinIO readiness check");
            } else {
                storage::wait_until_ready(store.as_ref()).await?;
            }
            Some(store)
        }
        None => None,
    };

    let state = AppState::new(settings.clone(), store)?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let refresh_handle = tokio::spawn(scheduler::run_refresh(
        Arc::clone(&state),
        shutdown_tx.subscribe(),
    ));
    let flush_handle = tokio::spawn(scheduler::run_flush(
        Arc::clone(&state),
        shutdown_tx.subscribe(),
    ));

    let app = routes::router(Arc::clone(&state));
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");

    let mut server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, initiating shutdown");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
                term_signal.recv().await;
                tracing::info!("SIGTERM received, initiating shutdown");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Fan the shutdown signal out to all components
    let _ = shutdown_tx.send(());

    let _ = tokio::try_join!(refresh_handle, flush_handle, server_handle);

    tracing::info!("shutdown complete");
    Ok(())
}
