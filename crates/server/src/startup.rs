use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use common::env::{ensure_data_dirs, worker_name};
use common::utils::logging::{init_logging, LogFormat};
use configs::AppConfig;
use service::directory::{DirectoryService, DirectoryStore};
use service::storage::{csv_store::is_sentinel, CsvRecordStore, StoreConfig};
use tracing::{error, info};

use crate::auth::ServerState;
use crate::errors::StartupError;
use crate::metrics::Metrics;
use crate::routes;

/// Assemble handler state around any directory store.
pub fn build_state(
    store: Arc<dyn DirectoryStore>,
    api_key: &str,
    version: &str,
) -> Result<ServerState, StartupError> {
    let metrics = Metrics::new().map_err(|e| StartupError::InvalidConfig(format!("metrics registry: {e}")))?;
    Ok(ServerState {
        directory: DirectoryService::new(store),
        api_key: Arc::from(api_key),
        version: Arc::from(version),
        worker: Arc::from(worker_name()),
        metrics: Arc::new(metrics),
    })
}

fn bind_addr(cfg: &AppConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("bind address {}:{}: {e}", cfg.server.host, cfg.server.port)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
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
    info!("shutdown signal received");
}

/// Public entry: load the tables, build the app and serve until a shutdown signal.
/// Expects an already validated configuration.
pub async fn run(cfg: AppConfig, version: &str) -> Result<(), StartupError> {
    init_logging(LogFormat::from_name(&cfg.logging.format));

    let store_cfg = StoreConfig::from(&cfg.storage);
    ensure_data_dirs(&[&store_cfg.users_file, &store_cfg.roles_file], is_sentinel).await?;

    let store = Arc::new(CsvRecordStore::new(store_cfg));
    store.warm_up().await?;
    info!(
        users = %store.config().users_file.display(),
        roles = %store.config().roles_file.display(),
        "tables loaded"
    );

    let state = build_state(store, &cfg.auth.api_key, version)?;
    let app: Router = routes::build_router(state, routes::build_cors());

    let addr = bind_addr(&cfg)?;
    info!(%addr, version, "starting userapi server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Any(anyhow::anyhow!("cannot bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Any(e.into()))?;
    info!("server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_rejects_bad_host() {
        let mut cfg = AppConfig::default();
        assert!(bind_addr(&cfg).is_ok());
        cfg.server.host = "not a host".into();
        assert!(matches!(bind_addr(&cfg), Err(StartupError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn run_fails_when_users_file_is_unreadable() {
        let mut cfg = AppConfig::default();
        // a directory cannot be read as a table
        cfg.storage.users_file = std::env::temp_dir().to_string_lossy().into_owned();
        cfg.storage.roles_file = configs::NO_PERSISTENCE.into();
        cfg.server.port = 0;
        assert!(matches!(run(cfg, "test").await, Err(StartupError::Store(_))));
    }
}
