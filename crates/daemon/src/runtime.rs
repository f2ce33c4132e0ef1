// Standalone daemon runtime: socket serving with broadcast shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::rpc::http;
use crate::rpc::methods::RpcServerState;
use crate::rpc::unix::serve_unix_until_shutdown;
use crate::service::DocumentEditingService;
use crate::startup::{bind_socket, remove_pid_file, write_pid_file, DaemonPaths};

pub async fn run_standalone() -> Result<()> {
    run_standalone_with(DaemonPaths::resolve()?, GlobalConfig::load()).await
}

async fn run_standalone_with(paths: DaemonPaths, config: GlobalConfig) -> Result<()> {
    let service = Arc::new(
        DocumentEditingService::open(&paths.base_dir, &config)
            .context("failed to open daemon state stores")?,
    );

    let listener = bind_socket(&paths.socket_path).await?;
    write_pid_file(&paths.pid_path)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let state = RpcServerState::new(service).with_shutdown_notifier(shutdown_tx.clone());

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = ctrl_c_tx.send(());
    });

    if let Some(listen_addr) = &config.http.listen_addr {
        let tcp_listener = tokio::net::TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("failed to bind http facade on `{listen_addr}`"))?;
        let http_state = state.clone();
        tokio::spawn(async move {
            if let Err(error) = http::serve(tcp_listener, http_state).await {
                warn!(?error, "http facade terminated unexpectedly");
            }
        });
        info!(listen_addr, "http facade listening");
    }

    info!(socket_path = %paths.socket_path.display(), "standalone daemon started");
    let result = serve_unix_until_shutdown(listener, state, shutdown_rx).await;
    cleanup_paths(&paths);
    result.context("standalone daemon exited with error")
}

fn cleanup_paths(paths: &DaemonPaths) {
    remove_pid_file(&paths.pid_path);
    let _ = std::fs::remove_file(&paths.socket_path);
}
