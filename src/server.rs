use axum::{
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::api::{self, AppState};
use crate::cluster::HttpCluster;
use crate::config::Config;
use crate::database::Database;
use crate::error::SnapSchedError;
use crate::snapshot::{cleanup_all_enabled_schedules, execute_all_enabled_schedules};

pub struct WebServer {
    host: String,
    port: u16,
}

impl WebServer {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    pub async fn start(&self) -> Result<(), SnapSchedError> {
        let config = Config::get();
        let cluster = HttpCluster::new(&config.cluster, config.snapshots.partial)?;
        let app_state = AppState::new(
            Arc::new(cluster),
            config.snapshots,
            config.scheduler.execution_timeout(),
        );

        let app = Self::create_router(app_state.clone());

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| SnapSchedError::Error(format!("Invalid address: {}", e)))?;

        println!("snapsched server starting on http://{}", addr);
        println!("   Cluster: {}", config.cluster.url);

        // Create shutdown channel for background tasks
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        if config.scheduler.enabled {
            let sweep_interval = config.scheduler.sweep_interval();
            let shutdown_rx = shutdown_tx.subscribe();
            let sweep_state = app_state.clone();
            tokio::spawn(async move {
                println!(
                    "   Starting background sweep (every {} seconds)",
                    sweep_interval.as_secs()
                );
                let mut interval = tokio::time::interval(sweep_interval);
                let mut shutdown_rx = shutdown_rx;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            run_sweep(&sweep_state).await;
                        }
                        _ = shutdown_rx.recv() => {
                            log::info!("Background sweep shutting down gracefully");
                            println!("   Background sweep stopped");
                            break;
                        }
                    }
                }
            });
        } else {
            log::info!("Background sweep disabled by configuration");
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SnapSchedError::Error(format!("Failed to bind to {}: {}", addr, e)))?;

        // Set up graceful shutdown handling
        let shutdown_signal = shutdown_signal();

        log::info!("Server ready to handle requests");

        // Start the server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal.await;
                log::info!("Shutdown signal received, stopping background tasks...");
                println!("\nShutdown signal received - stopping server gracefully...");

                // Signal background tasks to stop
                let _ = shutdown_tx.send(());

                // Give background tasks a moment to finish
                tokio::time::sleep(Duration::from_secs(2)).await;

                log::info!("Server shutdown complete");
                println!("   Server stopped");
            })
            .await
            .map_err(|e| SnapSchedError::Error(format!("Server error: {}", e)))?;

        Ok(())
    }

    fn create_router(app_state: AppState) -> Router {
        Router::new()
            // Health check
            .route("/health", get(health_check))
            // Index endpoints
            .route("/api/indices", get(api::indices::list_indices))
            .route("/api/indices/resolve", get(api::indices::resolve_pattern))
            // Schedule endpoints
            .route(
                "/api/snapshot-schedules",
                get(api::snapshot_schedules::list_schedules)
                    .post(api::snapshot_schedules::create_schedule),
            )
            .route(
                "/api/snapshot-schedules/execute-all",
                post(api::snapshot_schedules::execute_all),
            )
            .route(
                "/api/snapshot-schedules/{id}",
                get(api::snapshot_schedules::get_schedule)
                    .patch(api::snapshot_schedules::update_schedule)
                    .delete(api::snapshot_schedules::delete_schedule),
            )
            .route(
                "/api/snapshot-schedules/{id}/toggle",
                patch(api::snapshot_schedules::toggle_schedule),
            )
            .route(
                "/api/snapshot-schedules/{id}/plan",
                get(api::snapshot_schedules::plan_schedule),
            )
            .route(
                "/api/snapshot-schedules/{id}/execute",
                post(api::snapshot_schedules::execute_schedule),
            )
            .route(
                "/api/snapshot-schedules/{id}/cleanup",
                post(api::snapshot_schedules::cleanup_schedule),
            )
            .route(
                "/api/snapshot-schedules/{id}/executions",
                get(api::snapshot_schedules::list_executions),
            )
            // Add state for handlers
            .with_state(app_state)
    }
}

/// One background pass: execute every enabled schedule, then apply retention
async fn run_sweep(state: &AppState) {
    let mut conn = match Database::get_connection() {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Background sweep: failed to get database connection: {}", e);
            return;
        }
    };

    let _guard = state.run_lock.lock().await;

    if let Err(e) = execute_all_enabled_schedules(
        state.cluster.as_ref(),
        &mut conn,
        &state.snapshot_options,
        state.execution_timeout,
    )
    .await
    {
        log::error!("Background sweep: executing schedules failed: {}", e);
    }

    if let Err(e) = cleanup_all_enabled_schedules(state.cluster.as_ref(), &mut conn).await {
        log::error!("Background sweep: retention failed: {}", e);
    }
}

async fn health_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Waits for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received SIGINT (Ctrl+C)");
        },
        _ = terminate => {
            log::info!("Received SIGTERM");
        },
    }
}
