use crate::{
    api::routes::{get_operation, get_operations, health, submit_operation},
    config::{access_log_enabled, Settings},
    domain::{OperationStore, OperationWatcher},
    infra::db::{DatabasePoolConfig, DBConnection},
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn, LevelFilter};
use std::{
    collections::HashMap, net::SocketAddr, str::FromStr, sync::Arc, time::Duration,
};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Startup sequence is deliberately linear: storage must be ready before the
/// endpoint binds, and the worker is spawned only once the listener is
/// accepting connections. Each step is fallible and aborts the whole build.
#[derive(Debug)]
pub struct Application {
    server: Serve<TcpListener, Router, Router>,
    port: u16,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    /// `level` is the level `main` already resolved and installed the logger
    /// with; it is never re-derived from the environment here.
    pub async fn build(config: Settings, level: LevelFilter) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let socket_addr = SocketAddr::from_str(&address)?;

        // StorageReady: the schema migrator runs before anything can bind
        let store = build_store(&config).await?;

        // Serving: once bind returns, the OS is accepting connections
        let listener = TcpListener::bind(socket_addr).await?;
        let port = listener.local_addr()?.port();

        // WorkerRunning: spawned only after a successful bind, exactly once
        let tracker = TaskTracker::new();
        let cancel_token = CancellationToken::new();
        let watcher = OperationWatcher::new(
            store.clone(),
            cancel_token.clone(),
            Duration::from_secs(config.worker_settings.poll_interval_secs),
            config.worker_settings.batch_size,
        );
        let watcher_task = tracker.spawn(async move {
            match watcher.watch().await {
                Ok(_) => {
                    info!("Successfully shutdown operation watcher")
                }
                Err(e) => {
                    error!(target: "http_error", "Error in operation watcher: {}", e)
                }
            }
        });
        tracker.close();

        let mut threads = HashMap::new();
        threads.insert(String::from("operation_watcher"), watcher_task);

        let app_state = AppState {
            operation_store: store,
            background_threads: Arc::new(threads),
        };

        let server = build_server(
            listener,
            app_state,
            config.api_settings.origins,
            access_log_enabled(level),
        )?;

        Ok(Self {
            server,
            port,
            cancellation_token: cancel_token,
            background_tasks: tracker,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn background_task_count(&self) -> usize {
        self.background_tasks.len()
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background worker completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background worker timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!(target: "http_error", "Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ = tokio::time::timeout(
                    Duration::from_secs(5),
                    self.background_tasks.wait(),
                )
                .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub operation_store: OperationStore,
    pub background_threads: Arc<HashMap<String, JoinHandle<()>>>,
}

pub async fn build_store(config: &Settings) -> Result<OperationStore, anyhow::Error> {
    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();

    let operations_db = DBConnection::new(
        &config.db_settings.data_folder,
        "operations",
        pool_config,
    )
    .await
    .map_err(|e| anyhow!("Error setting up operations db: {}", e))?;

    info!("Operations store configured");
    Ok(OperationStore::new(operations_db))
}

pub fn build_server(
    listener: TcpListener,
    app_state: AppState,
    origins: Vec<String>,
    access_log: bool,
) -> Result<Serve<TcpListener, Router, Router>, anyhow::Error> {
    let socket_addr = listener.local_addr()?;

    info!("Setting up service");
    let app = app(app_state, origins, access_log);
    let server = axum::serve(listener, app);
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>, access_log: bool) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    let mut router = Router::new()
        .route("/api/v1/health_check", get(health))
        .route(
            "/api/v1/operations",
            post(submit_operation).get(get_operations),
        )
        .route("/api/v1/operations/{operation_id}", get(get_operation))
        .with_state(Arc::new(app_state));

    if access_log {
        router = router.layer(middleware::from_fn(log_request));
    }

    router.layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_access", "new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_access", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            // Fall back to ctrl-c only
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfigSerde;
    use uuid::Uuid;

    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.api_settings.domain = String::from("127.0.0.1");
        settings.api_settings.port = String::from("0");
        // Unique data folder keys the shared in-memory db per test
        settings.db_settings.data_folder = format!("./test-{}", Uuid::now_v7());
        settings.db_settings.sqlite_config = SqliteConfigSerde::testing();
        settings.worker_settings.poll_interval_secs = 1;
        settings
    }

    #[tokio::test]
    async fn test_build_spawns_exactly_one_worker() {
        let application = Application::build(test_settings(), LevelFilter::Info)
            .await
            .unwrap();

        assert_eq!(application.background_task_count(), 1);
        assert_ne!(application.port(), 0);
    }

    #[tokio::test]
    async fn test_build_with_access_logging_disabled() {
        // At error level the access-log layer is left out of the router;
        // the level is whatever the caller passed, not ambient state.
        let application = Application::build(test_settings(), LevelFilter::Error)
            .await
            .unwrap();

        assert_eq!(application.background_task_count(), 1);
    }

    #[tokio::test]
    async fn test_build_fails_when_port_is_taken() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut settings = test_settings();
        settings.api_settings.port = port.to_string();

        let err = Application::build(settings, LevelFilter::Info)
            .await
            .unwrap_err();
        assert!(
            err.to_string().to_lowercase().contains("address"),
            "unexpected bind error: {}",
            err
        );
    }

    #[tokio::test]
    async fn test_build_fails_when_storage_cannot_initialize() {
        let mut settings = test_settings();
        // File-backed mode against a path that cannot exist
        settings.db_settings.sqlite_config.mode = String::from("ReadWriteCreate");
        settings.db_settings.data_folder = String::from("/dev/null/mathops");

        let result = Application::build(settings, LevelFilter::Info).await;
        assert!(result.is_err());
    }
}
