//! Reusable charge coordinator runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: database init, migrations,
//! state recovery, the outbox writer, the reconciliation watchdog, the REST
//! and event stream API, metrics and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::{
    restore_state, AllocationEngine, Outbox, OutboxWriter, ReconciliationWatchdog,
    SharedAllocationEngine,
};
use crate::config::AppConfig;
use crate::domain::RepositoryProvider;
use crate::infrastructure::database::migrator::Migrator;
use crate::infrastructure::{init_database, DatabaseConfig, SeaOrmRepositoryProvider};
use crate::interfaces::{create_api_router, RouterDeps};
use crate::shared::shutdown::{ShutdownCoordinator, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

/// Options for starting the coordinator.
pub struct ServerOptions {
    /// Application configuration.
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running coordinator.
///
/// # Examples
///
/// ```rust,no_run
/// use charge_coordinator::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     // ... wait for shutdown signal ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// The allocation engine serving every request.
    pub engine: SharedAllocationEngine,
    /// Repository provider backing the outbox.
    pub repos: Arc<dyn RepositoryProvider>,
    /// The configuration the server was started with.
    pub config: AppConfig,
    /// Address the API is listening on.
    pub local_addr: SocketAddr,

    db: DatabaseConnection,
    shutdown: ShutdownCoordinator,
    api_task: JoinHandle<()>,
    outbox_task: JoinHandle<()>,
    watchdog_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Start the coordinator with the given options.
    ///
    /// This will:
    /// 1. Install Prometheus metrics recorder
    /// 2. Connect to database and run migrations
    /// 3. Rebuild in-memory state from storage
    /// 4. Start the outbox writer and reconciliation watchdog
    /// 5. Start REST API server (with Swagger UI and the event stream)
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting charge coordinator...");

        // ── Prometheus metrics recorder ────────────────────────
        // The global recorder can only be installed once per process;
        // a restart within the same process reuses it.
        use std::sync::OnceLock;
        static PROM_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
            OnceLock::new();

        let prometheus_handle = PROM_HANDLE
            .get_or_init(|| {
                let h = metrics_exporter_prometheus::PrometheusBuilder::new()
                    .install_recorder()
                    .expect("Failed to install Prometheus metrics recorder");
                info!("📊 Prometheus metrics recorder installed");
                h
            })
            .clone();

        // ── Database ───────────────────────────────────────────
        let db_config = DatabaseConfig {
            url: app_cfg.database.connection_url(),
        };
        let db = init_database(&db_config).await?;

        if opts.auto_migrate {
            info!("Running database migrations...");
            Migrator::up(&db, None).await?;
            info!("Migrations completed");
        }

        let repos: Arc<dyn RepositoryProvider> =
            Arc::new(SeaOrmRepositoryProvider::new(db.clone()));

        // ── Engine & recovery ──────────────────────────────────
        let (outbox, outbox_rx) = Outbox::channel();
        let engine: SharedAllocationEngine = Arc::new(
            AllocationEngine::assemble(
                app_cfg.allocation.clone(),
                app_cfg.broadcaster.clone(),
                outbox,
            )
            .with_archive(repos.clone()),
        );

        let report = restore_state(repos.as_ref(), &engine).await?;
        info!(
            stations = report.stations,
            ports = report.ports,
            open_sessions = report.open_sessions,
            orphaned = report.orphaned_sessions,
            faulted = report.faulted_ports,
            "♻️ State restored from storage"
        );

        // ── Shutdown coordinator ───────────────────────────────
        let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);
        let shutdown_signal = shutdown.signal();

        // ── Background tasks ───────────────────────────────────
        // Started after recovery so the records it produced are drained first.
        let outbox_task = OutboxWriter::new(repos.clone(), outbox_rx)
            .evicting(engine.ledger().clone())
            .start(shutdown_signal.clone());

        let watchdog_task = if app_cfg.watchdog.enabled {
            let watchdog = Arc::new(ReconciliationWatchdog::new(
                engine.clone(),
                app_cfg.watchdog.clone(),
            ));
            Some(watchdog.start(shutdown_signal.clone()))
        } else {
            warn!("Reconciliation watchdog disabled; stuck ports will not recover");
            None
        };

        // ── REST API server ────────────────────────────────────
        let api_router = create_api_router(RouterDeps {
            engine: engine.clone(),
            db: Some(db.clone()),
            metrics: Some(prometheus_handle),
        });

        let api_addr = format!("{}:{}", app_cfg.server.api_host, app_cfg.server.api_port);
        let listener = tokio::net::TcpListener::bind(&api_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("REST API server listening on http://{}", local_addr);
        info!("Swagger UI available at http://{}/docs/", local_addr);

        let api_shutdown = shutdown_signal.clone();
        let broadcaster = engine.broadcaster().clone();
        let api_server = axum::serve(
            listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            // Open event streams would otherwise hold the server open.
            broadcaster.close_all();
            info!("🛑 REST API server received shutdown signal");
        });

        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!("REST API server error: {}", e);
            }
        });

        info!("🚀 Charge coordinator started.");

        Ok(Self {
            engine,
            repos,
            config: app_cfg,
            local_addr,
            db,
            shutdown,
            api_task,
            outbox_task,
            watchdog_task,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    ///
    /// Call [`ServerHandle::wait`] to block until everything has stopped.
    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for the server to fully stop after shutdown has been triggered.
    pub async fn wait(self) {
        info!("⏳ Waiting for server tasks to complete...");
        let timeout = Duration::from_secs(self.config.server.shutdown_timeout);

        match tokio::time::timeout(timeout, self.api_task).await {
            Ok(Ok(())) => info!("REST API server stopped"),
            Ok(Err(e)) => error!("REST API server task panicked: {}", e),
            Err(_) => warn!("REST API server did not stop within {:?}", timeout),
        }

        if let Some(task) = self.watchdog_task {
            if let Err(e) = task.await {
                error!("Watchdog task panicked: {}", e);
            }
        }

        // The writer flushes what is queued before it exits.
        match tokio::time::timeout(timeout, self.outbox_task).await {
            Ok(Ok(())) => info!("Outbox writer drained"),
            Ok(Err(e)) => error!("Outbox writer task panicked: {}", e),
            Err(_) => warn!("Outbox writer did not drain within {:?}", timeout),
        }

        if let Err(e) = self.db.close().await {
            warn!("Error closing database connection: {}", e);
        } else {
            info!("✅ Database connection closed");
        }

        info!("👋 Charge coordinator shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down charge coordinator...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Check if the server is still running.
    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`ServerHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
