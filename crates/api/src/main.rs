use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gaffer_engine::service::HOSTLIST_SERVICE;
use gaffer_engine::{
    Account, AccountPool, CommandExecutor, DispatchConfig, DispatchQueue, HostListService,
    OrderManager, ServiceRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gaffer_api::auth::ApiCredentials;
use gaffer_api::config::ServerConfig;
use gaffer_api::router::build_app_router;
use gaffer_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gaffer_api=debug,gaffer_engine=debug,gaffer_db=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = gaffer_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    gaffer_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    gaffer_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    // --- Account pool ---
    let accounts = Arc::new(AccountPool::new(
        config
            .device_accounts
            .iter()
            .map(|a| Account::new(a.name.clone(), a.secret.clone()))
            .collect(),
    ));
    tracing::info!(accounts = accounts.len(), "Account pool ready");

    // --- Executor ---
    let (program, args) = config
        .executor_cmd
        .split_first()
        .expect("EXECUTOR_CMD must not be empty");
    let executor = Arc::new(CommandExecutor::new(program.clone(), args.to_vec()));
    tracing::info!(command = %program, "Executor configured");

    // --- Dispatch queue ---
    let queue = Arc::new(DispatchQueue::new(
        pool.clone(),
        Arc::clone(&accounts),
        executor,
        DispatchConfig {
            max_concurrency: config.max_concurrency,
            task_timeout: Duration::from_secs(config.task_timeout_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            log_dir: config.log_dir.clone(),
        },
    ));

    // --- Service registry ---
    let mut registry = ServiceRegistry::new();
    registry
        .register(HOSTLIST_SERVICE, Arc::new(HostListService))
        .expect("Failed to register hostlist service");
    let registry = Arc::new(registry);
    tracing::info!(services = ?registry.names(), "Service registry ready");

    // --- Order manager ---
    let manager = Arc::new(OrderManager::new(
        pool.clone(),
        registry,
        Arc::clone(&queue),
        config.recovery_policy,
        config.log_dir.clone(),
    ));

    // --- Startup recovery ---
    // Must complete before the dispatcher starts claiming so there is
    // exactly one writer over the orphaned rows.
    let report = manager.recover().await.expect("Startup recovery failed");
    tracing::info!(
        requeued = report.requeued,
        failed = report.failed,
        orders_closed = report.orders_closed,
        "Startup recovery complete"
    );

    // --- Dispatch loop ---
    let cancel = CancellationToken::new();
    let dispatcher_handle = {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.run(cancel).await })
    };
    tracing::info!("Dispatch loop started");

    // --- App state ---
    let credentials = Arc::new(ApiCredentials::from_config(&config));
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        manager,
        queue,
        credentials,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, winding down dispatcher");

    cancel.cancel();
    // The dispatch loop bounds its own wind-down by the grace period;
    // the extra margin covers the final bookkeeping writes.
    let wind_down = Duration::from_secs(config.shutdown_grace_secs + 5);
    if tokio::time::timeout(wind_down, dispatcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("Dispatcher did not stop within the grace period");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
