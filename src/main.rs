use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_converter::{
    api,
    config::Config,
    conversion::Executor,
    lifecycle::FileLifecycleManager,
    session::InMemorySessionStore,
    store::FileStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "file-converter starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize stores
    let uploads = FileStore::new(&config.storage.upload_dir)?;
    let outputs = FileStore::new(&config.storage.output_dir)?;
    info!(
        uploads = %config.storage.upload_dir.display(),
        outputs = %config.storage.output_dir.display(),
        "Stores opened"
    );

    let files = FileLifecycleManager::new(
        uploads,
        outputs,
        Arc::new(InMemorySessionStore::new()),
        Arc::new(Executor::new(config.tools.clone())),
    );

    // Reclaim anything left over from a previous run
    files.discard_abandoned().await?;
    let retention = Duration::from_secs(config.storage.retention_seconds);
    let stats = files.sweep(retention).await?;
    info!(
        uploads = stats.uploads,
        outputs = stats.outputs,
        retention_seconds = config.storage.retention_seconds,
        "Startup sweep complete"
    );

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        files,
    });

    let sweeper = (config.storage.sweep_interval_seconds > 0).then(|| {
        tokio::spawn(periodic_sweep(
            Arc::clone(&state),
            Duration::from_secs(config.storage.sweep_interval_seconds),
            retention,
        ))
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup: abort background tasks
    if let Some(handle) = sweeper {
        info!("Shutting down background sweep");
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn periodic_sweep(state: Arc<AppState>, every: Duration, retention: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick fires immediately and the startup sweep already ran
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = state.files.sweep(retention).await {
            tracing::warn!(error = %e, "Periodic sweep failed");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
