use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multiscreen_relay::codes::{start_code_rotation, unix_now, CodeLifecycleManager};
use multiscreen_relay::{api, bus, config::Config, expiration, storage, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
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

    info!(version = env!("CARGO_PKG_VERSION"), "multiscreen-relay starting");

    // Load configuration
    let config = Config::load()?;

    // Resolve store and bus backends
    let store = storage::open_store(&config.server.database_uri)?;
    let bus = bus::open_bus(&config.server.publisher_uri)?;

    let state = Arc::new(AppState::new(config.clone(), store, bus));

    // Make sure a code is showing before controllers can connect
    let active = CodeLifecycleManager::from_state(&state)
        .startup(unix_now())
        .await?;
    info!(code = %active.code, expires = active.expires, "Access code ready");

    // Start background tasks
    let rotation_handle = start_code_rotation(Arc::clone(&state));
    let expiration_handle = expiration::start_expiration_cleaner(Arc::clone(&state));

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            // server exited on its own
            state.shutdown.cancel();
            result??;
            return Ok(());
        }
    }

    // Stop accepting, cancel connections and background tasks
    state.shutdown.cancel();

    let grace = config.server.shutdown_grace();
    match tokio::time::timeout(grace, &mut server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed during shutdown"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task failed"),
        Err(_) => {
            warn!(grace = ?grace, "Connections did not drain in time, aborting server");
            server.abort();
        }
    }

    info!("Shutting down background tasks");
    for handle in [rotation_handle, expiration_handle] {
        if let Err(e) = handle.await {
            error!(error = %e, "Background task failed");
        }
    }

    if let Err(e) = state.bus.close().await {
        error!(error = %e, "Failed to close event bus");
    }

    info!("Shutdown complete");
    Ok(())
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
