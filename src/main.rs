use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod forecast;
mod refresh;
mod render;
mod routes;

use cache::ForecastCache;
use config::Config;
use render::PageSettings;
use routes::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rain_forecast_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration problems are fatal before any network call
    let config = Config::from_env()?;
    tracing::info!(
        "Forecasting {} at {:.4},{:.4} via {:?} ({})",
        config.horizon,
        config.latitude,
        config.longitude,
        config.provider,
        config.timezone.name()
    );

    let source = forecast::build_source(&config)?;
    let cache = Arc::new(ForecastCache::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = tokio::spawn(refresh::run_refresher(
        source.clone(),
        cache.clone(),
        config.refresh_interval,
        shutdown_rx,
    ));

    let state = AppState {
        cache,
        source,
        page: Arc::new(PageSettings::from_config(&config)),
    };

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    refresher.await?;
    tracing::info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("Shutdown signal received");
}
