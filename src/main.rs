use courtside::{app, config::Config, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courtside=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting Courtside server on {}", addr);

    let state = AppState::build(config)?;
    info!(
        "Loaded {} players, price tick every {:?}",
        state.registry.len(),
        state.config.simulation.tick_interval
    );

    // Start the simulation and the price fan-out
    let fanout = state.start();

    let router = app(state.clone());

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Courtside server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.stop();
    fanout.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
