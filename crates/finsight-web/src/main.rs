use std::process::ExitCode;
use std::sync::Arc;

use finsight_core::{FinsightConfig, SimulatorConfig};
use finsight_ml::PredictionService;
use finsight_web::{app, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = FinsightConfig::from_env();
    let service = PredictionService::from_config(&config)
        .map_err(|e| format!("failed to start prediction service: {e}"))?;

    let state = AppState::new(
        service,
        SimulatorConfig {
            interval: config.sim_interval,
            degraded_after: config.sim_degraded_after,
            ..SimulatorConfig::default()
        },
    );
    for symbol in &config.sim_symbols {
        state.pin_feed(symbol);
    }
    let reaper = state.spawn_feed_reaper();

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind {addr}: {e}"))?;
    info!("finsight listening on http://{addr}");

    axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))?;

    reaper.abort();
    state.stop_feeds().await;
    info!("price feeds stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, stopping");
}
