mod analyst;
mod config;
mod engine;
mod errors;
mod feeds;
mod models;
mod risk;
mod server;
mod state;

use crate::engine::SessionHandle;
use crate::feeds::PriceFeed;
use crate::state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("ether_hedge starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        asset = %cfg.asset_symbol,
        strike = cfg.strike,
        sigma = cfg.volatility,
        rate = cfg.risk_free_rate,
        expiry_years = cfg.expiry_years,
        position = cfg.position_contracts,
        poll_ms = cfg.poll_interval_ms,
        "session configured"
    );

    let app_state = AppState::new(cfg.clone());
    let feed = Arc::new(PriceFeed::from_config(&cfg));
    let risk_analyst = analyst::from_config(&cfg);

    // Engine task: bootstrap, then polling + analysis until shutdown
    let session = SessionHandle::spawn(Arc::clone(&app_state), feed, risk_analyst);

    let app = server::router(Arc::clone(&app_state));
    let addr = format!("0.0.0.0:{}", cfg.server_port);
    tracing::info!("server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("bind error: {e}");
            let _ = session.shutdown().await;
            std::process::exit(1);
        }
    };

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("ctrl-c handler error: {e}");
        }
        tracing::info!("shutdown signal received");
    });

    if let Err(e) = serve.await {
        tracing::error!("server error: {e}");
    }

    if let Err(e) = session.shutdown().await {
        tracing::warn!("session shutdown: {e}");
    }
    tracing::info!("ether_hedge stopped");
}
