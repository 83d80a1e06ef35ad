use std::net::SocketAddr;
use std::sync::Arc;

use beach_sonar::config::AppConfig;
use beach_sonar::peer::WebRtcPeerFactory;
use beach_sonar::routes::{build_router, AppState};
use beach_sonar::telemetry::logging;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let cfg = AppConfig::from_env();
    logging::init(&cfg.log_config())?;
    if let Err(err) = dotenv {
        if !err.not_found() {
            warn!(error = %err, "failed to load .env");
        }
    }

    let ice_servers = cfg.ice_server_urls();
    let factory = WebRtcPeerFactory::new(ice_servers.clone())?;
    let state = AppState::new(Arc::new(factory), cfg.session_settings());
    let app = build_router(state);

    let addr: SocketAddr = cfg.bind_addr.parse()?;
    info!(
        ice_servers = ?ice_servers,
        candidate_policy = ?cfg.candidate_policy,
        "Starting Beach Sonar on {addr}"
    );
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
