use anyhow::Result;
use axum::Router;
use energy_controller::config::Config;
use energy_controller::telemetry::{self, init_tracing};
use energy_controller::{api, controller};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    let app_state = controller::AppState::new(cfg.clone()).await?;

    let mut app: Router = api::router(app_state.clone(), &cfg);

    #[cfg(feature = "metrics")]
    {
        app = api::with_metrics(app);
    }

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting energy controller");

    let stop = CancellationToken::new();
    let site_loop = app_state.spawn_site_loop(stop.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    stop.cancel();
    if let Err(err) = site_loop.await {
        warn!(%err, "site loop task panicked");
    }

    warn!("shutdown complete");
    Ok(())
}
