//! qpmetrics sidecar
//!
//! - Loads the YAML config (path from argv[1], default `qpmetrics.yaml`)
//! - Builds the metered handler chain; bad identity strings abort startup
//! - Serves until Ctrl-C, failing readiness while draining

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use qpmetrics_core::error::{QueueProxyError, Result};
use qpmetrics_proxy::{app_state, config, router};

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, "qpmetrics-proxy failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "qpmetrics.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.proxy.listen_addr()?;

    let state = app_state::AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "qpmetrics-proxy starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| QueueProxyError::Internal(format!("bind {listen} failed: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl-c handler unavailable");
            }
            state.set_draining();
            tracing::info!("draining");
        })
        .await
        .map_err(|e| QueueProxyError::Internal(format!("server failed: {e}")))
}
