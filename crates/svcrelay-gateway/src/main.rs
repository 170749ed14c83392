//! svcrelay gateway binary.
//!
//! - WebSocket endpoint: /v1/rpc?user=...
//! - Binary frames carry correlation-keyed invocation envelopes
//! - Tracing span per connection
//! - Heartbeat ping + idle timeout

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use svcrelay_gateway::{app_state, config, router};

const DEFAULT_CONFIG_PATH: &str = "svcrelay.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    match run(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "svcrelay-gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_from_file(config_path)?;
    let listen: SocketAddr = cfg.gateway.listen.parse()?;

    let state = app_state::AppState::new(cfg)?;
    let app = router::build_router(state);

    tracing::info!(%listen, "svcrelay-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
