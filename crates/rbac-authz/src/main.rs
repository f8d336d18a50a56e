//! RBAC decision service.
//!
//! Usage: `rbac-authz [CONFIG]` (default `rbac.yaml`).

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use rbac_authz::{app_state, config, router};

const DEFAULT_CONFIG: &str = "rbac.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    match run(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, "rbac-authz failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &str) -> rbac_core::Result<()> {
    // Strict parsing + validate.
    let cfg = config::load_from_file(path)?;
    let listen = cfg.server.listen.parse::<SocketAddr>().map_err(|e| {
        rbac_core::RbacError::InvalidConfig(format!("server.listen: {e}"))
    })?;

    let state = app_state::AppState::new(&cfg, path)?;
    let app = router::build_router(state);

    tracing::info!(%listen, config = path, "rbac-authz starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| rbac_core::RbacError::Internal(format!("bind {listen} failed: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| rbac_core::RbacError::Internal(format!("server failed: {e}")))
}
