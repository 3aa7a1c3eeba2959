use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;

use thiings_server::{router, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let raw_addr = env::var("PROXY_ADDR").unwrap_or_else(|_| "127.0.0.1:9200".to_string());
    let addr: SocketAddr = match raw_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid PROXY_ADDR {raw_addr:?}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let user_agent = concat!("thiings-server/", env!("CARGO_PKG_VERSION"));
    let state = match AppState::new(user_agent) {
        Ok(state) => state,
        Err(err) => {
            error!("failed to build HTTP client: {err}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!("image proxy listening on http://{addr}");
    if let Err(err) = axum::serve(listener, router(state)).await {
        error!("server error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
