pub mod allow_list;
pub mod proxy;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use proxy::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/healthz", get(proxy::healthz))
        .route("/api/image-proxy", get(proxy::image_proxy))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
