pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod inference;
pub mod model;
pub mod preview;
pub mod prompts;
pub mod storage;
pub mod ws;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use ws::AppState;

/// Every route, with CORS open to the browser client.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(api::api_router())
        .merge(api::store_router())
        .merge(ws::ws_router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
