pub mod market;
pub mod status;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Assemble the API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(market::routes())
        .merge(status::routes())
}

/// Full application: routes, CORS for the dashboard origin, shared state.
pub fn app(state: Arc<AppState>) -> Router {
    api_router()
        .layer(CorsLayer::permissive())
        .with_state(state)
}
