use std::sync::Arc;

use axum::{routing::get, Router};

use provider_cell::router::provider_routes;
use scheduling_cell::router::appointment_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "CareSlot scheduling API is running!" }))
        .nest("/providers", provider_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
}
