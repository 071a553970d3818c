// libs/provider-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn provider_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/{provider_id}", get(handlers::get_provider))
        .route(
            "/{provider_id}/template",
            get(handlers::get_availability_template),
        )
        .route(
            "/{provider_id}/template",
            put(handlers::put_availability_template),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
