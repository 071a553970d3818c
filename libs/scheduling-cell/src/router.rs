// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Every scheduling operation requires an authenticated actor.
    let protected_routes = Router::new()
        .route("/slots", get(handlers::get_available_slots))
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route(
            "/{appointment_id}/transition",
            post(handlers::transition_appointment),
        )
        .route("/{appointment_id}/payment", post(handlers::record_payment))
        .route(
            "/patients/{patient_id}",
            get(handlers::get_patient_appointments),
        )
        .route(
            "/providers/{provider_id}",
            get(handlers::get_provider_appointments),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
