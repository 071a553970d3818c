// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{ActorRole, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_actor;

use crate::models::{
    BookAppointmentRequest, PaymentUpdateRequest, SchedulingError, TransitionRequest,
};
use crate::services::booking::SchedulingService;

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub provider_id: Uuid,
    pub date: NaiveDate,
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<SlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = SchedulingService::new(&state);

    let response = service
        .available_slots(query.provider_id, query.date, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!(response)))
}

/// Patients book for themselves; admins may book on a patient's behalf.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;

    let books_self = actor.role == ActorRole::Patient && actor.id == request.patient_id;
    if !books_self && !actor.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to book an appointment for this patient".to_string(),
        ));
    }

    let service = SchedulingService::new(&state);
    let appointment = service
        .book_appointment(request, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;

    let service = SchedulingService::new(&state);
    let appointment = service
        .get_appointment(appointment_id, actor, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;

    let lists_self = actor.role == ActorRole::Patient && actor.id == patient_id;
    if !lists_self && !actor.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to list this patient's appointments".to_string(),
        ));
    }

    let service = SchedulingService::new(&state);
    let appointments = service
        .patient_appointments(patient_id, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn get_provider_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;

    let lists_own = actor.role == ActorRole::Provider && actor.id == provider_id;
    if !lists_own && !actor.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to list this provider's appointments".to_string(),
        ));
    }

    let service = SchedulingService::new(&state);
    let appointments = service
        .provider_appointments(provider_id, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn transition_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;

    let service = SchedulingService::new(&state);
    let appointment = service
        .transition_appointment(
            appointment_id,
            actor,
            request.target_status,
            request.reason.as_deref(),
            auth.token(),
        )
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<PaymentUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;

    let service = SchedulingService::new(&state);
    let appointment = service
        .record_payment(appointment_id, actor, request.payment_status, auth.token())
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

/// Maps core errors onto the HTTP taxonomy. Slot conflicts and stale
/// transitions are 409s with distinct messages so clients re-query the
/// slot list instead of blindly retrying the identical request.
fn map_scheduling_error(err: SchedulingError) -> AppError {
    match err {
        SchedulingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        SchedulingError::ProviderNotFound => {
            AppError::NotFound("Provider not found".to_string())
        }
        SchedulingError::Validation(msg) => AppError::ValidationError(msg),
        SchedulingError::SlotConflict(kind) => AppError::Conflict(kind.to_string()),
        SchedulingError::InvalidTransition { from, to } => AppError::Conflict(format!(
            "Transition from {} to {} is not permitted",
            from, to
        )),
        SchedulingError::PolicyViolation(msg) => AppError::PolicyViolation(msg),
        SchedulingError::Unauthorized => {
            AppError::Auth("Not authorized for this appointment".to_string())
        }
        SchedulingError::Database(msg) => AppError::Database(msg),
        SchedulingError::ExternalService(msg) => AppError::ExternalService(msg),
    }
}
