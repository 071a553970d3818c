// libs/provider-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{ActorRole, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_actor;

use crate::models::{ProviderError, UpsertTemplateRequest, WeeklyAvailability};
use crate::services::directory::ProviderDirectory;

#[axum::debug_handler]
pub async fn get_provider(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let directory = ProviderDirectory::new(&state);

    let provider = directory
        .get_provider(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!(provider)))
}

#[axum::debug_handler]
pub async fn get_availability_template(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let directory = ProviderDirectory::new(&state);

    let template = directory
        .get_availability_template(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "provider_id": provider_id, "days": template })))
}

/// The template is owned by the provider; only that provider or an admin
/// may replace it.
#[axum::debug_handler]
pub async fn put_availability_template(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = require_actor(&user)?;

    let is_owner = actor.role == ActorRole::Provider && actor.id == provider_id;
    if !is_owner && !actor.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to modify this provider's availability".to_string(),
        ));
    }

    let template = WeeklyAvailability::new(request.days)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let directory = ProviderDirectory::new(&state);
    let stored = directory
        .put_availability_template(provider_id, template, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "provider_id": provider_id,
        "days": stored,
    })))
}

fn map_provider_error(err: ProviderError) -> AppError {
    match err {
        ProviderError::NotFound => AppError::NotFound("Provider not found".to_string()),
        ProviderError::TemplateNotFound => {
            AppError::NotFound("Availability template not found".to_string())
        }
        ProviderError::InvalidTemplate(e) => AppError::ValidationError(e.to_string()),
        ProviderError::DatabaseError(msg) => AppError::Database(msg),
    }
}
