// libs/provider-cell/src/services/directory.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Provider, ProviderError, WeeklyAvailability};

/// The Provider Directory: the scheduling core's read-side view of
/// providers (verification, intake status, consultation fee) and the
/// owner-mutable weekly availability template.
pub struct ProviderDirectory {
    supabase: Arc<SupabaseClient>,
}

impl ProviderDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
        debug!("Fetching provider: {}", provider_id);

        let path = format!("/rest/v1/providers?id=eq.{}", provider_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_db_error)?;

        let Some(row) = result.into_iter().next() else {
            return Err(ProviderError::NotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse provider: {}", e)))
    }

    pub async fn is_verified(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, ProviderError> {
        Ok(self.get_provider(provider_id, auth_token).await?.is_verified)
    }

    pub async fn is_accepting_new_patients(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, ProviderError> {
        Ok(self
            .get_provider(provider_id, auth_token)
            .await?
            .is_accepting_new_patients)
    }

    pub async fn consultation_fee(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<f64, ProviderError> {
        Ok(self
            .get_provider(provider_id, auth_token)
            .await?
            .consultation_fee)
    }

    /// Fetches the weekly availability template. Stored rows are
    /// re-validated on the way in so a template that predates a rule
    /// change can never flow into slot generation unchecked.
    pub async fn get_availability_template(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<WeeklyAvailability, ProviderError> {
        debug!("Fetching availability template for provider: {}", provider_id);

        let path = format!(
            "/rest/v1/availability_templates?provider_id=eq.{}",
            provider_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_db_error)?;

        let Some(row) = result.into_iter().next() else {
            return Err(ProviderError::TemplateNotFound);
        };

        let template: WeeklyAvailability = serde_json::from_value(row["days"].clone())
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse template: {}", e)))?;
        template.validate()?;

        Ok(template)
    }

    /// Replaces the provider's weekly template in one upsert. The whole
    /// week is validated before anything is written.
    pub async fn put_availability_template(
        &self,
        provider_id: Uuid,
        template: WeeklyAvailability,
        auth_token: &str,
    ) -> Result<WeeklyAvailability, ProviderError> {
        template.validate()?;

        let row = json!({
            "provider_id": provider_id,
            "days": template,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "resolution=merge-duplicates,return=representation",
            ),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/availability_templates",
                Some(auth_token),
                Some(row),
                Some(headers),
            )
            .await
            .map_err(map_db_error)?;

        if result.is_empty() {
            return Err(ProviderError::DatabaseError(
                "Failed to store availability template".to_string(),
            ));
        }

        info!("Availability template updated for provider {}", provider_id);
        Ok(template)
    }
}

fn map_db_error(err: SupabaseError) -> ProviderError {
    match err {
        SupabaseError::NotFound(_) => ProviderError::NotFound,
        other => ProviderError::DatabaseError(other.to_string()),
    }
}
