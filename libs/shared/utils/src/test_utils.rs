use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub cancellation_lead_time_hours: i64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            cancellation_lead_time_hours: 5,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            cancellation_lead_time_hours: self.cancellation_lead_time_hours,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn provider(email: &str) -> Self {
        Self::new(email, "provider")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Mints an HS256 token that `shared_utils::jwt::validate_token`
    /// accepts, matching the Supabase claim layout.
    pub fn create_token(user: &TestUser, secret: &str) -> String {
        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let claims = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
            "iat": Utc::now().timestamp(),
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{}.{}", header_b64, claims_b64);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(signing_input.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature_b64)
    }

    pub fn auth_header(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_token(user, secret))
    }
}

/// Canned PostgREST rows for wiremock-backed tests.
pub struct MockSupabaseRows;

impl MockSupabaseRows {
    pub fn provider_row(provider_id: &str, verified: bool, accepting: bool, fee: f64) -> Value {
        json!({
            "id": provider_id,
            "display_name": "Dr. Test Provider",
            "specialty": "General Practice",
            "is_verified": verified,
            "is_accepting_new_patients": accepting,
            "consultation_fee": fee,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        })
    }

    /// A weekly template row: every weekday open 09:00-17:00 with a
    /// 12:00-13:00 break and 30-minute slots.
    pub fn template_row(provider_id: &str) -> Value {
        let open_day = json!({
            "is_available": true,
            "start_time": "09:00",
            "end_time": "17:00",
            "break_start": "12:00",
            "break_end": "13:00",
            "slot_duration_minutes": 30,
            "max_appointments": 16,
        });
        let days: Vec<Value> = (0..7).map(|_| open_day.clone()).collect();

        json!({
            "provider_id": provider_id,
            "days": days,
            "updated_at": Utc::now().to_rfc3339(),
        })
    }

    pub fn appointment_row(
        id: &str,
        patient_id: &str,
        provider_id: &str,
        date: &str,
        time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "provider_id": provider_id,
            "date": date,
            "time": time,
            "duration_minutes": 30,
            "appointment_type": "initial_consultation",
            "status": status,
            "reason": "Recurring headaches",
            "payment_amount": 75.0,
            "payment_status": "pending",
            "cancellation_reason": null,
            "cancelled_by": null,
            "cancelled_at": null,
            "created_at": Utc::now().to_rfc3339(),
        })
    }
}
