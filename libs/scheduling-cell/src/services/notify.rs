// libs/scheduling-cell/src/services/notify.rs
//
// Fire-and-forget notification dispatch. Records are written to the
// notifications table for the delivery workers to pick up; the scheduling
// core never waits on delivery, and a dispatch failure must never undo an
// already-committed booking or transition.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, SchedulingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    ReminderDue,
}

impl std::fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationEvent::BookingCreated => write!(f, "booking_created"),
            NotificationEvent::BookingConfirmed => write!(f, "booking_confirmed"),
            NotificationEvent::BookingCancelled => write!(f, "booking_cancelled"),
            NotificationEvent::ReminderDue => write!(f, "reminder_due"),
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    supabase: Arc<SupabaseClient>,
}

impl NotificationDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Enqueue one notification record per party that should hear about
    /// the event. Errors propagate to the caller only so the detached
    /// task can log them; nothing upstream depends on the result.
    pub async fn notify(
        &self,
        event: NotificationEvent,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<(), SchedulingError> {
        debug!(
            "Dispatching {} for appointment {}",
            event, appointment.id
        );

        let rows: Vec<Value> = [appointment.patient_id, appointment.provider_id]
            .iter()
            .map(|recipient| {
                json!({
                    "recipient_id": recipient,
                    "appointment_id": appointment.id,
                    "event": event.to_string(),
                    "payload": {
                        "date": appointment.date.to_string(),
                        "time": shared_models::time::format_hhmm(&appointment.time),
                        "status": appointment.status.to_string(),
                    },
                    "created_at": Utc::now().to_rfc3339(),
                })
            })
            .collect();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                Some(auth_token),
                Some(json!(rows)),
                Some(headers),
            )
            .await
            .map_err(|e| SchedulingError::ExternalService(e.to_string()))?;

        Ok(())
    }

    /// Dispatch after a committed state change without blocking the
    /// request. The spawned task logs failures at warn and drops them.
    pub fn notify_detached(
        &self,
        event: NotificationEvent,
        appointment: &Appointment,
        auth_token: &str,
    ) {
        let dispatcher = self.clone();
        let appointment = appointment.clone();
        let token = auth_token.to_string();

        tokio::spawn(async move {
            if let Err(e) = dispatcher.notify(event, &appointment, &token).await {
                warn!(
                    "Notification dispatch failed for appointment {} ({}): {}",
                    appointment.id, event, e
                );
            }
        });
    }
}
