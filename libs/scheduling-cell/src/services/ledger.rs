// libs/scheduling-cell/src/services/ledger.rs
//
// The authoritative reservation registry. Exclusivity is enforced by two
// partial unique indexes on the appointments table, scoped to active
// statuses:
//
//   uq_appointments_provider_slot_active  (provider_id, date, time)
//   uq_appointments_patient_slot_active   (patient_id, date, time)
//
// `reserve` is a single constraint-guarded insert, so two concurrent
// callers can never both win a slot; there is deliberately no separate
// "check availability" step on the write path. Status changes go through
// a status-filtered PATCH, which serializes concurrent transitions on the
// same appointment.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use provider_cell::models::WeeklyAvailability;
use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_models::time::format_hhmm;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, PaymentStatus, SchedulingError,
    SlotConflictKind,
};
use crate::services::lifecycle::TransitionPlan;
use crate::services::slots;

const PROVIDER_SLOT_CONSTRAINT: &str = "uq_appointments_provider_slot_active";
const PATIENT_SLOT_CONSTRAINT: &str = "uq_appointments_patient_slot_active";
const ACTIVE_STATUS_FILTER: &str = "status=in.(scheduled,confirmed)";

pub struct BookingLedger {
    supabase: Arc<SupabaseClient>,
}

impl BookingLedger {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Atomically reserve a slot. The insert either commits a new
    /// `scheduled` appointment or trips one of the partial unique indexes;
    /// a 409 is mapped to the conflict kind by constraint name so the
    /// caller knows whether the provider's slot was taken or the patient
    /// is double-booking themselves.
    pub async fn reserve(
        &self,
        request: &BookAppointmentRequest,
        payment_amount: f64,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!(
            "Reserving slot {} {} for provider {} / patient {}",
            request.date,
            format_hhmm(&request.time),
            request.provider_id,
            request.patient_id
        );

        let row = json!({
            "patient_id": request.patient_id,
            "provider_id": request.provider_id,
            "date": request.date.to_string(),
            "time": format_hhmm(&request.time),
            "duration_minutes": request.duration_minutes,
            "appointment_type": request.appointment_type.to_string(),
            "status": AppointmentStatus::Scheduled.to_string(),
            "reason": request.reason,
            "payment_amount": payment_amount,
            "payment_status": PaymentStatus::Pending.to_string(),
            "created_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(row),
                Some(return_representation()),
            )
            .await
            .map_err(map_reserve_error)?;

        let Some(created) = result.into_iter().next() else {
            return Err(SchedulingError::Database(
                "Insert returned no representation".to_string(),
            ));
        };

        let appointment = parse_appointment(created)?;
        info!(
            "Reserved appointment {} at {} {}",
            appointment.id,
            appointment.date,
            format_hhmm(&appointment.time)
        );
        Ok(appointment)
    }

    /// The advisory availability read: the template grid minus the times
    /// of currently active reservations. Stale the moment it is returned;
    /// only `reserve` decides who actually gets a slot.
    pub async fn available_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        template: &WeeklyAvailability,
        auth_token: &str,
    ) -> Result<Vec<NaiveTime>, SchedulingError> {
        let mut grid = slots::slot_grid(template, date);
        if grid.is_empty() {
            return Ok(grid);
        }

        let active = self
            .active_for_provider_date(provider_id, date, auth_token)
            .await?;
        let taken: Vec<NaiveTime> = active.iter().map(|a| a.time).collect();

        grid.retain(|slot| !taken.contains(slot));
        Ok(grid)
    }

    pub async fn get(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_db_error)?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::NotFound);
        };
        parse_appointment(row)
    }

    pub async fn active_for_provider_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&date=eq.{}&{}&order=time.asc",
            provider_id, date, ACTIVE_STATUS_FILTER
        );
        self.list(&path, auth_token).await
    }

    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=date.desc,time.desc",
            patient_id
        );
        self.list(&path, auth_token).await
    }

    pub async fn list_for_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&order=date.desc,time.desc",
            provider_id
        );
        self.list(&path, auth_token).await
    }

    /// Apply a validated transition with a compare-and-set on the prior
    /// status. The PATCH is filtered by `status=eq.{expected}`, so if a
    /// concurrent writer already moved the appointment the update matches
    /// zero rows and `Ok(None)` comes back; the caller re-reads and
    /// reports against the fresh state. This is what keeps a simultaneous
    /// cancel and confirm from both applying.
    pub async fn apply_transition(
        &self,
        appointment_id: Uuid,
        plan: &TransitionPlan,
        auth_token: &str,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let mut changes = serde_json::Map::new();
        changes.insert("status".to_string(), json!(plan.to.to_string()));
        if let Some(record) = &plan.cancellation {
            changes.insert("cancellation_reason".to_string(), json!(record.reason));
            changes.insert(
                "cancelled_by".to_string(),
                json!(record.cancelled_by.to_string()),
            );
            changes.insert(
                "cancelled_at".to_string(),
                json!(record.cancelled_at.to_rfc3339()),
            );
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, plan.from
        );
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(changes)),
                Some(return_representation()),
            )
            .await
            .map_err(map_db_error)?;

        match result.into_iter().next() {
            Some(row) => {
                info!(
                    "Appointment {} transitioned {} -> {}",
                    appointment_id, plan.from, plan.to
                );
                Ok(Some(parse_appointment(row)?))
            }
            None => {
                warn!(
                    "Stale transition {} -> {} for appointment {}: status changed concurrently",
                    plan.from, plan.to, appointment_id
                );
                Ok(None)
            }
        }
    }

    /// Record the payment status the gateway reported. No status
    /// precondition: payment observations are idempotent writes keyed by
    /// id, and the state machine decides separately whether the new value
    /// drives a confirmation.
    pub async fn record_payment_status(
        &self,
        appointment_id: Uuid,
        payment_status: PaymentStatus,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let changes = json!({ "payment_status": payment_status.to_string() });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(changes),
                Some(return_representation()),
            )
            .await
            .map_err(map_db_error)?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::NotFound);
        };
        parse_appointment(row)
    }

    async fn list(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(map_db_error)?;

        result.into_iter().map(parse_appointment).collect()
    }
}

fn return_representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn parse_appointment(row: Value) -> Result<Appointment, SchedulingError> {
    serde_json::from_value(row)
        .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))
}

fn map_reserve_error(err: SupabaseError) -> SchedulingError {
    match err {
        SupabaseError::Conflict(body) => {
            // PostgREST names the violated constraint in the error body.
            // An unrecognized 409 on the reserve insert gets the provider
            // kind; the caller remedy (re-query slots) is the same.
            let kind = if body.contains(PATIENT_SLOT_CONSTRAINT) {
                SlotConflictKind::PatientDoubleBooked
            } else if body.contains(PROVIDER_SLOT_CONSTRAINT) {
                SlotConflictKind::ProviderSlotTaken
            } else {
                warn!("Unrecognized constraint in reserve conflict: {}", body);
                SlotConflictKind::ProviderSlotTaken
            };
            SchedulingError::SlotConflict(kind)
        }
        other => map_db_error(other),
    }
}

fn map_db_error(err: SupabaseError) -> SchedulingError {
    match err {
        SupabaseError::NotFound(_) => SchedulingError::NotFound,
        other => SchedulingError::Database(other.to_string()),
    }
}
