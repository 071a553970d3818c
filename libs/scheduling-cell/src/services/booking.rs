// libs/scheduling-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use provider_cell::models::{Provider, ProviderError, WeeklyAvailability};
use provider_cell::services::directory::ProviderDirectory;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Actor, ActorRole};
use shared_models::time::format_hhmm;

use crate::models::{
    Appointment, AppointmentStatus, AvailableSlotsResponse, BookAppointmentRequest,
    PaymentStatus, SchedulingError, SchedulingRules,
};
use crate::services::ledger::BookingLedger;
use crate::services::lifecycle::AppointmentStateMachine;
use crate::services::notify::{NotificationDispatcher, NotificationEvent};
use crate::services::policy::CancellationPolicy;
use crate::services::slots;

/// Orchestrates the scheduling core: slot queries, the booking path and
/// the appointment lifecycle. Validation happens here, but the ledger's
/// constraint-guarded insert is the only authority on who gets a slot.
pub struct SchedulingService {
    directory: ProviderDirectory,
    ledger: BookingLedger,
    dispatcher: NotificationDispatcher,
    policy: CancellationPolicy,
    rules: SchedulingRules,
}

impl SchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            directory: ProviderDirectory::with_client(Arc::clone(&supabase)),
            ledger: BookingLedger::with_client(Arc::clone(&supabase)),
            dispatcher: NotificationDispatcher::with_client(supabase),
            policy: CancellationPolicy::from_config(config),
            rules: SchedulingRules::default(),
        }
    }

    /// Advisory slot listing for a provider and date. Callers must treat
    /// this as a hint: the authoritative answer is whatever `book`
    /// returns, and a `SlotConflict` there means re-query and pick again.
    pub async fn available_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<AvailableSlotsResponse, SchedulingError> {
        debug!("Listing available slots for provider {} on {}", provider_id, date);

        let template = self.fetch_template(provider_id, auth_token).await?;
        let times = self
            .ledger
            .available_slots(provider_id, date, &template, auth_token)
            .await?;

        Ok(AvailableSlotsResponse {
            provider_id,
            date,
            slots: times.iter().map(format_hhmm).collect(),
        })
    }

    /// Book an appointment: structural validation, provider directory
    /// checks, grid membership, then the atomic reserve. The consultation
    /// fee is captured at the instant of booking.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        info!(
            "Booking appointment for patient {} with provider {} on {} {}",
            request.patient_id,
            request.provider_id,
            request.date,
            format_hhmm(&request.time)
        );

        self.validate_booking_request(&request)?;

        let provider = self.fetch_provider(request.provider_id, auth_token).await?;
        if !provider.is_verified {
            return Err(SchedulingError::Validation(
                "Provider is not verified".to_string(),
            ));
        }
        if !provider.is_accepting_new_patients {
            return Err(SchedulingError::Validation(
                "Provider is not accepting new patients".to_string(),
            ));
        }

        let template = self.fetch_template(request.provider_id, auth_token).await?;
        let grid = slots::slot_grid(&template, request.date);
        if !grid.contains(&request.time) {
            return Err(SchedulingError::Validation(format!(
                "{} is not a bookable slot for this provider on {}",
                format_hhmm(&request.time),
                request.date
            )));
        }

        let appointment = self
            .ledger
            .reserve(&request, provider.consultation_fee, auth_token)
            .await?;

        self.dispatcher
            .notify_detached(NotificationEvent::BookingCreated, &appointment, auth_token);

        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self.ledger.get(appointment_id, auth_token).await?;
        self.authorize_party(&appointment, actor)?;
        Ok(appointment)
    }

    pub async fn patient_appointments(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.ledger.list_for_patient(patient_id, auth_token).await
    }

    pub async fn provider_appointments(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.ledger.list_for_provider(provider_id, auth_token).await
    }

    /// Move an appointment through the state machine. The transition is
    /// validated against the current record, then applied with a
    /// compare-and-set on the prior status; losing that race surfaces as
    /// an `InvalidTransition` against the fresh state, never a double
    /// apply.
    pub async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        target: AppointmentStatus,
        reason: Option<&str>,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self.ledger.get(appointment_id, auth_token).await?;
        self.authorize_party(&appointment, actor)?;

        let plan = AppointmentStateMachine::plan(
            &appointment,
            target,
            actor.role,
            reason,
            Utc::now(),
            &self.policy,
        )?;

        let updated = match self
            .ledger
            .apply_transition(appointment_id, &plan, auth_token)
            .await?
        {
            Some(updated) => updated,
            None => {
                // A concurrent writer moved the appointment first; report
                // the transition against what it actually is now.
                let current = self.ledger.get(appointment_id, auth_token).await?;
                return Err(SchedulingError::InvalidTransition {
                    from: current.status,
                    to: target,
                });
            }
        };

        if let Some(event) = Self::event_for(updated.status) {
            self.dispatcher.notify_detached(event, &updated, auth_token);
        }

        Ok(updated)
    }

    /// Observe a payment outcome from the gateway. A `paid` status on a
    /// still-scheduled appointment confirms it on the patient's behalf;
    /// every other combination is just recorded.
    pub async fn record_payment(
        &self,
        appointment_id: Uuid,
        actor: Actor,
        payment_status: PaymentStatus,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self.ledger.get(appointment_id, auth_token).await?;
        self.authorize_party(&appointment, actor)?;

        let updated = self
            .ledger
            .record_payment_status(appointment_id, payment_status, auth_token)
            .await?;
        info!(
            "Payment status for appointment {} recorded as {}",
            appointment_id, payment_status
        );

        if payment_status == PaymentStatus::Paid
            && updated.status == AppointmentStatus::Scheduled
        {
            let confirm_as = Actor {
                id: updated.patient_id,
                role: ActorRole::Patient,
            };
            return self
                .transition_appointment(
                    appointment_id,
                    confirm_as,
                    AppointmentStatus::Confirmed,
                    None,
                    auth_token,
                )
                .await;
        }

        Ok(updated)
    }

    fn validate_booking_request(
        &self,
        request: &BookAppointmentRequest,
    ) -> Result<(), SchedulingError> {
        if request.duration_minutes < self.rules.min_appointment_duration
            || request.duration_minutes > self.rules.max_appointment_duration
        {
            return Err(SchedulingError::Validation(format!(
                "Appointment duration must be between {} and {} minutes",
                self.rules.min_appointment_duration, self.rules.max_appointment_duration
            )));
        }

        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(SchedulingError::Validation(
                "A booking reason is required".to_string(),
            ));
        }
        if reason.len() > self.rules.max_reason_length {
            return Err(SchedulingError::Validation(format!(
                "Booking reason exceeds {} characters",
                self.rules.max_reason_length
            )));
        }

        let scheduled_at = request.date.and_time(request.time).and_utc();
        if scheduled_at <= Utc::now() {
            return Err(SchedulingError::Validation(
                "Appointments must be booked for a future time".to_string(),
            ));
        }

        Ok(())
    }

    /// Patients act on their own appointments, providers on their own
    /// calendar, admins on anything.
    fn authorize_party(
        &self,
        appointment: &Appointment,
        actor: Actor,
    ) -> Result<(), SchedulingError> {
        let allowed = match actor.role {
            ActorRole::Admin => true,
            ActorRole::Patient => actor.id == appointment.patient_id,
            ActorRole::Provider => actor.id == appointment.provider_id,
        };
        if allowed {
            Ok(())
        } else {
            Err(SchedulingError::Unauthorized)
        }
    }

    fn event_for(status: AppointmentStatus) -> Option<NotificationEvent> {
        match status {
            AppointmentStatus::Confirmed => Some(NotificationEvent::BookingConfirmed),
            AppointmentStatus::Cancelled => Some(NotificationEvent::BookingCancelled),
            _ => None,
        }
    }

    async fn fetch_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Provider, SchedulingError> {
        self.directory
            .get_provider(provider_id, auth_token)
            .await
            .map_err(map_provider_error)
    }

    async fn fetch_template(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<WeeklyAvailability, SchedulingError> {
        self.directory
            .get_availability_template(provider_id, auth_token)
            .await
            .map_err(map_provider_error)
    }
}

fn map_provider_error(err: ProviderError) -> SchedulingError {
    match err {
        ProviderError::NotFound | ProviderError::TemplateNotFound => {
            SchedulingError::ProviderNotFound
        }
        ProviderError::InvalidTemplate(e) => SchedulingError::Database(format!(
            "Stored availability template is invalid: {}",
            e
        )),
        ProviderError::DatabaseError(msg) => SchedulingError::Database(msg),
    }
}
