// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::auth::ActorRole;
use shared_models::time::hhmm;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub duration_minutes: i32,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub reason: String,
    pub payment_amount: f64,
    pub payment_status: PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<ActorRole>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// Canonical UTC start instant. Dates and times are stored in UTC, so the
    /// combination is unambiguous.
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Active appointments hold their slot; terminal ones release it.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "initial", alias = "new_patient")]
    InitialConsultation,
    #[serde(alias = "followup", alias = "follow_up")]
    FollowUpConsultation,
    #[serde(alias = "urgent")]
    UrgentConsultation,
    #[serde(alias = "telehealth", alias = "virtual")]
    TelehealthCheckIn,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::InitialConsultation => write!(f, "initial_consultation"),
            AppointmentType::FollowUpConsultation => write!(f, "follow_up_consultation"),
            AppointmentType::UrgentConsultation => write!(f, "urgent_consultation"),
            AppointmentType::TelehealthCheckIn => write!(f, "telehealth_check_in"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Refunded => write!(f, "refunded"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub duration_minutes: i32,
    pub appointment_type: AppointmentType,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target_status: AppointmentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUpdateRequest {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsResponse {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotConflictKind {
    ProviderSlotTaken,
    PatientDoubleBooked,
}

impl fmt::Display for SlotConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotConflictKind::ProviderSlotTaken => {
                write!(f, "the provider already has an active appointment at this time")
            }
            SlotConflictKind::PatientDoubleBooked => {
                write!(f, "the patient already has an active appointment at this time")
            }
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Slot conflict: {0}")]
    SlotConflict(SlotConflictKind),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Cancellation policy violation: {0}")]
    PolicyViolation(String),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    pub min_appointment_duration: i32,
    pub max_appointment_duration: i32,
    pub max_reason_length: usize,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            min_appointment_duration: 15,
            max_appointment_duration: 120,
            max_reason_length: 500,
        }
    }
}
