// libs/provider-cell/src/models.rs
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::time::{format_hhmm, hhmm, hhmm_option};

// ==============================================================================
// PROVIDER DIRECTORY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub display_name: String,
    pub specialty: String,
    pub is_verified: bool,
    pub is_accepting_new_patients: bool,
    pub consultation_fee: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// WEEKLY AVAILABILITY TEMPLATE
// ==============================================================================

pub const DEFAULT_SLOT_DURATION_MINUTES: i32 = 30;

fn default_slot_duration() -> i32 {
    DEFAULT_SLOT_DURATION_MINUTES
}

/// One weekday's bookable window. Closed days keep zeroed times; the
/// window fields are only meaningful when `is_available` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRule {
    pub is_available: bool,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default, with = "hhmm_option")]
    pub break_start: Option<NaiveTime>,
    #[serde(default, with = "hhmm_option")]
    pub break_end: Option<NaiveTime>,
    #[serde(default = "default_slot_duration")]
    pub slot_duration_minutes: i32,
    pub max_appointments: i32,
}

impl DayRule {
    pub fn closed() -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("00:00 is valid");
        Self {
            is_available: false,
            start_time: midnight,
            end_time: midnight,
            break_start: None,
            break_end: None,
            slot_duration_minutes: DEFAULT_SLOT_DURATION_MINUTES,
            max_appointments: 0,
        }
    }

    pub fn open(
        start_time: NaiveTime,
        end_time: NaiveTime,
        slot_duration_minutes: i32,
        max_appointments: i32,
    ) -> Self {
        Self {
            is_available: true,
            start_time,
            end_time,
            break_start: None,
            break_end: None,
            slot_duration_minutes,
            max_appointments,
        }
    }

    pub fn with_break(mut self, break_start: NaiveTime, break_end: NaiveTime) -> Self {
        self.break_start = Some(break_start);
        self.break_end = Some(break_end);
        self
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TemplateError {
    #[error("{weekday}: start time {start} must be before end time {end}")]
    WindowInverted {
        weekday: Weekday,
        start: String,
        end: String,
    },

    #[error("{weekday}: break must lie inside the working window")]
    BreakOutsideWindow { weekday: Weekday },

    #[error("{weekday}: break start must be before break end")]
    BreakInverted { weekday: Weekday },

    #[error("{weekday}: break start and end must be set together")]
    BreakHalfSpecified { weekday: Weekday },

    #[error("{weekday}: slot duration {minutes} minutes is out of range (5-240)")]
    BadSlotDuration { weekday: Weekday, minutes: i32 },

    #[error("{weekday}: max appointments must not be negative")]
    NegativeCapacity { weekday: Weekday },
}

/// The full weekly availability template, indexed Sunday-first like the
/// rest of the scheduling tables. Constructed and validated as one unit;
/// a half-configured week never exists as a value.
///
/// Serialized as the bare seven-element array (the `days` column of the
/// template row), Sunday first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyAvailability {
    days: [DayRule; 7],
}

impl WeeklyAvailability {
    pub fn new(days: [DayRule; 7]) -> Result<Self, TemplateError> {
        for (index, rule) in days.iter().enumerate() {
            validate_day(weekday_from_index(index), rule)?;
        }
        Ok(Self { days })
    }

    pub fn closed_week() -> Self {
        Self {
            days: std::array::from_fn(|_| DayRule::closed()),
        }
    }

    pub fn rule_for(&self, weekday: Weekday) -> &DayRule {
        &self.days[weekday.num_days_from_sunday() as usize]
    }

    pub fn days(&self) -> &[DayRule; 7] {
        &self.days
    }

    /// Re-checks the invariants after deserialization from storage or a
    /// client payload, where the field-level constructors were bypassed.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for (index, rule) in self.days.iter().enumerate() {
            validate_day(weekday_from_index(index), rule)?;
        }
        Ok(())
    }
}

fn weekday_from_index(index: usize) -> Weekday {
    match index {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}

fn validate_day(weekday: Weekday, rule: &DayRule) -> Result<(), TemplateError> {
    if !rule.is_available {
        return Ok(());
    }

    if rule.start_time >= rule.end_time {
        return Err(TemplateError::WindowInverted {
            weekday,
            start: format_hhmm(&rule.start_time),
            end: format_hhmm(&rule.end_time),
        });
    }

    if !(5..=240).contains(&rule.slot_duration_minutes) {
        return Err(TemplateError::BadSlotDuration {
            weekday,
            minutes: rule.slot_duration_minutes,
        });
    }

    if rule.max_appointments < 0 {
        return Err(TemplateError::NegativeCapacity { weekday });
    }

    match (rule.break_start, rule.break_end) {
        (None, None) => {}
        (Some(break_start), Some(break_end)) => {
            if break_start >= break_end {
                return Err(TemplateError::BreakInverted { weekday });
            }
            if break_start < rule.start_time || break_end > rule.end_time {
                return Err(TemplateError::BreakOutsideWindow { weekday });
            }
        }
        _ => return Err(TemplateError::BreakHalfSpecified { weekday }),
    }

    Ok(())
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertTemplateRequest {
    pub days: [DayRule; 7],
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not found")]
    NotFound,

    #[error("Availability template not found for provider")]
    TemplateNotFound,

    #[error("Invalid availability template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
