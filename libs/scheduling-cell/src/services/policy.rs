// libs/scheduling-cell/src/services/policy.rs
use chrono::{DateTime, Duration, Utc};

use shared_config::AppConfig;

use crate::models::Appointment;

/// Decides whether an appointment may still be cancelled at a given
/// instant. The lead time is a deployment knob, not a constant; see
/// `CANCELLATION_LEAD_TIME_HOURS` in the config crate.
#[derive(Debug, Clone)]
pub struct CancellationPolicy {
    lead_time: Duration,
}

impl CancellationPolicy {
    pub fn new(lead_time_hours: i64) -> Self {
        Self {
            lead_time: Duration::hours(lead_time_hours),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.cancellation_lead_time_hours)
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    /// True iff the appointment still occupies its slot and strictly more
    /// than the lead time remains before the scheduled moment.
    pub fn permits(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        if !appointment.status.is_active() {
            return false;
        }
        appointment.scheduled_at() - now > self.lead_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, AppointmentType, PaymentStatus};
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn appointment_at(date: NaiveDate, time: NaiveTime, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            date,
            time,
            duration_minutes: 30,
            appointment_type: AppointmentType::InitialConsultation,
            status,
            reason: "Recurring headaches".to_string(),
            payment_amount: 75.0,
            payment_status: PaymentStatus::Pending,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            created_at: Utc::now(),
        }
    }

    fn fixture() -> (Appointment, DateTime<Utc>) {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let time = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        let appointment = appointment_at(date, time, AppointmentStatus::Scheduled);
        let scheduled_at = appointment.scheduled_at();
        (appointment, scheduled_at)
    }

    #[test]
    fn permits_outside_the_lead_window() {
        let policy = CancellationPolicy::new(5);
        let (appointment, scheduled_at) = fixture();

        // One minute more notice than the lead time requires.
        let now = scheduled_at - Duration::hours(5) - Duration::minutes(1);
        assert!(policy.permits(&appointment, now));
    }

    #[test]
    fn rejects_inside_the_lead_window() {
        let policy = CancellationPolicy::new(5);
        let (appointment, scheduled_at) = fixture();

        // One minute short of the required notice.
        let now = scheduled_at - Duration::hours(5) + Duration::minutes(1);
        assert!(!policy.permits(&appointment, now));
    }

    #[test]
    fn exactly_the_lead_time_is_too_late() {
        // The window is strict: `remaining > lead_time`, not `>=`.
        let policy = CancellationPolicy::new(5);
        let (appointment, scheduled_at) = fixture();

        let now = scheduled_at - Duration::hours(5);
        assert!(!policy.permits(&appointment, now));
    }

    #[test]
    fn rejects_terminal_statuses_regardless_of_notice() {
        let policy = CancellationPolicy::new(5);
        let (mut appointment, scheduled_at) = fixture();
        appointment.status = AppointmentStatus::Completed;

        let now = scheduled_at - Duration::days(7);
        assert!(!policy.permits(&appointment, now));
    }

    #[test]
    fn lead_time_is_configurable() {
        let strict = CancellationPolicy::new(48);
        let lenient = CancellationPolicy::new(1);
        let (appointment, scheduled_at) = fixture();

        let now = scheduled_at - Duration::hours(24);
        assert!(!strict.permits(&appointment, now));
        assert!(lenient.permits(&appointment, now));
    }
}
