// libs/scheduling-cell/src/services/lifecycle.rs
//
// The appointment state machine. Every status change in the system goes
// through `plan`, which checks the transition table, the acting role and
// the per-transition guards in one place. Handlers never re-derive role
// logic themselves; they hand the actor capability in and get back either
// a plan or a typed rejection.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use shared_models::auth::ActorRole;

use crate::models::{Appointment, AppointmentStatus, PaymentStatus, SchedulingError};
use crate::services::policy::CancellationPolicy;

/// Everything the ledger needs to apply a validated transition: the
/// compare-and-set precondition (`from`) and the cancellation audit
/// fields when the target is `cancelled`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
    pub cancellation: Option<CancellationRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationRecord {
    pub reason: String,
    pub cancelled_by: ActorRole,
    pub cancelled_at: DateTime<Utc>,
}

pub struct AppointmentStateMachine;

impl AppointmentStateMachine {
    /// Valid targets from a given status, ignoring actors and guards.
    /// Terminal statuses allow nothing.
    pub fn valid_targets(from: AppointmentStatus) -> &'static [AppointmentStatus] {
        match from {
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => &[AppointmentStatus::Completed],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    /// Validates a requested transition against the table and produces the
    /// plan the ledger applies. Pure apart from logging: time is a
    /// parameter, and nothing here touches storage.
    pub fn plan(
        appointment: &Appointment,
        target: AppointmentStatus,
        actor: ActorRole,
        reason: Option<&str>,
        now: DateTime<Utc>,
        policy: &CancellationPolicy,
    ) -> Result<TransitionPlan, SchedulingError> {
        let from = appointment.status;
        debug!(
            "Planning transition {} -> {} for appointment {} as {}",
            from, target, appointment.id, actor
        );

        let invalid = || {
            warn!(
                "Rejected transition {} -> {} for appointment {}",
                from, target, appointment.id
            );
            SchedulingError::InvalidTransition { from, to: target }
        };

        if !Self::valid_targets(from).contains(&target) {
            return Err(invalid());
        }

        let permitted_roles: &[ActorRole] = match target {
            AppointmentStatus::Confirmed => &[ActorRole::Patient, ActorRole::Admin],
            AppointmentStatus::InProgress
            | AppointmentStatus::Completed
            | AppointmentStatus::NoShow => &[ActorRole::Provider, ActorRole::Admin],
            AppointmentStatus::Cancelled => {
                &[ActorRole::Patient, ActorRole::Provider, ActorRole::Admin]
            }
            AppointmentStatus::Scheduled => &[],
        };
        if !permitted_roles.contains(&actor) {
            return Err(invalid());
        }

        let mut cancellation = None;
        match target {
            // Confirmation rides on the payment gateway: the status only
            // becomes confirmed once the fee is paid.
            AppointmentStatus::Confirmed => {
                if appointment.payment_status != PaymentStatus::Paid {
                    return Err(invalid());
                }
            }
            AppointmentStatus::InProgress => {
                if now < appointment.scheduled_at() {
                    return Err(invalid());
                }
            }
            AppointmentStatus::NoShow => {
                if now <= appointment.scheduled_at() {
                    return Err(invalid());
                }
            }
            AppointmentStatus::Cancelled => {
                let reason = reason
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| {
                        SchedulingError::Validation(
                            "A cancellation reason is required".to_string(),
                        )
                    })?;

                if !policy.permits(appointment, now) {
                    return Err(SchedulingError::PolicyViolation(format!(
                        "Cancellation requires more than {} hours notice",
                        policy.lead_time().num_hours()
                    )));
                }

                cancellation = Some(CancellationRecord {
                    reason: reason.to_string(),
                    cancelled_by: actor,
                    cancelled_at: now,
                });
            }
            AppointmentStatus::Completed | AppointmentStatus::Scheduled => {}
        }

        Ok(TransitionPlan {
            from,
            to: target,
            cancellation,
        })
    }
}
