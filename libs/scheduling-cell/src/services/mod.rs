pub mod booking;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod policy;
pub mod slots;

pub use booking::SchedulingService;
pub use ledger::BookingLedger;
pub use lifecycle::AppointmentStateMachine;
pub use notify::{NotificationDispatcher, NotificationEvent};
pub use policy::CancellationPolicy;
