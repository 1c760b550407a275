//! Data models for Papilio

pub mod booking;
pub mod reservation;
pub mod schedule;
pub mod user;
pub mod visit_type;

// Re-export commonly used types
pub use booking::{PaymentOutcome, PendingBooking};
pub use reservation::{Attendee, Reservation};
pub use schedule::{OfferedSlot, Schedule, ScheduleWindow};
pub use user::{Role, User};
pub use visit_type::VisitType;
