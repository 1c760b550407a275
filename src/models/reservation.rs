//! Reservation model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Person attending a visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Attendee {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Identity document kind (passport, id card, ...)
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// Payment state recorded on a reservation. Reservations only exist for
/// paid sessions; refunds are handled in the provider dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
}

/// A confirmed booking against one schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    /// `res_{checkout session id}`
    pub id: String,
    pub user_id: String,
    pub schedule_id: String,
    pub visit_type: String,
    pub num_people: u32,
    pub attendees: Vec<Attendee>,
    pub payment_status: PaymentStatus,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    /// Amount in minor currency units
    pub amount_total: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Reservation key for a checkout session
    pub fn key_for_session(session_id: &str) -> String {
        format!("res_{}", session_id)
    }
}

/// Admin listing filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReservationQuery {
    pub schedule_id: Option<String>,
}
