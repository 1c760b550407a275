//! Booking flow models: checkout start, pending bookings, confirmation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::reservation::Attendee;

/// Start checkout request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub schedule_id: String,
    #[validate(range(min = 1, max = 500))]
    pub party_size: u32,
    #[validate(nested)]
    pub attendees: Vec<Attendee>,
}

/// Embedded checkout handle returned to the browser
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
    pub client_secret: Option<String>,
}

/// Booking data held server-side between checkout creation and payment
/// confirmation, keyed by checkout session id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingBooking {
    pub session_id: String,
    pub user_id: String,
    pub schedule_id: String,
    pub visit_type: String,
    pub party_size: u32,
    pub attendees: Vec<Attendee>,
    pub created_at: DateTime<Utc>,
}

/// Confirm a paid checkout session
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    pub session_id: String,
}

/// Payment facts the ledger needs to finalize a booking
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub session_id: String,
    pub paid: bool,
    pub payment_intent_id: Option<String>,
    pub amount_total: i64,
    pub currency: String,
}
