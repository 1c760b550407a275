//! Reservations service: checkout start, payment confirmation and the
//! capacity decrement

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;
use validator::Validate;

use crate::{
    dates::today_in,
    error::{AppError, AppResult},
    models::{
        booking::{CheckoutRequest, CheckoutResponse, PaymentOutcome, PendingBooking},
        reservation::{PaymentStatus, Reservation},
        user::User,
    },
    repository::Repository,
    services::{
        email::EmailService,
        payments::{
            checkout_lifetime, verify_webhook_signature, CheckoutSession, NewCheckoutSession,
            PaymentProvider,
        },
        pending::PendingBookingStore,
        users::UsersService,
    },
};

/// Settings the booking flow needs from configuration
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub timezone: Tz,
    /// Requested payment window; see [`checkout_lifetime`]
    pub checkout_ttl: Duration,
    /// Extra time a pending booking is kept after its session expires
    pub hold_grace: Duration,
    pub return_url: String,
    pub webhook_secret: String,
}

impl BookingSettings {
    /// Lifetime of the checkout session sent to the provider
    pub fn session_lifetime(&self) -> Duration {
        checkout_lifetime(self.checkout_ttl)
    }

    /// A pending booking always outlives the session it belongs to
    pub fn hold_ttl(&self) -> Duration {
        self.session_lifetime() + self.hold_grace
    }
}

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    payments: Arc<dyn PaymentProvider>,
    pending: Arc<dyn PendingBookingStore>,
    users: UsersService,
    email: EmailService,
    settings: BookingSettings,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: serde_json::Value,
}

impl ReservationsService {
    pub fn new(
        repository: Repository,
        payments: Arc<dyn PaymentProvider>,
        pending: Arc<dyn PendingBookingStore>,
        users: UsersService,
        email: EmailService,
        settings: BookingSettings,
    ) -> Self {
        Self {
            repository,
            payments,
            pending,
            users,
            email,
            settings,
        }
    }

    /// Open a checkout session for a schedule and hold the booking until
    /// payment is confirmed. Capacity is not taken here.
    pub async fn start_checkout(
        &self,
        user: &User,
        request: &CheckoutRequest,
    ) -> AppResult<CheckoutResponse> {
        request.validate()?;
        if request.attendees.len() != request.party_size as usize {
            return Err(AppError::Validation(format!(
                "Expected {} attendee(s), got {}",
                request.party_size,
                request.attendees.len()
            )));
        }

        let schedule = self.repository.schedules.get_by_id(&request.schedule_id).await?;
        if !schedule.active {
            return Err(AppError::BusinessRule(format!(
                "Schedule {} is not open for booking",
                schedule.id
            )));
        }
        if schedule.date < today_in(self.settings.timezone) {
            return Err(AppError::BusinessRule(format!(
                "Schedule {} is in the past",
                schedule.id
            )));
        }
        if !schedule.can_host(request.party_size) {
            return Err(AppError::Capacity(format!(
                "Schedule {} has {} slot(s) left, {} requested",
                schedule.id, schedule.available_slots, request.party_size
            )));
        }

        let visit_type = self.repository.visit_types.get_by_id(&schedule.visit_type).await?;
        let price_id = visit_type.stripe_price_id.clone().ok_or_else(|| {
            AppError::BusinessRule(format!("Visit type {} has no price", visit_type.id))
        })?;

        let customer_id = self.users.ensure_customer(user).await?;
        let expires_at = Utc::now().timestamp() + self.settings.session_lifetime().as_secs() as i64;

        let session = self
            .payments
            .create_checkout_session(&NewCheckoutSession {
                price_id,
                customer_id: Some(customer_id),
                quantity: request.party_size,
                metadata: vec![
                    ("schedule_id".to_string(), schedule.id.clone()),
                    ("user_id".to_string(), user.id.clone()),
                    ("visit_type".to_string(), schedule.visit_type.clone()),
                    ("party_size".to_string(), request.party_size.to_string()),
                ],
                return_url: self.settings.return_url.clone(),
                expires_at,
            })
            .await?;

        let pending = PendingBooking {
            session_id: session.session_id.clone(),
            user_id: user.id.clone(),
            schedule_id: schedule.id.clone(),
            visit_type: schedule.visit_type.clone(),
            party_size: request.party_size,
            attendees: request.attendees.clone(),
            created_at: Utc::now(),
        };
        self.pending.put(&pending, self.settings.hold_ttl()).await?;

        tracing::info!(
            schedule_id = %schedule.id,
            session_id = %session.session_id,
            party_size = request.party_size,
            "Checkout started"
        );

        Ok(CheckoutResponse {
            session_id: session.session_id,
            url: session.url,
            client_secret: session.client_secret,
        })
    }

    /// Confirm a checkout session on behalf of the visitor returning from
    /// payment
    pub async fn confirm_session(&self, user: &User, session_id: &str) -> AppResult<Reservation> {
        let session = self.payments.retrieve_checkout_session(session_id).await?;
        if let Some(owner) = session.metadata_value("user_id") {
            if owner != user.id && !user.is_admin() {
                return Err(AppError::Authorization(
                    "Checkout session belongs to another user".to_string(),
                ));
            }
        }
        self.finalize(&session).await
    }

    /// Verify and apply a payment-provider webhook. Returns the event type.
    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> AppResult<String> {
        if self.settings.webhook_secret.is_empty() {
            tracing::error!("Webhook received but payment.webhook_secret is not configured");
            return Err(AppError::Authentication(
                "Webhook signing secret is not configured".to_string(),
            ));
        }
        let signature = signature
            .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;
        verify_webhook_signature(
            payload,
            signature,
            &self.settings.webhook_secret,
            Utc::now().timestamp(),
        )
        .map_err(|e| AppError::Validation(e.to_string()))?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::Validation(format!("Malformed webhook event: {}", e)))?;

        if event.event_type != "checkout.session.completed" {
            tracing::debug!(event = %event.event_type, "Webhook event ignored");
            return Ok(event.event_type);
        }

        let session: CheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| AppError::Validation(format!("Malformed checkout session: {}", e)))?;

        match self.finalize(&session).await {
            Ok(reservation) => {
                tracing::info!(session_id = %session.id, reservation = %reservation.id, "Webhook confirmed reservation");
            }
            // Not retryable by the provider; acknowledge and leave a trace
            Err(e @ (AppError::NotFound(_) | AppError::Capacity(_) | AppError::BusinessRule(_))) => {
                tracing::error!(session_id = %session.id, "Webhook confirmation failed: {}", e);
            }
            Err(e) => return Err(e),
        }
        Ok(event.event_type)
    }

    /// Turn a paid session into a reservation; retries return the existing one
    async fn finalize(&self, session: &CheckoutSession) -> AppResult<Reservation> {
        if !session.is_paid() {
            return Err(AppError::BusinessRule("Payment not completed".to_string()));
        }

        let id = Reservation::key_for_session(&session.id);
        if let Some(existing) = self.repository.reservations.find(&id).await? {
            return Ok(existing);
        }

        let pending = self.pending.get(&session.id).await?.ok_or_else(|| {
            AppError::NotFound(format!("No pending booking for session {}", session.id))
        })?;

        let outcome = PaymentOutcome {
            session_id: session.id.clone(),
            paid: true,
            payment_intent_id: session.payment_intent.clone(),
            amount_total: session.amount_total.unwrap_or(0),
            currency: session.currency.clone().unwrap_or_default(),
        };
        self.confirm(&pending, &outcome).await
    }

    /// Persist a reservation for a paid pending booking and take its slots.
    ///
    /// The capacity check and decrement are one conditional update, so the
    /// slot counter never goes negative. Confirming the same session twice
    /// returns the first reservation without taking slots again.
    pub async fn confirm(
        &self,
        pending: &PendingBooking,
        outcome: &PaymentOutcome,
    ) -> AppResult<Reservation> {
        if !outcome.paid {
            return Err(AppError::BusinessRule("Payment not completed".to_string()));
        }
        if pending.session_id != outcome.session_id {
            return Err(AppError::Validation(
                "Payment does not match the pending booking".to_string(),
            ));
        }

        let id = Reservation::key_for_session(&outcome.session_id);
        if let Some(existing) = self.repository.reservations.find(&id).await? {
            tracing::debug!(session_id = %outcome.session_id, "Reservation already confirmed");
            return Ok(existing);
        }

        let schedule = self.repository.schedules.get_by_id(&pending.schedule_id).await?;
        let remaining = self
            .repository
            .schedules
            .reserve_slots(&schedule.id, pending.party_size)
            .await?;

        let reservation = Reservation {
            id: id.clone(),
            user_id: pending.user_id.clone(),
            schedule_id: schedule.id.clone(),
            visit_type: pending.visit_type.clone(),
            num_people: pending.party_size,
            attendees: pending.attendees.clone(),
            payment_status: PaymentStatus::Paid,
            checkout_session_id: outcome.session_id.clone(),
            payment_intent_id: outcome.payment_intent_id.clone(),
            amount_total: outcome.amount_total,
            currency: outcome.currency.clone(),
            created_at: Utc::now(),
        };

        match self.repository.reservations.create(&reservation).await {
            Ok(true) => {}
            Ok(false) => {
                // A concurrent confirmation of the same session won
                self.give_back(&schedule.id, pending.party_size).await;
                return self
                    .repository
                    .reservations
                    .find(&id)
                    .await?
                    .ok_or_else(|| AppError::Internal(format!("Reservation {} vanished", id)));
            }
            Err(e) => {
                self.give_back(&schedule.id, pending.party_size).await;
                return Err(e);
            }
        }

        if let Err(e) = self.pending.remove(&outcome.session_id).await {
            tracing::warn!(session_id = %outcome.session_id, "Failed to clear pending booking: {}", e);
        }

        tracing::info!(
            schedule_id = %schedule.id,
            session_id = %outcome.session_id,
            party_size = pending.party_size,
            remaining,
            "Reservation confirmed"
        );

        self.notify(&reservation, &schedule).await;
        Ok(reservation)
    }

    /// Reservations of the signed-in user, newest first
    pub async fn list_mine(&self, user: &User) -> AppResult<Vec<Reservation>> {
        self.repository.reservations.list_by_user(&user.id).await
    }

    /// All reservations, optionally for one schedule (admin)
    pub async fn list_admin(&self, schedule_id: Option<&str>) -> AppResult<Vec<Reservation>> {
        self.repository.reservations.list_by_schedule(schedule_id).await
    }

    async fn give_back(&self, schedule_id: &str, count: u32) {
        if let Err(e) = self.repository.schedules.release_slots(schedule_id, count).await {
            tracing::error!(schedule_id, count, "Failed to release slots: {}", e);
        }
    }

    async fn notify(&self, reservation: &Reservation, schedule: &crate::models::schedule::Schedule) {
        if !self.email.is_enabled() {
            return;
        }
        let recipient = match self.repository.users.find(&reservation.user_id).await {
            Ok(Some(user)) => user.email,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(reservation = %reservation.id, "Could not load user for email: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .email
            .send_reservation_confirmation(&recipient, reservation, schedule)
            .await
        {
            tracing::warn!(reservation = %reservation.id, "Confirmation email failed: {}", e);
        }
    }
}
