//! Business logic services

pub mod availability;
pub mod email;
pub mod payments;
pub mod pending;
pub mod reservations;
pub mod schedules;
pub mod users;
pub mod visit_types;

use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub visit_types: visit_types::VisitTypesService,
    pub schedules: schedules::SchedulesService,
    pub availability: availability::AvailabilityService,
    pub reservations: reservations::ReservationsService,
    pub users: users::UsersService,
    pub email: email::EmailService,
    repository: Repository,
}

impl Services {
    /// Wire every service over the given store and external collaborators
    pub fn new(
        repository: Repository,
        payments: Arc<dyn payments::PaymentProvider>,
        pending: Arc<dyn pending::PendingBookingStore>,
        config: &AppConfig,
    ) -> AppResult<Self> {
        let timezone: Tz = config.booking.timezone.parse().map_err(|e| {
            AppError::Internal(format!(
                "Invalid booking.timezone {}: {}",
                config.booking.timezone, e
            ))
        })?;

        let email = email::EmailService::new(config.email.clone());
        let users = users::UsersService::new(
            repository.clone(),
            payments.clone(),
            config.auth.bootstrap_admins.clone(),
        );
        let settings = reservations::BookingSettings {
            timezone,
            checkout_ttl: Duration::from_secs(config.booking.checkout_ttl_seconds),
            hold_grace: Duration::from_secs(config.booking.hold_grace_seconds),
            return_url: config.payment.return_url.clone(),
            webhook_secret: config.payment.webhook_secret.clone(),
        };

        Ok(Self {
            visit_types: visit_types::VisitTypesService::new(
                repository.clone(),
                payments.clone(),
                config.payment.currency.clone(),
            ),
            schedules: schedules::SchedulesService::new(repository.clone()),
            availability: availability::AvailabilityService::new(repository.clone(), timezone),
            reservations: reservations::ReservationsService::new(
                repository.clone(),
                payments,
                pending,
                users.clone(),
                email.clone(),
                settings,
            ),
            users,
            email,
            repository,
        })
    }

    /// Check the document store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.store.ping().await
    }
}
