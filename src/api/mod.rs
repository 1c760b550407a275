//! API handlers for Papilio REST endpoints

pub mod availability;
pub mod health;
pub mod openapi;
pub mod payments;
pub mod reservations;
pub mod schedules;
pub mod users;
pub mod visit_types;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::IdentityClaims, AppState};

/// Extractor for the signed-in identity from the provider's JWT
pub struct AuthenticatedUser(pub IdentityClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = IdentityClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Visit types
        .route(
            "/visit-types",
            get(visit_types::list_visit_types).post(visit_types::create_visit_type),
        )
        .route("/visit-types/order", put(visit_types::reorder_visit_types))
        .route(
            "/visit-types/:id",
            get(visit_types::get_visit_type)
                .put(visit_types::update_visit_type)
                .delete(visit_types::delete_visit_type),
        )
        // Schedules
        .route("/schedules", get(schedules::list_schedules))
        .route("/schedules/individual", post(schedules::create_individual))
        .route("/schedules/bulk", post(schedules::create_bulk))
        .route(
            "/schedules/:id",
            get(schedules::get_schedule)
                .put(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        .route("/schedules/:id/active", put(schedules::set_schedule_active))
        // Availability
        .route("/availability", get(availability::search))
        // Reservations
        .route("/reservations", get(reservations::list_reservations))
        .route("/reservations/me", get(reservations::my_reservations))
        .route("/reservations/checkout", post(reservations::start_checkout))
        .route("/reservations/confirm", post(reservations::confirm))
        // Payments
        .route("/payments/webhook", post(payments::webhook))
        // Users
        .route("/users/me", get(users::me))
        .route("/users/:id/role", put(users::update_role))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
