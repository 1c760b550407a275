//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{availability, health, payments, reservations, schedules, users, visit_types};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Papilio API",
        version = "1.0.0",
        description = "Butterfly park visits: catalog, schedules and reservations",
        contact(name = "Papilio Team", email = "info@papilio.org")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Visit types
        visit_types::list_visit_types,
        visit_types::get_visit_type,
        visit_types::create_visit_type,
        visit_types::update_visit_type,
        visit_types::delete_visit_type,
        visit_types::reorder_visit_types,
        // Schedules
        schedules::list_schedules,
        schedules::get_schedule,
        schedules::create_individual,
        schedules::create_bulk,
        schedules::update_schedule,
        schedules::set_schedule_active,
        schedules::delete_schedule,
        // Availability
        availability::search,
        // Reservations
        reservations::start_checkout,
        reservations::confirm,
        reservations::my_reservations,
        reservations::list_reservations,
        // Payments
        payments::webhook,
        // Users
        users::me,
        users::update_role,
    ),
    components(
        schemas(
            // Visit types
            crate::models::visit_type::VisitType,
            crate::models::visit_type::CreateVisitType,
            crate::models::visit_type::UpdateVisitType,
            crate::models::visit_type::ReorderVisitTypes,
            // Schedules
            crate::models::schedule::Schedule,
            crate::models::schedule::ScheduleWindow,
            crate::models::schedule::OfferedSlot,
            crate::models::schedule::CreateIndividualSchedule,
            crate::models::schedule::CreateBulkSchedule,
            crate::models::schedule::UpdateSchedule,
            crate::models::schedule::SetScheduleActive,
            crate::models::schedule::BulkScheduleResult,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::Attendee,
            crate::models::reservation::PaymentStatus,
            crate::models::booking::CheckoutRequest,
            crate::models::booking::CheckoutResponse,
            crate::models::booking::ConfirmRequest,
            payments::WebhookAck,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::UpdateRole,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "visit_types", description = "Visit type catalog"),
        (name = "schedules", description = "Schedule generation and management"),
        (name = "availability", description = "Visitor slot search"),
        (name = "reservations", description = "Checkout and reservations"),
        (name = "payments", description = "Payment provider callbacks"),
        (name = "users", description = "User accounts")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
