//! Reservation endpoints: checkout, confirmation and listings

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        booking::{CheckoutRequest, CheckoutResponse, ConfirmRequest},
        reservation::{Reservation, ReservationQuery},
    },
};

use super::AuthenticatedUser;

/// Start an embedded checkout for a schedule
#[utoipa::path(
    post,
    path = "/reservations/checkout",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Checkout session created", body = CheckoutResponse),
        (status = 409, description = "Not enough slots left", body = crate::error::ErrorResponse),
        (status = 422, description = "Schedule not bookable", body = crate::error::ErrorResponse)
    )
)]
pub async fn start_checkout(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<CheckoutResponse>)> {
    let user = state.services.users.ensure_user(&claims).await?;
    let response = state.services.reservations.start_checkout(&user, &request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Confirm a paid checkout session; safe to repeat
#[utoipa::path(
    post,
    path = "/reservations/confirm",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Reservation", body = Reservation),
        (status = 409, description = "Not enough slots left", body = crate::error::ErrorResponse),
        (status = 422, description = "Payment not completed", body = crate::error::ErrorResponse)
    )
)]
pub async fn confirm(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ConfirmRequest>,
) -> AppResult<Json<Reservation>> {
    let user = state.services.users.ensure_user(&claims).await?;
    let reservation = state
        .services
        .reservations
        .confirm_session(&user, &request.session_id)
        .await?;
    Ok(Json(reservation))
}

/// Reservations of the signed-in user
#[utoipa::path(
    get,
    path = "/reservations/me",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own reservations, newest first", body = Vec<Reservation>)
    )
)]
pub async fn my_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Reservation>>> {
    let user = state.services.users.ensure_user(&claims).await?;
    let reservations = state.services.reservations.list_mine(&user).await?;
    Ok(Json(reservations))
}

/// All reservations, optionally for one schedule
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Reservations, newest first", body = Vec<Reservation>)
    )
)]
pub async fn list_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<Vec<Reservation>>> {
    state.services.users.require_admin(&claims).await?;
    let reservations = state
        .services
        .reservations
        .list_admin(query.schedule_id.as_deref())
        .await?;
    Ok(Json(reservations))
}
