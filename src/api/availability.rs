//! Visitor availability endpoint

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::schedule::{AvailabilityQuery, OfferedSlot},
};

/// Bookable slots for a visit type and party size
#[utoipa::path(
    get,
    path = "/availability",
    tag = "availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Offerable slots, possibly empty", body = Vec<OfferedSlot>),
        (status = 400, description = "Invalid query", body = crate::error::ErrorResponse)
    )
)]
pub async fn search(
    State(state): State<crate::AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<Vec<OfferedSlot>>> {
    let slots = state.services.availability.search(&query).await?;
    Ok(Json(slots))
}
