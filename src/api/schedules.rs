//! Schedule API endpoints (individual and bulk generation, admin edits)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::schedule::{
        BulkScheduleResult, CreateBulkSchedule, CreateIndividualSchedule, Schedule,
        ScheduleQuery, SetScheduleActive, UpdateSchedule,
    },
};

use super::AuthenticatedUser;

/// List schedules
#[utoipa::path(
    get,
    path = "/schedules",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(ScheduleQuery),
    responses(
        (status = 200, description = "Schedules by date and time", body = Vec<Schedule>)
    )
)]
pub async fn list_schedules(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<Json<Vec<Schedule>>> {
    state.services.users.require_admin(&claims).await?;
    let schedules = state.services.schedules.list(&query).await?;
    Ok(Json(schedules))
}

/// Get a schedule
#[utoipa::path(
    get,
    path = "/schedules/{id}",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule", body = Schedule),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_schedule(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<Schedule>> {
    state.services.users.require_admin(&claims).await?;
    let schedule = state.services.schedules.get(&id).await?;
    Ok(Json(schedule))
}

/// Create or merge a single-slot schedule
#[utoipa::path(
    post,
    path = "/schedules/individual",
    tag = "schedules",
    security(("bearer_auth" = [])),
    request_body = CreateIndividualSchedule,
    responses(
        (status = 201, description = "Schedule saved", body = Schedule),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_individual(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateIndividualSchedule>,
) -> AppResult<(StatusCode, Json<Schedule>)> {
    state.services.users.require_admin(&claims).await?;
    let schedule = state.services.schedules.create_individual(&data).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Create or merge one schedule per day of a date range
#[utoipa::path(
    post,
    path = "/schedules/bulk",
    tag = "schedules",
    security(("bearer_auth" = [])),
    request_body = CreateBulkSchedule,
    responses(
        (status = 201, description = "Schedules saved", body = BulkScheduleResult),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 502, description = "Range partially written", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_bulk(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateBulkSchedule>,
) -> AppResult<(StatusCode, Json<BulkScheduleResult>)> {
    state.services.users.require_admin(&claims).await?;
    let result = state.services.schedules.create_bulk(&data).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Edit a schedule; bulk days become individual slots and a new date or
/// time moves the schedule to the matching key
#[utoipa::path(
    put,
    path = "/schedules/{id}",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Schedule ID")),
    request_body = UpdateSchedule,
    responses(
        (status = 200, description = "Schedule updated", body = Schedule),
        (status = 404, description = "Schedule not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Target slot taken or schedule changed meanwhile", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_schedule(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(data): Json<UpdateSchedule>,
) -> AppResult<Json<Schedule>> {
    state.services.users.require_admin(&claims).await?;
    let schedule = state.services.schedules.edit_existing(&id, &data).await?;
    Ok(Json(schedule))
}

/// Show or hide a schedule
#[utoipa::path(
    put,
    path = "/schedules/{id}/active",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Schedule ID")),
    request_body = SetScheduleActive,
    responses(
        (status = 200, description = "Schedule updated", body = Schedule)
    )
)]
pub async fn set_schedule_active(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(data): Json<SetScheduleActive>,
) -> AppResult<Json<Schedule>> {
    state.services.users.require_admin(&claims).await?;
    let schedule = state.services.schedules.set_active(&id, data.active).await?;
    Ok(Json(schedule))
}

/// Delete a schedule
#[utoipa::path(
    delete,
    path = "/schedules/{id}",
    tag = "schedules",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Schedule ID")),
    responses(
        (status = 204, description = "Schedule deleted")
    )
)]
pub async fn delete_schedule(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.services.users.require_admin(&claims).await?;
    state.services.schedules.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
