//! Visit type catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::visit_type::{
        CreateVisitType, ReorderVisitTypes, UpdateVisitType, VisitType, VisitTypeQuery,
    },
};

use super::AuthenticatedUser;

/// List visit types in display order
#[utoipa::path(
    get,
    path = "/visit-types",
    tag = "visit_types",
    params(VisitTypeQuery),
    responses(
        (status = 200, description = "Visit types", body = Vec<VisitType>),
        (status = 403, description = "Inactive entries requested without admin rights")
    )
)]
pub async fn list_visit_types(
    State(state): State<crate::AppState>,
    user: Option<AuthenticatedUser>,
    Query(query): Query<VisitTypeQuery>,
) -> AppResult<Json<Vec<VisitType>>> {
    if query.include_inactive {
        let claims = user.map(|AuthenticatedUser(claims)| claims).ok_or_else(|| {
            crate::error::AppError::Authentication("Sign in to see inactive visit types".to_string())
        })?;
        state.services.users.require_admin(&claims).await?;
    }
    let visit_types = state.services.visit_types.list(query.include_inactive).await?;
    Ok(Json(visit_types))
}

/// Get a visit type
#[utoipa::path(
    get,
    path = "/visit-types/{id}",
    tag = "visit_types",
    params(("id" = String, Path, description = "Visit type ID")),
    responses(
        (status = 200, description = "Visit type", body = VisitType),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_visit_type(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<VisitType>> {
    let visit_type = state.services.visit_types.get(&id).await?;
    Ok(Json(visit_type))
}

/// Create a visit type and its payment product
#[utoipa::path(
    post,
    path = "/visit-types",
    tag = "visit_types",
    security(("bearer_auth" = [])),
    request_body = CreateVisitType,
    responses(
        (status = 201, description = "Visit type created", body = VisitType),
        (status = 409, description = "A visit type with this name exists")
    )
)]
pub async fn create_visit_type(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateVisitType>,
) -> AppResult<(StatusCode, Json<VisitType>)> {
    state.services.users.require_admin(&claims).await?;
    let visit_type = state.services.visit_types.create(&data).await?;
    Ok((StatusCode::CREATED, Json(visit_type)))
}

/// Update a visit type (merge)
#[utoipa::path(
    put,
    path = "/visit-types/{id}",
    tag = "visit_types",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Visit type ID")),
    request_body = UpdateVisitType,
    responses(
        (status = 200, description = "Visit type updated", body = VisitType)
    )
)]
pub async fn update_visit_type(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(data): Json<UpdateVisitType>,
) -> AppResult<Json<VisitType>> {
    state.services.users.require_admin(&claims).await?;
    let visit_type = state.services.visit_types.update(&id, &data).await?;
    Ok(Json(visit_type))
}

/// Delete a visit type; its payment product is archived
#[utoipa::path(
    delete,
    path = "/visit-types/{id}",
    tag = "visit_types",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Visit type ID")),
    responses(
        (status = 204, description = "Visit type deleted")
    )
)]
pub async fn delete_visit_type(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.services.users.require_admin(&claims).await?;
    state.services.visit_types.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rewrite the catalog display order
#[utoipa::path(
    put,
    path = "/visit-types/order",
    tag = "visit_types",
    security(("bearer_auth" = [])),
    request_body = ReorderVisitTypes,
    responses(
        (status = 200, description = "Catalog in its new order", body = Vec<VisitType>)
    )
)]
pub async fn reorder_visit_types(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<ReorderVisitTypes>,
) -> AppResult<Json<Vec<VisitType>>> {
    state.services.users.require_admin(&claims).await?;
    let visit_types = state.services.visit_types.reorder(&data.ids).await?;
    Ok(Json(visit_types))
}
