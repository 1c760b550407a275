//! User endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::user::{UpdateRole, User},
};

use super::AuthenticatedUser;

/// Current user, created on first sign-in
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Stored user record", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.users.ensure_user(&claims).await?;
    Ok(Json(user))
}

/// Change a user's role
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateRole,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn update_role(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(data): Json<UpdateRole>,
) -> AppResult<Json<User>> {
    let actor = state.services.users.require_admin(&claims).await?;
    let user = state.services.users.set_role(&actor, &id, data.role).await?;
    Ok(Json(user))
}
