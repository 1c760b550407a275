//! Payment provider webhook

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppResult;

#[derive(Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    /// Event type as sent by the provider
    pub event: String,
}

/// Receive a signed payment event
#[utoipa::path(
    post,
    path = "/payments/webhook",
    tag = "payments",
    request_body(content = String, description = "Raw event payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Bad signature or payload", body = crate::error::ErrorResponse),
        (status = 401, description = "No signing secret configured", body = crate::error::ErrorResponse)
    )
)]
pub async fn webhook(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok());
    let event = state
        .services
        .reservations
        .handle_webhook(&body, signature)
        .await?;
    Ok(Json(WebhookAck {
        received: true,
        event,
    }))
}
