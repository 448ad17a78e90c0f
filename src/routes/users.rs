use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::AppResult;
use crate::registry::{self, MessageResponse, RecipientsResponse, ThresholdWarningRequest};
use crate::state::AppState;
use crate::store::PgStore;

#[utoipa::path(
    post,
    path = "/user/setThresholdWarning",
    tag = "users",
    request_body = ThresholdWarningRequest,
    responses(
        (status = 200, description = "Opt-in flag updated", body = MessageResponse),
        (status = 400, description = "Missing email or invalid flag", body = crate::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn set_threshold_warning(
    State(store): State<PgStore>,
    Json(payload): Json<ThresholdWarningRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(registry::set_threshold_warning(&store, payload).await?))
}

#[utoipa::path(
    get,
    path = "/user/getThresholdRecipients",
    tag = "users",
    responses((status = 200, description = "Users receiving threshold alerts", body = RecipientsResponse))
)]
pub(crate) async fn threshold_recipients(
    State(store): State<PgStore>,
) -> AppResult<Json<RecipientsResponse>> {
    Ok(Json(registry::threshold_recipients(&store).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/setThresholdWarning", post(set_threshold_warning))
        .route("/user/setThresholdRecipient", post(set_threshold_warning))
        .route("/user/getThresholdRecipients", get(threshold_recipients))
}
