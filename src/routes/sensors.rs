use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::history::{build_history_response, HistoryResponse};
use crate::registry::{
    self, AddDeviceRequest, DeviceListResponse, EditDeviceRequest, MessageResponse,
};
use crate::state::AppState;
use crate::store::PgStore;

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    metric: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sensor/history/{period}/{device_id}",
    tag = "sensors",
    params(
        ("period" = String, Path, description = "hour, day, week, month or year"),
        ("device_id" = String, Path, description = "Device identifier"),
        ("metric" = String, Query, description = "aqi, co, co2, hcho, hum, pm0_3, pm10, pm1_0, pm2_5, temp or tvoc")
    ),
    responses(
        (status = 200, description = "Dense bucketed history", body = HistoryResponse),
        (status = 400, description = "Invalid metric or period", body = crate::error::ErrorBody),
        (status = 404, description = "Device not found", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn sensor_history(
    State(store): State<PgStore>,
    Path((period, device_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<HistoryResponse>> {
    let metric = query.metric.unwrap_or_default();
    let response = build_history_response(&store, &device_id, &metric, &period).await?;
    Ok(Json(response))
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct CurrentDataResponse {
    pub success: bool,
    pub device_id: String,
    pub recorded_at: String,
    #[schema(value_type = Object)]
    pub data: JsonValue,
}

#[utoipa::path(
    get,
    path = "/sensor/getCurrentData/{device_id}",
    tag = "sensors",
    params(("device_id" = String, Path, description = "Device identifier")),
    responses(
        (status = 200, description = "Most recent stored reading", body = CurrentDataResponse),
        (status = 404, description = "No readings for device", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn current_data(
    State(store): State<PgStore>,
    Path(device_id): Path<String>,
) -> AppResult<Json<CurrentDataResponse>> {
    let latest = store
        .latest_reading(&device_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("No readings for device"))?;
    Ok(Json(CurrentDataResponse {
        success: true,
        recorded_at: latest
            .recorded_at
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        data: latest.reading.to_json(),
        device_id,
    }))
}

#[utoipa::path(
    get,
    path = "/sensor/getAllDevices",
    tag = "sensors",
    responses((status = 200, description = "Active devices", body = DeviceListResponse))
)]
pub(crate) async fn list_devices(
    State(store): State<PgStore>,
) -> AppResult<Json<DeviceListResponse>> {
    Ok(Json(registry::list_devices(&store).await?))
}

#[utoipa::path(
    post,
    path = "/sensor/add",
    tag = "sensors",
    request_body = AddDeviceRequest,
    responses(
        (status = 201, description = "Device added or reactivated", body = MessageResponse),
        (status = 400, description = "Missing device id", body = crate::error::ErrorBody),
        (status = 409, description = "Device already active", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn add_device(
    State(store): State<PgStore>,
    Json(payload): Json<AddDeviceRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let (status, body) = registry::add_device(&store, payload).await?;
    Ok((status, Json(body)))
}

#[utoipa::path(
    patch,
    path = "/sensor/edit/{device_id}",
    tag = "sensors",
    params(("device_id" = String, Path, description = "Device identifier")),
    request_body = EditDeviceRequest,
    responses(
        (status = 200, description = "Device updated", body = MessageResponse),
        (status = 400, description = "Nothing to update", body = crate::error::ErrorBody),
        (status = 404, description = "Device not found", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn edit_device(
    State(store): State<PgStore>,
    Path(device_id): Path<String>,
    Json(payload): Json<EditDeviceRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(
        registry::edit_device(&store, &device_id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/sensor/delete/{device_id}",
    tag = "sensors",
    params(("device_id" = String, Path, description = "Device identifier")),
    responses(
        (status = 204, description = "Device deactivated"),
        (status = 404, description = "Device not found", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn delete_device(
    State(store): State<PgStore>,
    Path(device_id): Path<String>,
) -> AppResult<StatusCode> {
    registry::delete_device(&store, &device_id).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sensor/history/{period}/{device_id}", get(sensor_history))
        .route("/sensor/getCurrentData/{device_id}", get(current_data))
        .route("/sensor/getAllDevices", get(list_devices))
        .route("/sensor/add", post(add_device))
        .route("/sensor/edit/{device_id}", patch(edit_device))
        // Older clients remove devices with a plain GET.
        .route(
            "/sensor/delete/{device_id}",
            get(delete_device).delete(delete_device),
        )
}
