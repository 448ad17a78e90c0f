use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "airq-server", description = "Air-quality sensor history API"),
    paths(
        crate::routes::health::healthz_handler,
        crate::routes::sensors::sensor_history,
        crate::routes::sensors::current_data,
        crate::routes::sensors::list_devices,
        crate::routes::sensors::add_device,
        crate::routes::sensors::edit_device,
        crate::routes::sensors::delete_device,
        crate::routes::users::set_threshold_warning,
        crate::routes::users::threshold_recipients,
    ),
    components(schemas(
        crate::routes::health::HealthResponse,
        crate::routes::sensors::CurrentDataResponse,
        crate::history::HistoryResponse,
        crate::history::HistoryPoint,
        crate::registry::DeviceSummary,
        crate::registry::DeviceListResponse,
        crate::registry::AddDeviceRequest,
        crate::registry::EditDeviceRequest,
        crate::registry::ThresholdWarningRequest,
        crate::registry::MessageResponse,
        crate::registry::RecipientsResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "sensors", description = "Sensor registry, history and current readings"),
        (name = "users", description = "Threshold alert opt-in")
    )
)]
struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or(serde_json::Value::Null)
}

async fn openapi_handler() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}
