use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::future::Future;

use crate::error::{map_db_error, AppError, AppResult};
use crate::services::collector::DeviceStore;

/// Device as listed to clients.
#[derive(Debug, Clone, PartialEq, serde::Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct DeviceSummary {
    pub device_id: String,
    pub name: String,
    pub room: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub device_id: String,
    pub name: String,
    pub room: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    /// A previously removed device was switched back on with the new details.
    Reactivated,
    AlreadyActive,
}

/// Device registry and alert opt-in persistence. Errors stay as `sqlx::Error`
/// so constraint violations keep their status mapping.
pub trait RegistryStore: Send + Sync {
    fn list_devices(&self) -> impl Future<Output = Result<Vec<DeviceSummary>, sqlx::Error>> + Send;

    fn add_device(
        &self,
        device: &NewDevice,
    ) -> impl Future<Output = Result<AddOutcome, sqlx::Error>> + Send;

    /// `None` fields are left unchanged. Returns false for unknown devices.
    fn update_device(
        &self,
        device_id: &str,
        name: Option<&str>,
        room: Option<&str>,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Soft delete: readings are kept, polling stops.
    fn deactivate_device(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    fn set_threshold_warning(
        &self,
        email: &str,
        enabled: bool,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct AddDeviceRequest {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct EditDeviceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct ThresholdWarningRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    #[schema(value_type = bool)]
    pub enabled: Option<JsonValue>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct DeviceListResponse {
    pub success: bool,
    pub data: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct RecipientsResponse {
    pub success: bool,
    pub recipients: Vec<String>,
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Booleans, numbers (non-zero is true) and the usual yes/no spellings.
pub fn parse_enabled(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(enabled) => Some(*enabled),
        JsonValue::Number(number) => number.as_f64().map(|n| n != 0.0),
        JsonValue::String(raw) => Some(matches!(
            raw.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        )),
        _ => None,
    }
}

pub async fn list_devices<S: RegistryStore>(store: &S) -> AppResult<DeviceListResponse> {
    let data = store.list_devices().await.map_err(map_db_error)?;
    Ok(DeviceListResponse {
        success: true,
        data,
    })
}

pub async fn add_device<S: RegistryStore>(
    store: &S,
    request: AddDeviceRequest,
) -> AppResult<(StatusCode, MessageResponse)> {
    let device_id = trimmed(request.device_id.as_deref())
        .ok_or_else(|| AppError::bad_request("Device ID is required"))?;
    let device = NewDevice {
        name: trimmed(request.name.as_deref()).unwrap_or_else(|| device_id.clone()),
        room: trimmed(request.room.as_deref()),
        ip_address: trimmed(request.ip_address.as_deref()),
        device_id,
    };

    match store.add_device(&device).await.map_err(map_db_error)? {
        AddOutcome::Created => {
            tracing::info!(device_id = %device.device_id, "device added");
            Ok((
                StatusCode::CREATED,
                MessageResponse::ok("Sensor added successfully to db"),
            ))
        }
        AddOutcome::Reactivated => {
            tracing::info!(device_id = %device.device_id, "device reactivated");
            Ok((
                StatusCode::CREATED,
                MessageResponse::ok("Sensor reactivated"),
            ))
        }
        AddOutcome::AlreadyActive => Err(AppError::new(
            StatusCode::CONFLICT,
            "Device already exists and is active",
        )),
    }
}

pub async fn edit_device<S: RegistryStore>(
    store: &S,
    device_id: &str,
    request: EditDeviceRequest,
) -> AppResult<MessageResponse> {
    let name = trimmed(request.name.as_deref());
    let room = trimmed(request.room.as_deref());
    if name.is_none() && room.is_none() {
        return Err(AppError::bad_request("Provide at least one of: name, room"));
    }
    let updated = store
        .update_device(device_id, name.as_deref(), room.as_deref())
        .await
        .map_err(map_db_error)?;
    if !updated {
        return Err(AppError::not_found("Device not found"));
    }
    Ok(MessageResponse::ok("Device updated successfully"))
}

pub async fn delete_device<S: RegistryStore>(store: &S, device_id: &str) -> AppResult<StatusCode> {
    let removed = store
        .deactivate_device(device_id)
        .await
        .map_err(map_db_error)?;
    if !removed {
        return Err(AppError::not_found("Device not found"));
    }
    tracing::info!(device_id, "device deactivated");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_threshold_warning<S: RegistryStore>(
    store: &S,
    request: ThresholdWarningRequest,
) -> AppResult<MessageResponse> {
    let email = trimmed(request.email.as_deref())
        .ok_or_else(|| AppError::bad_request("Email is required"))?;
    let enabled = request
        .enabled
        .as_ref()
        .and_then(parse_enabled)
        .ok_or_else(|| AppError::bad_request("'enabled' must be boolean"))?;

    let updated = store
        .set_threshold_warning(&email, enabled)
        .await
        .map_err(map_db_error)?;
    if !updated {
        return Err(AppError::not_found("User not found"));
    }
    Ok(MessageResponse::ok(format!(
        "ThresholdWarning set to {enabled} for {email}"
    )))
}

pub async fn threshold_recipients<S: DeviceStore>(store: &S) -> AppResult<RecipientsResponse> {
    let recipients = store
        .threshold_recipients()
        .await
        .map_err(AppError::internal)?;
    Ok(RecipientsResponse {
        success: true,
        recipients,
    })
}
