pub mod aggregate;
pub mod period;

use chrono::{DateTime, Utc};
use std::future::Future;

use crate::error::{AppError, AppResult};
use crate::metrics::Metric;

pub use aggregate::{
    aggregate, AggregatedPoint, Aggregation, RawPoint, RawTimestamp, RawValue, Sample,
};
pub use period::{resolve_window, resolve_window_at, Granularity, Period, TimeWindow};

pub const NO_DATA_MESSAGE: &str = "No data for the selected range";

/// Raw point source for history queries.
pub trait HistoryStore: Send + Sync {
    fn device_exists(&self, device_id: &str) -> impl Future<Output = anyhow::Result<bool>> + Send;

    /// Points for `[start, end]`, both ends inclusive.
    fn sensor_history(
        &self,
        device_id: &str,
        metric: Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<Vec<RawPoint>>> + Send;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct HistoryPoint {
    pub ts: String,
    pub avg: Option<f64>,
}

impl From<AggregatedPoint> for HistoryPoint {
    fn from(point: AggregatedPoint) -> Self {
        Self {
            ts: point.bucket_start,
            avg: point.average,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct HistoryResponse {
    pub success: bool,
    pub device_id: String,
    pub metric: String,
    pub period: String,
    pub granularity: String,
    pub count: usize,
    pub data: Vec<HistoryPoint>,
    pub message: Option<String>,
}

pub async fn build_history_response<S: HistoryStore>(
    store: &S,
    device_id: &str,
    metric: &str,
    period: &str,
) -> AppResult<HistoryResponse> {
    build_history_response_at(store, device_id, metric, period, Utc::now()).await
}

pub async fn build_history_response_at<S: HistoryStore>(
    store: &S,
    device_id: &str,
    metric: &str,
    period: &str,
    now: DateTime<Utc>,
) -> AppResult<HistoryResponse> {
    let metric = Metric::parse(metric).ok_or_else(|| AppError::bad_request("Invalid metric"))?;
    let window = resolve_window_at(period, now).ok_or_else(|| {
        AppError::bad_request("Invalid period. Use hour|day|week|month|year")
    })?;

    let exists = store
        .device_exists(device_id)
        .await
        .map_err(AppError::internal)?;
    if !exists {
        return Err(AppError::not_found("Device not found"));
    }

    let raw = store
        .sensor_history(device_id, metric, window.start, window.end)
        .await
        .map_err(AppError::internal)?;
    let raw_count = raw.len();
    let aggregation = aggregate(&raw, window.period.as_str(), Some(&window), true);

    let data: Vec<HistoryPoint> = aggregation
        .series
        .into_iter()
        .map(HistoryPoint::from)
        .collect();

    tracing::debug!(
        device_id,
        metric = %metric,
        period = window.period.as_str(),
        raw_points = raw_count,
        buckets = data.len(),
        "built history response"
    );

    Ok(HistoryResponse {
        success: true,
        device_id: device_id.to_string(),
        metric: metric.as_str().to_string(),
        period: window.period.as_str().to_string(),
        granularity: aggregation.granularity.as_str().to_string(),
        count: data.len(),
        message: data.is_empty().then(|| NO_DATA_MESSAGE.to_string()),
        data,
    })
}
