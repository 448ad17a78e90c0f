use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::{classify_status, DeviceStatus, SensorReading};
use crate::services::alerts::{AlertCoordinator, AlertNotifier};
use crate::store::DeviceRecord;

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 120;
pub const MIN_POLL_INTERVAL_SECONDS: u64 = 10;

/// Device registry and reading sink used by the collector and alerting.
pub trait DeviceStore: Send + Sync {
    fn active_devices(&self) -> impl Future<Output = Result<Vec<DeviceRecord>>> + Send;

    fn insert_reading(
        &self,
        device_id: &str,
        recorded_at: DateTime<Utc>,
        reading: &SensorReading,
    ) -> impl Future<Output = Result<()>> + Send;

    fn threshold_recipients(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Fetches the raw status payload of one device.
pub trait DeviceStatusSource: Send + Sync {
    fn fetch_status(&self, device: &DeviceRecord)
        -> impl Future<Output = Result<JsonValue>> + Send;
}

/// Reads device status through a LAN gateway that speaks the vendor protocol.
#[derive(Debug, Clone)]
pub struct HttpBridgeSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBridgeSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build device bridge client")?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn status_url(&self, device_id: &str) -> String {
        format!("{}/devices/{}/status", self.base_url, device_id)
    }
}

impl DeviceStatusSource for HttpBridgeSource {
    async fn fetch_status(&self, device: &DeviceRecord) -> Result<JsonValue> {
        let mut request = self.http.get(self.status_url(&device.device_id));
        if let Some(ip) = device.ip_address.as_deref() {
            request = request.query(&[("ip", ip)]);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("bridge request failed for {}", device.device_id))?
            .error_for_status()
            .with_context(|| format!("bridge rejected status for {}", device.device_id))?;
        response
            .json::<JsonValue>()
            .await
            .with_context(|| format!("invalid bridge payload for {}", device.device_id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub polled: usize,
    pub stored: usize,
    pub offline: usize,
    pub failed: usize,
}

pub async fn collect_once<St, Src, N>(
    store: &St,
    source: &Src,
    alerts: &AlertCoordinator<N>,
) -> Result<CollectionSummary>
where
    St: DeviceStore,
    Src: DeviceStatusSource,
    N: AlertNotifier,
{
    collect_once_at(store, source, alerts, Utc::now()).await
}

/// One polling pass. Only listing devices can fail the pass; per-device
/// problems are logged and counted.
pub async fn collect_once_at<St, Src, N>(
    store: &St,
    source: &Src,
    alerts: &AlertCoordinator<N>,
    now: DateTime<Utc>,
) -> Result<CollectionSummary>
where
    St: DeviceStore,
    Src: DeviceStatusSource,
    N: AlertNotifier,
{
    let devices = store.active_devices().await?;
    let mut summary = CollectionSummary::default();

    for device in &devices {
        summary.polled += 1;
        let device_id = device.device_id.as_str();

        let status = match source.fetch_status(device).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(device_id, error = %err, "failed to fetch device status");
                summary.failed += 1;
                continue;
            }
        };

        let dps = match classify_status(&status) {
            DeviceStatus::Readings(dps) => dps,
            DeviceStatus::Offline => {
                tracing::info!(device_id, "device offline or idle; skipping");
                summary.offline += 1;
                continue;
            }
            DeviceStatus::Error(message) => {
                tracing::warn!(device_id, error = %message, "device reported an error");
                summary.failed += 1;
                continue;
            }
        };

        let reading = SensorReading::from_dps(&dps);
        if let Err(err) = store.insert_reading(device_id, now, &reading).await {
            tracing::warn!(device_id, error = %err, "failed to store reading");
            summary.failed += 1;
            continue;
        }
        summary.stored += 1;

        alerts.process(store, device_id, &reading, now).await;
    }

    tracing::info!(
        polled = summary.polled,
        stored = summary.stored,
        offline = summary.offline,
        failed = summary.failed,
        "collection pass finished"
    );
    Ok(summary)
}

pub struct CollectorService<St, Src, N> {
    store: St,
    source: Src,
    alerts: Arc<AlertCoordinator<N>>,
    interval: Duration,
}

impl<St, Src, N> CollectorService<St, Src, N>
where
    St: DeviceStore + 'static,
    Src: DeviceStatusSource + 'static,
    N: AlertNotifier + 'static,
{
    pub fn new(
        store: St,
        source: Src,
        alerts: Arc<AlertCoordinator<N>>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            alerts,
            interval,
        }
    }

    pub fn start(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = collect_once(&self.store, &self.source, &self.alerts).await {
                            tracing::warn!(error = %err, "collector tick failed");
                        }
                    }
                }
            }
        })
    }
}
