use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tokio::sync::Mutex;

use crate::metrics::Metric;
use crate::models::{aqi_label, SensorReading};
use crate::services::collector::DeviceStore;

pub const DEFAULT_ALERT_COOLDOWN_SECONDS: u64 = 600;
pub const MAX_ALERT_COOLDOWN_SECONDS: u64 = 30 * 24 * 3600;

const AQI_ALERT_LEVEL: i16 = 3;

const VALUE_THRESHOLDS: [(Metric, f64); 8] = [
    (Metric::Hum, 70.0),
    (Metric::Co2, 1400.0),
    (Metric::Pm2_5, 50.0),
    (Metric::Pm10, 80.0),
    (Metric::Tvoc, 1.0),
    (Metric::Co, 2.0),
    (Metric::Hcho, 0.12),
    (Metric::Pm0_3, 80.0),
];

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdBreach {
    AqiLevel {
        level: i16,
    },
    Value {
        metric: Metric,
        value: f64,
        threshold: f64,
    },
}

impl ThresholdBreach {
    pub fn describe(&self) -> String {
        match self {
            Self::AqiLevel { level } => format!(
                "AQI level is {}, which exceeds the threshold of {}.",
                aqi_label(*level),
                aqi_label(AQI_ALERT_LEVEL)
            ),
            Self::Value {
                metric,
                value,
                threshold,
            } => format!(
                "{} value is {value}, which exceeds the threshold of {threshold}.",
                metric.as_str().to_uppercase()
            ),
        }
    }
}

pub fn threshold_breaches(reading: &SensorReading) -> Vec<ThresholdBreach> {
    let mut breaches = Vec::new();
    if let Some(level) = reading.aqi.filter(|level| *level >= AQI_ALERT_LEVEL) {
        breaches.push(ThresholdBreach::AqiLevel { level });
    }
    for (metric, threshold) in VALUE_THRESHOLDS {
        if let Some(value) = reading.value(metric).filter(|value| *value >= threshold) {
            breaches.push(ThresholdBreach::Value {
                metric,
                value,
                threshold,
            });
        }
    }
    breaches
}

/// Delivery channel for threshold alerts.
pub trait AlertNotifier: Send + Sync {
    fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl AlertNotifier for LogNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        tracing::warn!(recipient, subject, body, "sensor threshold alert");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    NoBreach,
    Suppressed,
    NoRecipients,
    Sent { delivered: usize, failed: usize },
}

/// Owns the anti-spam window shared by every device: after a batch goes
/// out, further alerts are held back until `cooldown` has passed.
#[derive(Debug)]
pub struct AlertCoordinator<N> {
    notifier: N,
    cooldown: Duration,
    last_sent: Mutex<Option<DateTime<Utc>>>,
}

impl<N: AlertNotifier> AlertCoordinator<N> {
    pub fn new(notifier: N, cooldown_seconds: u64) -> Self {
        Self {
            notifier,
            cooldown: Duration::seconds(cooldown_seconds.min(MAX_ALERT_COOLDOWN_SECONDS) as i64),
            last_sent: Mutex::new(None),
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub async fn last_sent(&self) -> Option<DateTime<Utc>> {
        *self.last_sent.lock().await
    }

    pub async fn process<S: DeviceStore>(
        &self,
        store: &S,
        device_id: &str,
        reading: &SensorReading,
        now: DateTime<Utc>,
    ) -> AlertOutcome {
        let breaches = threshold_breaches(reading);
        if breaches.is_empty() {
            return AlertOutcome::NoBreach;
        }

        let mut last_sent = self.last_sent.lock().await;
        if let Some(previous) = *last_sent {
            if now - previous <= self.cooldown {
                tracing::info!(
                    device_id,
                    breaches = breaches.len(),
                    "alert suppressed inside cooldown window"
                );
                return AlertOutcome::Suppressed;
            }
        }

        let recipients = match store.threshold_recipients().await {
            Ok(recipients) => recipients,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load threshold recipients");
                Vec::new()
            }
        };
        if recipients.is_empty() {
            tracing::info!(device_id, "no threshold recipients; alert not sent");
            return AlertOutcome::NoRecipients;
        }

        let subject = format!("Sensor Alert for {device_id}");
        let body = breaches
            .iter()
            .map(ThresholdBreach::describe)
            .collect::<Vec<_>>()
            .join("\n");
        let mut delivered = 0;
        let mut failed = 0;
        for recipient in &recipients {
            match self.notifier.notify(recipient, &subject, &body).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(recipient = %recipient, error = %err, "failed to deliver alert");
                }
            }
        }
        *last_sent = Some(now);
        AlertOutcome::Sent { delivered, failed }
    }
}
