use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::{AppConfig, DEFAULT_DEVICE_TIMEOUT_SECONDS, DEFAULT_HISTORY_POINT_LIMIT};
use crate::db;
use crate::history::{HistoryStore, RawPoint};
use crate::metrics::Metric;
use crate::models::SensorReading;
use crate::registry::{AddOutcome, DeviceSummary, NewDevice, RegistryStore};
use crate::services::alerts::{AlertNotifier, DEFAULT_ALERT_COOLDOWN_SECONDS};
use crate::services::collector::{DeviceStatusSource, DeviceStore, DEFAULT_POLL_INTERVAL_SECONDS};
use crate::state::AppState;
use crate::store::DeviceRecord;

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgresql://postgres@localhost/postgres".to_string(),
        poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
        run_collector: true,
        device_bridge_url: None,
        device_timeout_seconds: DEFAULT_DEVICE_TIMEOUT_SECONDS,
        alert_cooldown_seconds: DEFAULT_ALERT_COOLDOWN_SECONDS,
        history_point_limit: DEFAULT_HISTORY_POINT_LIMIT,
    }
}

pub fn test_state() -> AppState {
    let config = test_config();
    let pool = db::connect_lazy(&config.database_url).expect("connect_lazy");
    AppState::new(config, pool)
}

pub type InsertedReading = (String, DateTime<Utc>, SensorReading);

struct MemoryDevice {
    record: DeviceRecord,
    room: Option<String>,
    active: bool,
}

#[derive(Default)]
struct MemoryState {
    devices: BTreeMap<String, MemoryDevice>,
    points: HashMap<(String, Metric), Vec<RawPoint>>,
    inserted: Vec<InsertedReading>,
    /// email -> threshold warning opt-in
    users: BTreeMap<String, bool>,
}

/// In-memory stand-in for `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    lookups: AtomicUsize,
    failing: bool,
}

impl MemoryStore {
    pub fn with_device(self, device_id: &str) -> Self {
        self.state.lock().unwrap().devices.insert(
            device_id.to_string(),
            MemoryDevice {
                record: DeviceRecord {
                    device_id: device_id.to_string(),
                    name: device_id.to_string(),
                    ip_address: None,
                },
                room: None,
                active: true,
            },
        );
        self
    }

    /// Registered user who has not opted into threshold alerts.
    pub fn with_user(self, email: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(email.to_string(), false);
        self
    }

    pub fn with_recipients(self, emails: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for email in emails {
                state.users.insert(email.to_string(), true);
            }
        }
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn push_point(&self, device_id: &str, metric: Metric, point: RawPoint) {
        self.state
            .lock()
            .unwrap()
            .points
            .entry((device_id.to_string(), metric))
            .or_default()
            .push(point);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn inserted(&self) -> Vec<InsertedReading> {
        self.state.lock().unwrap().inserted.clone()
    }

    fn touch(&self) -> Result<()> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(anyhow!("memory store configured to fail"));
        }
        Ok(())
    }

    fn touch_db(&self) -> Result<(), sqlx::Error> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }
}

impl HistoryStore for MemoryStore {
    async fn device_exists(&self, device_id: &str) -> Result<bool> {
        self.touch()?;
        Ok(self.state.lock().unwrap().devices.contains_key(device_id))
    }

    async fn sensor_history(
        &self,
        device_id: &str,
        metric: Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawPoint>> {
        self.touch()?;
        let state = self.state.lock().unwrap();
        let points = state
            .points
            .get(&(device_id.to_string(), metric))
            .cloned()
            .unwrap_or_default();
        Ok(points
            .into_iter()
            .filter(|point| match point.normalize() {
                Some(sample) => sample.timestamp >= start && sample.timestamp <= end,
                None => true,
            })
            .collect())
    }
}

impl DeviceStore for MemoryStore {
    async fn active_devices(&self) -> Result<Vec<DeviceRecord>> {
        self.touch()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .devices
            .values()
            .filter(|device| device.active)
            .map(|device| device.record.clone())
            .collect())
    }

    async fn insert_reading(
        &self,
        device_id: &str,
        recorded_at: DateTime<Utc>,
        reading: &SensorReading,
    ) -> Result<()> {
        self.touch()?;
        self.state
            .lock()
            .unwrap()
            .inserted
            .push((device_id.to_string(), recorded_at, reading.clone()));
        Ok(())
    }

    async fn threshold_recipients(&self) -> Result<Vec<String>> {
        self.touch()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(email, _)| email.clone())
            .collect())
    }
}

impl RegistryStore for MemoryStore {
    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, sqlx::Error> {
        self.touch_db()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .devices
            .values()
            .filter(|device| device.active)
            .map(|device| DeviceSummary {
                device_id: device.record.device_id.clone(),
                name: device.record.name.clone(),
                room: device.room.clone(),
                ip_address: device.record.ip_address.clone(),
            })
            .collect())
    }

    async fn add_device(&self, device: &NewDevice) -> Result<AddOutcome, sqlx::Error> {
        self.touch_db()?;
        let mut state = self.state.lock().unwrap();
        let outcome = match state.devices.get(&device.device_id) {
            Some(existing) if existing.active => return Ok(AddOutcome::AlreadyActive),
            Some(_) => AddOutcome::Reactivated,
            None => AddOutcome::Created,
        };
        state.devices.insert(
            device.device_id.clone(),
            MemoryDevice {
                record: DeviceRecord {
                    device_id: device.device_id.clone(),
                    name: device.name.clone(),
                    ip_address: device.ip_address.clone(),
                },
                room: device.room.clone(),
                active: true,
            },
        );
        Ok(outcome)
    }

    async fn update_device(
        &self,
        device_id: &str,
        name: Option<&str>,
        room: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        self.touch_db()?;
        let mut state = self.state.lock().unwrap();
        let Some(device) = state.devices.get_mut(device_id) else {
            return Ok(false);
        };
        if let Some(name) = name {
            device.record.name = name.to_string();
        }
        if let Some(room) = room {
            device.room = Some(room.to_string());
        }
        Ok(true)
    }

    async fn deactivate_device(&self, device_id: &str) -> Result<bool, sqlx::Error> {
        self.touch_db()?;
        let mut state = self.state.lock().unwrap();
        match state.devices.get_mut(device_id) {
            Some(device) => {
                device.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_threshold_warning(&self, email: &str, enabled: bool) -> Result<bool, sqlx::Error> {
        self.touch_db()?;
        let mut state = self.state.lock().unwrap();
        match state.users.get_mut(email) {
            Some(flag) => {
                *flag = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Canned gateway payloads keyed by device id; unknown devices fail.
#[derive(Default)]
pub struct StaticSource {
    statuses: HashMap<String, JsonValue>,
}

impl StaticSource {
    pub fn with_status(mut self, device_id: &str, status: JsonValue) -> Self {
        self.statuses.insert(device_id.to_string(), status);
        self
    }
}

impl DeviceStatusSource for StaticSource {
    async fn fetch_status(&self, device: &DeviceRecord) -> Result<JsonValue> {
        self.statuses
            .get(&device.device_id)
            .cloned()
            .ok_or_else(|| anyhow!("{} unreachable", device.device_id))
    }
}

pub type SentAlert = (String, String, String);

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentAlert>>,
    rejected: HashSet<String>,
}

impl RecordingNotifier {
    pub fn rejecting(mut self, recipient: &str) -> Self {
        self.rejected.insert(recipient.to_string());
        self
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().unwrap().clone()
    }
}

impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        if self.rejected.contains(recipient) {
            return Err(anyhow!("mailbox {recipient} rejected the alert"));
        }
        self.sent.lock().unwrap().push((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}
