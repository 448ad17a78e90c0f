use serde_json::{Map, Value as JsonValue};

use crate::metrics::Metric;

const DPS_AQI: &str = "1";
const DPS_TEMP: &str = "2";
const DPS_HUM: &str = "3";
const DPS_CO2: &str = "4";
const DPS_HCHO: &str = "5";
const DPS_PM2_5: &str = "7";
const DPS_PM1_0: &str = "8";
const DPS_PM10: &str = "9";
const DPS_TVOC: &str = "101";
const DPS_CO: &str = "102";
const DPS_PM0_3: &str = "107";

/// HCHO and TVOC are reported in thousandths (23 means 0.023).
const MILLI_SCALE: f64 = 1000.0;

pub fn aqi_label(level: i16) -> &'static str {
    match level {
        1 => "Gut",
        2 => "Mittelmäßig",
        3 => "Schlecht",
        _ => "Unknown",
    }
}

fn parse_aqi_level(value: &JsonValue) -> Option<i16> {
    let level = match value {
        JsonValue::Number(number) => number.as_i64()?,
        JsonValue::String(raw) => {
            let raw = raw.trim();
            match raw {
                "Gut" => 1,
                "Mittelmäßig" => 2,
                "Schlecht" => 3,
                _ => raw
                    .strip_prefix("level_")
                    .unwrap_or(raw)
                    .parse::<i64>()
                    .ok()?,
            }
        }
        _ => return None,
    };
    (1..=3).contains(&level).then_some(level as i16)
}

fn parse_number(value: &JsonValue) -> Option<f64> {
    let parsed = match value {
        JsonValue::Number(number) => number.as_f64()?,
        JsonValue::String(raw) => raw.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// One poll of an air-quality device, already scaled to storage units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReading {
    pub aqi: Option<i16>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub hcho: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm1_0: Option<f64>,
    pub pm10: Option<f64>,
    pub tvoc: Option<f64>,
    pub co: Option<f64>,
    pub pm0_3: Option<f64>,
}

impl SensorReading {
    pub fn from_dps(dps: &Map<String, JsonValue>) -> Self {
        let number = |key: &str| dps.get(key).and_then(parse_number);
        Self {
            aqi: dps.get(DPS_AQI).and_then(parse_aqi_level),
            temperature: number(DPS_TEMP),
            humidity: number(DPS_HUM),
            co2: number(DPS_CO2),
            hcho: number(DPS_HCHO).map(|raw| raw / MILLI_SCALE),
            pm2_5: number(DPS_PM2_5),
            pm1_0: number(DPS_PM1_0),
            pm10: number(DPS_PM10),
            tvoc: number(DPS_TVOC).map(|raw| raw / MILLI_SCALE),
            co: number(DPS_CO),
            pm0_3: number(DPS_PM0_3),
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Aqi => self.aqi.map(f64::from),
            Metric::Co => self.co,
            Metric::Co2 => self.co2,
            Metric::Hcho => self.hcho,
            Metric::Hum => self.humidity,
            Metric::Pm0_3 => self.pm0_3,
            Metric::Pm10 => self.pm10,
            Metric::Pm1_0 => self.pm1_0,
            Metric::Pm2_5 => self.pm2_5,
            Metric::Temp => self.temperature,
            Metric::Tvoc => self.tvoc,
        }
    }

    /// Keyed by metric name, AQI rendered as its label.
    pub fn to_json(&self) -> JsonValue {
        let mut data = Map::new();
        for metric in Metric::ALL {
            let value = match metric {
                Metric::Aqi => self
                    .aqi
                    .map(|level| JsonValue::from(aqi_label(level)))
                    .unwrap_or(JsonValue::Null),
                other => self
                    .value(other)
                    .map(JsonValue::from)
                    .unwrap_or(JsonValue::Null),
            };
            data.insert(metric.as_str().to_string(), value);
        }
        JsonValue::Object(data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceStatus {
    Readings(Map<String, JsonValue>),
    Offline,
    Error(String),
}

fn json_text(value: &JsonValue) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Classifies a raw status payload from a device gateway.
pub fn classify_status(status: &JsonValue) -> DeviceStatus {
    let Some(object) = status.as_object() else {
        return DeviceStatus::Offline;
    };
    if let Some(error) = object.get("Error") {
        let message = match object.get("Err") {
            Some(code) => format!("{} {}", json_text(code), json_text(error)),
            None => json_text(error),
        };
        return DeviceStatus::Error(message);
    }
    let dps = object
        .get("dps")
        .or_else(|| object.get("data").and_then(|data| data.get("dps")))
        .and_then(JsonValue::as_object);
    let Some(dps) = dps else {
        return DeviceStatus::Offline;
    };
    let all_idle = dps.values().all(|value| match value {
        JsonValue::Null => true,
        JsonValue::Number(number) => number.as_f64() == Some(0.0),
        _ => false,
    });
    if all_idle {
        return DeviceStatus::Offline;
    }
    DeviceStatus::Readings(dps.clone())
}
