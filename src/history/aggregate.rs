use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

use super::period::{Granularity, TimeWindow};

/// Averages are always reported with this many decimals so that tiny
/// concentrations (formaldehyde around 0.0001) stay visible.
pub const AVERAGE_DECIMALS: i32 = 6;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Instant(DateTime<Utc>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

/// A point as handed over by a data store. Either field may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub timestamp: Option<RawTimestamp>,
    pub value: Option<RawValue>,
}

impl RawPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp: Some(RawTimestamp::Instant(timestamp)),
            value: Some(RawValue::Number(value)),
        }
    }

    pub fn from_text(timestamp: impl Into<String>, value: RawValue) -> Self {
        Self {
            timestamp: Some(RawTimestamp::Text(timestamp.into())),
            value: Some(value),
        }
    }

    /// The single validation step between the store and the engine.
    pub fn normalize(&self) -> Option<Sample> {
        let timestamp = match self.timestamp.as_ref()? {
            RawTimestamp::Instant(ts) => *ts,
            RawTimestamp::Text(raw) => parse_timestamp(raw)?,
        };
        let value = match self.value.as_ref()? {
            RawValue::Number(value) => *value,
            RawValue::Text(raw) => raw.trim().parse::<f64>().ok()?,
        };
        if !value.is_finite() {
            return None;
        }
        Some(Sample { timestamp, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Accepts RFC 3339 (`Z` or offset), ISO-8601 with `T` or space, and naive
/// datetimes or dates, which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    let naive_raw = raw.strip_suffix('Z').unwrap_or(raw);
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive_raw, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive_raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

pub fn bucket_key(bucket_start: DateTime<Utc>) -> String {
    bucket_start.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Round half away from zero.
pub fn round_average(value: f64) -> f64 {
    let scale = 10f64.powi(AVERAGE_DECIMALS);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AggregatedPoint {
    #[serde(rename = "ts")]
    pub bucket_start: String,
    #[serde(rename = "avg")]
    pub average: Option<f64>,
    #[serde(rename = "n")]
    pub sample_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub granularity: Granularity,
    pub series: Vec<AggregatedPoint>,
}

#[derive(Debug, Default, Clone, Copy)]
struct BucketTotals {
    sum: f64,
    count: u64,
}

impl BucketTotals {
    fn to_point(self, bucket_start: DateTime<Utc>) -> AggregatedPoint {
        let average = if self.count > 0 {
            Some(round_average(self.sum / self.count as f64))
        } else {
            None
        };
        AggregatedPoint {
            bucket_start: bucket_key(bucket_start),
            average,
            sample_count: self.count,
        }
    }
}

/// Buckets `points` at the granularity implied by `period` and averages
/// each bucket.
///
/// Without `fill_gaps` (or without a window) only buckets holding samples
/// are returned. With both, every boundary from the window start rounded up
/// to the window end rounded down is emitted, empty ones with `average`
/// unset; samples whose bucket lies outside that range are dropped.
pub fn aggregate(
    points: &[RawPoint],
    period: &str,
    window: Option<&TimeWindow>,
    fill_gaps: bool,
) -> Aggregation {
    let granularity = Granularity::for_period_name(period);

    let mut buckets: BTreeMap<DateTime<Utc>, BucketTotals> = BTreeMap::new();
    for sample in points.iter().filter_map(RawPoint::normalize) {
        let totals = buckets.entry(granularity.floor(sample.timestamp)).or_default();
        totals.sum += sample.value;
        totals.count += 1;
    }

    let series = match window {
        Some(window) if fill_gaps => {
            dense_series(&buckets, granularity, window.start, window.end)
        }
        _ => buckets
            .iter()
            .map(|(bucket_start, totals)| totals.to_point(*bucket_start))
            .collect(),
    };

    Aggregation {
        granularity,
        series,
    }
}

fn dense_series(
    buckets: &BTreeMap<DateTime<Utc>, BucketTotals>,
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<AggregatedPoint> {
    let first = granularity.ceil(start);
    let last = granularity.floor(end);
    if first > last {
        return Vec::new();
    }

    let step = granularity.step();
    let expected = ((last - first).num_seconds() / step.num_seconds()) as usize + 1;
    let mut series = Vec::with_capacity(expected);
    let mut cursor = first;
    while cursor <= last {
        let totals = buckets.get(&cursor).copied().unwrap_or_default();
        series.push(totals.to_point(cursor));
        cursor += step;
    }
    series
}
