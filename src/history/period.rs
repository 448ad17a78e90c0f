use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::Hour,
        Period::Day,
        Period::Week,
        Period::Month,
        Period::Year,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn lookback(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
            Self::Year => Duration::days(365),
        }
    }

    pub fn granularity(self) -> Granularity {
        match self {
            Self::Hour => Granularity::Minute,
            Self::Day | Self::Week => Granularity::Hour,
            Self::Month | Self::Year => Granularity::Day,
        }
    }
}

/// Bucket width. Always derived from a period, never requested directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    /// Unknown period names bucket by day.
    pub fn for_period_name(name: &str) -> Self {
        Period::parse(name)
            .map(Period::granularity)
            .unwrap_or(Self::Day)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    pub fn step(self) -> Duration {
        match self {
            Self::Minute => Duration::minutes(1),
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }

    /// Truncates to the bucket start in UTC, field by field.
    pub fn floor(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = ts.date_naive().and_time(NaiveTime::MIN).and_utc();
        let hours = Duration::hours(i64::from(ts.hour()));
        match self {
            Self::Day => midnight,
            Self::Hour => midnight + hours,
            Self::Minute => midnight + hours + Duration::minutes(i64::from(ts.minute())),
        }
    }

    /// Next boundary at or after `ts`.
    pub fn ceil(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.floor(ts);
        if floor == ts {
            floor
        } else {
            floor + self.step()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period: Period,
}

/// Returns `None` for unknown period names; callers report that as a client error.
pub fn resolve_window(name: &str) -> Option<TimeWindow> {
    resolve_window_at(name, Utc::now())
}

pub fn resolve_window_at(name: &str, now: DateTime<Utc>) -> Option<TimeWindow> {
    let period = Period::parse(name)?;
    Some(TimeWindow {
        start: now - period.lookback(),
        end: now,
        period,
    })
}
