#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Aqi,
    Co,
    Co2,
    Hcho,
    Hum,
    Pm0_3,
    Pm10,
    Pm1_0,
    Pm2_5,
    Temp,
    Tvoc,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::Aqi,
        Metric::Co,
        Metric::Co2,
        Metric::Hcho,
        Metric::Hum,
        Metric::Pm0_3,
        Metric::Pm10,
        Metric::Pm1_0,
        Metric::Pm2_5,
        Metric::Temp,
        Metric::Tvoc,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == normalized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aqi => "aqi",
            Self::Co => "co",
            Self::Co2 => "co2",
            Self::Hcho => "hcho",
            Self::Hum => "hum",
            Self::Pm0_3 => "pm0_3",
            Self::Pm10 => "pm10",
            Self::Pm1_0 => "pm1_0",
            Self::Pm2_5 => "pm2_5",
            Self::Temp => "temp",
            Self::Tvoc => "tvoc",
        }
    }

    /// Column in the `readings` table. Only ever interpolated from this match.
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Aqi => "aqi",
            Self::Co => "co",
            Self::Co2 => "co2",
            Self::Hcho => "hcho",
            Self::Hum => "humidity",
            Self::Pm0_3 => "pm0_3",
            Self::Pm10 => "pm10",
            Self::Pm1_0 => "pm1_0",
            Self::Pm2_5 => "pm2_5",
            Self::Temp => "temperature",
            Self::Tvoc => "tvoc",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
