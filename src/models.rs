use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

use crate::metrics;
use crate::sensors::SensorKind;

/// Every named value a snapshot can carry.
///
/// The declaration order is the order used for log dumps; the persisted
/// column order is given separately by [`Metric::PERSISTED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    UvIndex,
    Co2,
    Formaldehyde,
    Tvoc,
    Pm2_5,
    Pm10,
    AqiTemperature,
    AqiHumidity,
    WindSpeed,
    WindDirDegrees,
    WindDirCardinal,
    Rainfall,
    CarbonMonoxide,
    NitrogenDioxide,
    SulphurDioxide,
    Ozone,
}

impl Metric {
    /// Columns of the daily data file, after the leading timestamp.
    pub const PERSISTED: [Metric; 15] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::UvIndex,
        Metric::Co2,
        Metric::Formaldehyde,
        Metric::Tvoc,
        Metric::Pm2_5,
        Metric::Pm10,
        Metric::AqiTemperature,
        Metric::AqiHumidity,
        Metric::WindSpeed,
        Metric::WindDirDegrees,
        Metric::WindDirCardinal,
        Metric::Rainfall,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::UvIndex => "uv_index",
            Metric::Co2 => "co2",
            Metric::Formaldehyde => "formaldehyde",
            Metric::Tvoc => "tvoc",
            Metric::Pm2_5 => "pm2_5",
            Metric::Pm10 => "pm10",
            Metric::AqiTemperature => "aqi_temperature",
            Metric::AqiHumidity => "aqi_humidity",
            Metric::WindSpeed => "wind_speed",
            Metric::WindDirDegrees => "wind_dir_degrees",
            Metric::WindDirCardinal => "wind_dir_cardinal",
            Metric::Rainfall => "rainfall",
            Metric::CarbonMonoxide => "carbon_monoxide",
            Metric::NitrogenDioxide => "nitrogen_dioxide",
            Metric::SulphurDioxide => "sulphur_dioxide",
            Metric::Ozone => "ozone",
        }
    }
}

/// A single metric value as stored in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            // Keep a trailing ".0" on whole numbers so columns read as decimals
            Value::Number(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Decoded output of one sensor group, in register order
pub type Readings = Vec<(Metric, Value)>;

/// Raw registers fetched from one logical sensor during a poll cycle
#[derive(Debug, Clone)]
pub struct RawReading {
    pub sensor: SensorKind,
    pub slave: u8,
    pub address: u16,
    pub registers: Vec<u16>,
}

/// The merged state of all sensors at one point in time.
///
/// Derived values (AQI and the classification bands) are not stored; they are
/// computed from the raw fields on every access.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: OffsetDateTime,
    values: BTreeMap<Metric, Value>,
}

impl Snapshot {
    pub fn new(timestamp: OffsetDateTime) -> Self {
        Snapshot {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, metric: Metric, value: Value) {
        self.values.insert(metric, value);
    }

    pub fn merge(&mut self, readings: Readings) {
        self.values.extend(readings);
    }

    pub fn get(&self, metric: Metric) -> Option<&Value> {
        self.values.get(&metric)
    }

    pub fn number(&self, metric: Metric) -> Option<f64> {
        self.get(metric).and_then(Value::as_f64)
    }

    pub fn text(&self, metric: Metric) -> Option<&str> {
        match self.get(metric) {
            Some(Value::Text(v)) => Some(v),
            _ => None,
        }
    }

    /// Air quality index derived from the current PM2.5 reading
    pub fn aqi(&self) -> Option<f64> {
        metrics::aqi_from_pm25(self.number(Metric::Pm2_5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(25.0).to_string(), "25.0");
        assert_eq!(Value::Number(1013.5).to_string(), "1013.5");
        assert_eq!(Value::Integer(180).to_string(), "180");
        assert_eq!(Value::Text("SSW".into()).to_string(), "SSW");
    }

    #[test]
    fn test_snapshot_aqi_follows_pm25() {
        let mut snapshot = Snapshot::new(OffsetDateTime::UNIX_EPOCH);
        assert_eq!(snapshot.aqi(), None);

        snapshot.insert(Metric::Pm2_5, Value::Number(12.0));
        assert_eq!(snapshot.aqi(), Some(50.0));

        snapshot.insert(Metric::Pm2_5, Value::Number(0.0));
        assert_eq!(snapshot.aqi(), Some(0.0));
    }

    #[test]
    fn test_snapshot_text_and_number() {
        let mut snapshot = Snapshot::new(OffsetDateTime::UNIX_EPOCH);
        snapshot.merge(vec![
            (Metric::WindDirDegrees, Value::Integer(90)),
            (Metric::WindDirCardinal, Value::Text("E".into())),
        ]);
        assert_eq!(snapshot.number(Metric::WindDirDegrees), Some(90.0));
        assert_eq!(snapshot.text(Metric::WindDirCardinal), Some("E"));
        assert_eq!(snapshot.number(Metric::WindDirCardinal), None);
        assert_eq!(snapshot.text(Metric::Rainfall), None);
    }
}
