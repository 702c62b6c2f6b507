/// Fixed register map and decoding for each logical sensor on the bus
use crate::config::SensorIds;
use crate::metrics::{cardinal, scale, wind_direction_degrees};
use crate::models::{Metric, Readings, Value};

/// Logical sensor endpoints, polled in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Environment,
    Uv,
    AirQuality,
    WindSpeed,
    WindDirection,
    Rainfall,
}

impl SensorKind {
    pub const POLL_ORDER: [SensorKind; 6] = [
        SensorKind::Environment,
        SensorKind::Uv,
        SensorKind::AirQuality,
        SensorKind::WindSpeed,
        SensorKind::WindDirection,
        SensorKind::Rainfall,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SensorKind::Environment => "environment",
            SensorKind::Uv => "uv",
            SensorKind::AirQuality => "aqi",
            SensorKind::WindSpeed => "wind_speed",
            SensorKind::WindDirection => "wind_direction",
            SensorKind::Rainfall => "rainfall",
        }
    }

    /// Modbus slave id for this sensor
    pub fn slave(self, ids: &SensorIds) -> u8 {
        match self {
            SensorKind::Environment => ids.environment,
            SensorKind::Uv => ids.uv,
            SensorKind::AirQuality => ids.air_quality,
            SensorKind::WindSpeed => ids.wind_speed,
            SensorKind::WindDirection => ids.wind_direction,
            SensorKind::Rainfall => ids.rainfall,
        }
    }

    /// First holding register to read
    pub fn address(self) -> u16 {
        match self {
            SensorKind::AirQuality => 0x0002,
            _ => 0x0000,
        }
    }

    pub fn register_count(self) -> u16 {
        match self {
            SensorKind::Environment | SensorKind::WindDirection => 3,
            SensorKind::AirQuality => 7,
            SensorKind::Uv | SensorKind::WindSpeed | SensorKind::Rainfall => 1,
        }
    }

    /// Convert raw holding registers into metric values.
    ///
    /// Register layouts:
    /// - Environment: temperature, humidity, pressure (all ÷10)
    /// - UV: index ÷100
    /// - Air quality: CO2, formaldehyde, TVOC, PM2.5, PM10 (raw), temperature ÷10, humidity ÷10
    /// - Wind speed: m/s ÷10
    /// - Wind direction: tenths of a degree in registers 0 and 2
    /// - Rainfall: cumulative mm ÷10
    ///
    /// Returns no readings when the registers are too short or the wind vane
    /// reports a direction outside 0..=360.
    pub fn decode(self, registers: &[u16]) -> Readings {
        let number = |raw: u16, divisor: f64| Value::Number(scale(raw, divisor));

        match (self, registers) {
            (SensorKind::Environment, &[temperature, humidity, pressure, ..]) => vec![
                (Metric::Temperature, number(temperature, 10.0)),
                (Metric::Humidity, number(humidity, 10.0)),
                (Metric::Pressure, number(pressure, 10.0)),
            ],
            (SensorKind::Uv, &[uv, ..]) => vec![(Metric::UvIndex, number(uv, 100.0))],
            (SensorKind::AirQuality, &[co2, formaldehyde, tvoc, pm2_5, pm10, temperature, humidity, ..]) => {
                vec![
                    (Metric::Co2, number(co2, 1.0)),
                    (Metric::Formaldehyde, number(formaldehyde, 1.0)),
                    (Metric::Tvoc, number(tvoc, 1.0)),
                    (Metric::Pm2_5, number(pm2_5, 1.0)),
                    (Metric::Pm10, number(pm10, 1.0)),
                    (Metric::AqiTemperature, number(temperature, 10.0)),
                    (Metric::AqiHumidity, number(humidity, 10.0)),
                ]
            }
            (SensorKind::WindSpeed, &[speed, ..]) => vec![(Metric::WindSpeed, number(speed, 10.0))],
            (SensorKind::WindDirection, &[first, _, third, ..]) => {
                match wind_direction_degrees(first, third) {
                    Some(degrees) => vec![
                        (Metric::WindDirDegrees, Value::Integer(degrees)),
                        (
                            Metric::WindDirCardinal,
                            Value::Text(cardinal(Some(degrees as f64)).to_string()),
                        ),
                    ],
                    None => Vec::new(),
                }
            }
            (SensorKind::Rainfall, &[rainfall, ..]) => {
                vec![(Metric::Rainfall, number(rainfall, 10.0))]
            }
            _ => Vec::new(),
        }
    }

    /// Values substituted when a read fails.
    ///
    /// Wind direction and rainfall are left out entirely; everything else
    /// reads as zero so a failed sensor is visible rather than stale.
    pub fn fallback(self) -> Readings {
        let zero = || Value::Number(0.0);
        match self {
            SensorKind::Environment => vec![
                (Metric::Temperature, zero()),
                (Metric::Humidity, zero()),
                (Metric::Pressure, zero()),
            ],
            SensorKind::Uv => vec![(Metric::UvIndex, zero())],
            SensorKind::AirQuality => vec![(Metric::Pm2_5, zero())],
            SensorKind::WindSpeed => vec![(Metric::WindSpeed, zero())],
            SensorKind::WindDirection | SensorKind::Rainfall => Vec::new(),
        }
    }

    /// One human-readable log line for a successful read
    pub fn summary(self, readings: &Readings) -> String {
        let find = |metric: Metric| {
            readings
                .iter()
                .find(|(m, _)| *m == metric)
                .map(|(_, value)| value)
        };
        let num = |metric: Metric| find(metric).and_then(Value::as_f64).unwrap_or_default();

        match self {
            SensorKind::Environment => format!(
                "Env: {:.1}°C, {:.1}%, {:.1}hPa",
                num(Metric::Temperature),
                num(Metric::Humidity),
                num(Metric::Pressure)
            ),
            SensorKind::Uv => format!("UV: {:.2}", num(Metric::UvIndex)),
            SensorKind::AirQuality => {
                let fields = readings
                    .iter()
                    .map(|(metric, value)| format!("{}={}", metric.name(), value))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("AQI Sensor Data: {}", fields)
            }
            SensorKind::WindSpeed => format!("Wind Speed: {:.1} m/s", num(Metric::WindSpeed)),
            SensorKind::WindDirection => format!(
                "Wind Direction: {}° ({})",
                find(Metric::WindDirDegrees)
                    .map(Value::to_string)
                    .unwrap_or_default(),
                find(Metric::WindDirCardinal)
                    .map(Value::to_string)
                    .unwrap_or_else(|| "Unknown".to_string())
            ),
            SensorKind::Rainfall => {
                format!("Raw Rainfall Reading: {:.1} mm", num(Metric::Rainfall))
            }
        }
    }
}
