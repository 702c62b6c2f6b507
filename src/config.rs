use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tokio_serial::{Parity, StopBits};

use crate::error::StationError;

/// Serial link parameters for the Modbus RTU bus
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub timeout: Duration,
}

/// Modbus slave id of every logical sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorIds {
    pub environment: u8,
    pub uv: u8,
    pub air_quality: u8,
    pub wind_speed: u8,
    pub wind_direction: u8,
    pub rainfall: u8,
}

impl Default for SensorIds {
    fn default() -> Self {
        SensorIds {
            environment: 1,
            uv: 2,
            air_quality: 3,
            wind_speed: 4,
            wind_direction: 5,
            rainfall: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub serial: SerialSettings,
    pub sensors: SensorIds,
    pub poll_interval: Duration,
    pub csv_interval: Duration,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub rainfall_dir: PathBuf,
    pub aqi_dataset: Option<PathBuf>,
}

impl StationConfig {
    /// Load settings from the environment (and a `.env` file if present).
    ///
    /// Never fails: malformed values fall back to their defaults and are
    /// returned alongside the config so they can be logged once logging is up.
    pub fn new() -> (Self, Vec<StationError>) {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<StationError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut issues = Vec::new();
        let mut setting = |key: &str, parse: &dyn Fn(&str) -> Option<u64>, default: u64| {
            match lookup(key) {
                Some(raw) => parse(raw.trim()).unwrap_or_else(|| {
                    issues.push(StationError::Config {
                        key: key.to_string(),
                        value: raw,
                    });
                    default
                }),
                None => default,
            }
        };

        let number = |raw: &str| -> Option<u64> { u64::from_str(raw).ok() };
        let positive = |raw: &str| -> Option<u64> { number(raw).filter(|value| *value > 0) };
        let slave_id = |raw: &str| -> Option<u64> {
            u8::from_str(raw).ok().filter(|id| *id > 0).map(u64::from)
        };
        let parity = |raw: &str| -> Option<u64> {
            match raw.to_ascii_uppercase().as_str() {
                "N" => Some(0),
                "E" => Some(1),
                "O" => Some(2),
                _ => None,
            }
        };
        let stop_bits = |raw: &str| -> Option<u64> {
            match raw {
                "1" => Some(1),
                "2" => Some(2),
                _ => None,
            }
        };
        let baud = |raw: &str| -> Option<u64> {
            positive(raw).filter(|baud| *baud <= u64::from(u32::MAX))
        };
        let ids = SensorIds::default();

        let baud_rate = setting("MODBUS_BAUDRATE", &baud, 9600) as u32;
        let parity = match setting("MODBUS_PARITY", &parity, 0) {
            1 => Parity::Even,
            2 => Parity::Odd,
            _ => Parity::None,
        };
        let stop_bits = match setting("MODBUS_STOPBITS", &stop_bits, 1) {
            2 => StopBits::Two,
            _ => StopBits::One,
        };
        let timeout = Duration::from_secs(setting("MODBUS_TIMEOUT_SECS", &positive, 2));

        let mut slave = |key: &str, default: u8| setting(key, &slave_id, default.into()) as u8;
        let sensors = SensorIds {
            environment: slave("SENSOR_ENVIRONMENT_ID", ids.environment),
            uv: slave("SENSOR_UV_ID", ids.uv),
            air_quality: slave("SENSOR_AQI_ID", ids.air_quality),
            wind_speed: slave("SENSOR_WIND_SPEED_ID", ids.wind_speed),
            wind_direction: slave("SENSOR_WIND_DIRECTION_ID", ids.wind_direction),
            rainfall: slave("SENSOR_RAINFALL_ID", ids.rainfall),
        };

        let poll_interval = Duration::from_millis(setting("POLL_INTERVAL_MS", &positive, 1000));
        let csv_interval = Duration::from_secs(setting("CSV_INTERVAL_SECS", &number, 30));

        let text = |key: &str| -> Option<String> {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let path = |key: &str, default: &str| -> PathBuf {
            text(key).unwrap_or_else(|| default.to_string()).into()
        };

        let config = StationConfig {
            serial: SerialSettings {
                port: text("MODBUS_PORT").unwrap_or_else(|| "/dev/ttyUSB0".to_string()),
                baud_rate,
                parity,
                stop_bits,
                timeout,
            },
            sensors,
            poll_interval,
            csv_interval,
            data_dir: path("DATA_DIR", "csv_data"),
            log_dir: path("LOG_DIR", "logs"),
            rainfall_dir: path("RAINFALL_DIR", "rainfall_data"),
            aqi_dataset: text("AQI_DATASET").map(PathBuf::from),
        };

        (config, issues)
    }
}
