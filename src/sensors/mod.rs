pub mod dataset;
pub mod kind;
pub mod modbus;

use std::future::Future;

use log::{debug, info};

use crate::error::Result;
use crate::models::Readings;
use crate::utils::now_local;

pub use dataset::AirQualityDataset;
pub use kind::SensorKind;
pub use modbus::ModbusClient;

/// Anything that can answer a per-sensor read for the acquisition loop
pub trait SensorSource {
    /// Make sure the underlying link is usable before a poll cycle
    fn ensure_connected(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Read and decode one logical sensor
    fn read(&mut self, sensor: SensorKind) -> impl Future<Output = Result<Readings>> + Send;

    /// Release the underlying link
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// The station's sensor bus: Modbus for everything, optionally with the air
/// quality sensor replaced by a pre-fetched dataset.
pub struct StationSensors {
    modbus: ModbusClient,
    air_quality: Option<AirQualityDataset>,
}

impl StationSensors {
    pub fn new(modbus: ModbusClient, air_quality: Option<AirQualityDataset>) -> Self {
        if let Some(dataset) = &air_quality {
            info!("Air quality values served from {}", dataset.path().display());
        }
        StationSensors {
            modbus,
            air_quality,
        }
    }
}

impl SensorSource for StationSensors {
    async fn ensure_connected(&mut self) -> Result<()> {
        if self.modbus.is_connected() {
            return Ok(());
        }
        self.modbus.connect().map(|_| ())
    }

    async fn read(&mut self, sensor: SensorKind) -> Result<Readings> {
        match (&mut self.air_quality, sensor) {
            (Some(dataset), SensorKind::AirQuality) => dataset.read(now_local()),
            _ => {
                let raw = self
                    .modbus
                    .read_registers(sensor, sensor.address(), sensor.register_count())
                    .await?;
                debug!(
                    "{} (slave {}, {:#06x}): {:?}",
                    raw.sensor.name(),
                    raw.slave,
                    raw.address,
                    raw.registers
                );
                Ok(sensor.decode(&raw.registers))
            }
        }
    }

    async fn close(&mut self) {
        self.modbus.close().await;
    }
}
