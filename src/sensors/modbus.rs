/// Modbus RTU master over the station's serial link
use futures_util::FutureExt;
use log::{info, warn};
use std::panic::AssertUnwindSafe;
use tokio::time::timeout;
use tokio_modbus::client::{rtu, Context, Reader};
use tokio_modbus::prelude::{Slave, SlaveContext};
use tokio_serial::SerialStream;

use crate::config::{SensorIds, SerialSettings};
use crate::error::{Result, StationError};
use crate::models::RawReading;
use crate::sensors::SensorKind;
use crate::utils::panic_message;

/// Lazily connected register client shared by all logical sensors
///
/// The serial port is opened on first use and dropped again after a
/// transport failure or timeout, so the next poll cycle starts from a fresh
/// connection instead of a half-read frame.
pub struct ModbusClient {
    settings: SerialSettings,
    ids: SensorIds,
    context: Option<Context>,
}

impl ModbusClient {
    pub fn new(settings: SerialSettings, ids: SensorIds) -> Self {
        ModbusClient {
            settings,
            ids,
            context: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    /// Open the serial port if it is not open yet
    pub fn connect(&mut self) -> Result<&mut Context> {
        let context = match self.context.take() {
            Some(context) => context,
            None => {
                let context = self.open()?;
                info!(
                    "Modbus connected on {} at {} baud",
                    self.settings.port, self.settings.baud_rate
                );
                context
            }
        };
        Ok(self.context.insert(context))
    }

    fn open(&self) -> Result<Context> {
        let builder = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .parity(self.settings.parity)
            .stop_bits(self.settings.stop_bits)
            .timeout(self.settings.timeout);

        let port = SerialStream::open(&builder).map_err(|e| StationError::Connection {
            port: self.settings.port.clone(),
            reason: e.to_string(),
        })?;

        // The slave id is switched per request
        Ok(rtu::attach_slave(port, Slave(self.ids.environment)))
    }

    /// Read `count` holding registers starting at `address` from `sensor`.
    ///
    /// Scaling is left to the caller; the registers come back exactly as the
    /// device sent them.
    pub async fn read_registers(
        &mut self,
        sensor: SensorKind,
        address: u16,
        count: u16,
    ) -> Result<RawReading> {
        let slave = sensor.slave(&self.ids);
        let request_timeout = self.settings.timeout;

        let context = self.connect()?;
        context.set_slave(Slave(slave));
        // The client asserts on response length in debug builds
        let response = AssertUnwindSafe(timeout(
            request_timeout,
            context.read_holding_registers(address, count),
        ))
        .catch_unwind()
        .await;

        let response = match response {
            Err(payload) => {
                self.context = None;
                return Err(StationError::Read {
                    slave,
                    address,
                    reason: format!("malformed response: {}", panic_message(payload.as_ref())),
                });
            }
            Ok(response) => response,
        };

        let registers = match response {
            Ok(Ok(Ok(registers))) => registers,
            Ok(Ok(Err(exception))) => {
                return Err(StationError::Read {
                    slave,
                    address,
                    reason: format!("exception response {:?}", exception),
                })
            }
            Ok(Err(e)) => {
                self.context = None;
                return Err(StationError::Read {
                    slave,
                    address,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                self.context = None;
                return Err(StationError::Timeout { slave });
            }
        };

        if registers.len() < count as usize {
            self.context = None;
            return Err(StationError::ShortRead {
                slave,
                expected: count as usize,
                got: registers.len(),
            });
        }

        Ok(RawReading {
            sensor,
            slave,
            address,
            registers,
        })
    }

    pub async fn close(&mut self) {
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.disconnect().await {
                warn!("Error closing Modbus connection: {}", e);
            } else {
                info!("Modbus connection closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio_serial::{Parity, StopBits};

    /// How the scripted slave answers the one request it receives
    enum Reply {
        Registers(Vec<u16>),
        Exception(u8),
        Silent,
    }

    fn crc16(frame: &[u8]) -> u16 {
        let mut crc = 0xFFFFu16;
        for byte in frame {
            crc ^= u16::from(*byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xA001
                } else {
                    crc >> 1
                };
            }
        }
        crc
    }

    fn spawn_slave(mut line: DuplexStream, reply: Reply) -> JoinHandle<()> {
        tokio::spawn(async move {
            // slave, function, address (2), count (2), crc (2)
            let mut request = [0u8; 8];
            if line.read_exact(&mut request).await.is_err() {
                return;
            }
            let (slave, function) = (request[0], request[1]);

            let mut frame = match reply {
                Reply::Registers(words) => {
                    let mut frame = vec![slave, function, (words.len() * 2) as u8];
                    for word in words {
                        frame.extend_from_slice(&word.to_be_bytes());
                    }
                    frame
                }
                Reply::Exception(code) => vec![slave, function | 0x80, code],
                Reply::Silent => Vec::new(),
            };
            if !frame.is_empty() {
                let crc = crc16(&frame);
                frame.extend_from_slice(&crc.to_le_bytes());
                let _ = line.write_all(&frame).await;
            }

            // Hold the line open until the master drops it
            let mut rest = Vec::new();
            let _ = line.read_to_end(&mut rest).await;
        })
    }

    fn attached(reply: Reply) -> (ModbusClient, JoinHandle<()>) {
        let (master, slave) = tokio::io::duplex(256);
        let device = spawn_slave(slave, reply);
        let mut client = unreachable_port();
        client.context = Some(rtu::attach_slave(master, Slave(1)));
        (client, device)
    }

    fn unreachable_port() -> ModbusClient {
        let settings = SerialSettings {
            port: "/dev/does-not-exist-ttyUSB9".to_string(),
            baud_rate: 9600,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(100),
        };
        ModbusClient::new(settings, SensorIds::default())
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_not_fatal() {
        let mut client = unreachable_port();
        let err = client.connect().err();
        assert!(matches!(err, Some(StationError::Connection { .. })));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_read_without_link_fails_with_connection_error() {
        let mut client = unreachable_port();
        let result = client
            .read_registers(SensorKind::Uv, 0x0000, 1)
            .await;
        assert!(matches!(result, Err(StationError::Connection { .. })));
        // Closing an unopened client is a no-op
        client.close().await;
    }

    #[test]
    fn test_crc16_reference_frame() {
        // Read 1 register at 0x0000 from slave 1
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]).to_le_bytes(), [0x84, 0x0A]);
    }

    #[tokio::test]
    async fn test_read_returns_raw_registers() {
        let (mut client, _device) = attached(Reply::Registers(vec![250, 450, 10130]));

        let reading = client
            .read_registers(SensorKind::Environment, 0x0000, 3)
            .await
            .unwrap();

        assert_eq!(reading.registers, vec![250, 450, 10130]);
        assert_eq!(reading.slave, 1);
        assert_eq!(reading.address, 0x0000);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_exception_response_keeps_link() {
        let (mut client, _device) = attached(Reply::Exception(0x02));

        let result = client.read_registers(SensorKind::AirQuality, 0x0002, 7).await;

        match result {
            Err(StationError::Read { slave, address, reason }) => {
                assert_eq!(slave, 3);
                assert_eq!(address, 0x0002);
                assert!(reason.contains("IllegalDataAddress"), "{}", reason);
            }
            other => panic!("expected a read error, got {:?}", other.map(|r| r.registers)),
        }
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_silent_slave_times_out_and_drops_link() {
        let (mut client, device) = attached(Reply::Silent);

        let result = client.read_registers(SensorKind::Uv, 0x0000, 1).await;

        assert!(matches!(result, Err(StationError::Timeout { slave: 2 })));
        assert!(!client.is_connected());
        // Dropping the link closes the line for the slave too
        tokio::time::timeout(Duration::from_secs(1), device)
            .await
            .expect("line still open")
            .unwrap();
    }

    #[tokio::test]
    async fn test_short_response_is_an_error_not_a_panic() {
        let (mut client, _device) = attached(Reply::Registers(vec![250]));

        let result = client.read_registers(SensorKind::Environment, 0x0000, 3).await;

        // Debug builds trip the client's own length assertion before our check
        match result {
            Err(StationError::ShortRead { expected, got, .. }) => assert_eq!((expected, got), (3, 1)),
            Err(StationError::Read { reason, .. }) => {
                assert!(reason.starts_with("malformed response"), "{}", reason)
            }
            other => panic!("expected a short read, got {:?}", other.map(|r| r.registers)),
        }
        assert!(!client.is_connected());
    }
}
