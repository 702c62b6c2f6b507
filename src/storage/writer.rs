/// Background consumer that turns queued records into rows on disk
use log::{debug, error, info};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Duration};

use crate::error::{Result, StationError};
use crate::models::{Metric, Snapshot};
use crate::state::RunFlag;
use crate::storage::{sweep, FileKind, PersistedFile, RainfallTotals, Record};
use crate::utils::format_timestamp;

/// How long a single dequeue waits before re-checking the run flag
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Header of the daily sensor data file
pub fn data_header() -> Vec<&'static str> {
    std::iter::once("timestamp")
        .chain(Metric::PERSISTED.iter().map(|metric| metric.name()))
        .collect()
}

/// One data row in header order; missing fields are written empty
pub fn data_row(snapshot: &Snapshot) -> Vec<String> {
    std::iter::once(format_timestamp(&snapshot.timestamp))
        .chain(Metric::PERSISTED.iter().map(|metric| {
            snapshot
                .get(*metric)
                .map(|value| value.to_string())
                .unwrap_or_default()
        }))
        .collect()
}

pub struct PersistenceWriter {
    data_dir: PathBuf,
    totals: RainfallTotals,
    queue: UnboundedReceiver<Record>,
    running: Arc<RunFlag>,
}

impl PersistenceWriter {
    pub fn new(
        data_dir: PathBuf,
        totals: RainfallTotals,
        queue: UnboundedReceiver<Record>,
        running: Arc<RunFlag>,
    ) -> Self {
        PersistenceWriter {
            data_dir,
            totals,
            queue,
            running,
        }
    }

    /// Drain the queue until shutdown.
    ///
    /// Every failure is logged and the record dropped; the loop itself never
    /// exits on an error.
    pub async fn run(mut self) {
        info!(
            "Persistence writer started, writing to {}",
            self.data_dir.display()
        );

        while self.running.is_running() {
            let record = match timeout(RECV_TIMEOUT, self.queue.recv()).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    info!("Persistence queue closed");
                    break;
                }
                // Nothing queued; loop around to observe the run flag
                Err(_) => continue,
            };

            if let Err(e) = self.persist(&record) {
                error!("CSV write error: {}", e);
            }
        }

        // Flush whatever was queued before shutdown
        while let Ok(record) = self.queue.try_recv() {
            if let Err(e) = self.persist(&record) {
                error!("CSV write error: {}", e);
            }
        }

        info!("Persistence writer stopped");
    }

    pub fn persist(&self, record: &Record) -> Result<()> {
        match record {
            Record::Snapshot(snapshot) => {
                let path = self.append_snapshot(snapshot)?;
                debug!("Appended snapshot to {}", path.display());
            }
            Record::DailyRainfall(total) => {
                self.totals.append(total)?;
                info!("Stored daily rainfall in {}", self.totals.path().display());
            }
        }
        Ok(())
    }

    /// Append a snapshot to the data file for the snapshot's own date,
    /// creating it (and sweeping expired files) on first use.
    pub fn append_snapshot(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let today = snapshot.timestamp.date();
        let path = PersistedFile::new(FileKind::SensorData, today).path_in(&self.data_dir);
        let fs_error = |e| StationError::Filesystem(path.clone(), e);
        let csv_error = |e| StationError::Csv(path.clone(), e);

        fs::create_dir_all(&self.data_dir).map_err(fs_error)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(fs_error)?;
        // An empty file may be left over from a failed header write
        let is_new = file.metadata().map_err(fs_error)?.len() == 0;
        let mut writer = csv::Writer::from_writer(file);

        if is_new {
            writer.write_record(data_header()).map_err(csv_error)?;
            writer.flush().map_err(fs_error)?;
            info!("Created data file {}", path.display());
            self.sweep_expired(today);
        }

        writer.write_record(data_row(snapshot)).map_err(csv_error)?;
        writer.flush().map_err(fs_error)?;
        Ok(path)
    }

    fn sweep_expired(&self, today: time::Date) {
        if let Err(e) = sweep(&self.data_dir, FileKind::SensorData, today) {
            error!("Error cleaning up old CSV files: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use crate::rainfall::DailyTotal;
    use std::path::Path;
    use time::macros::{date, datetime};
    use tokio::sync::mpsc;

    fn writer_in(dir: &Path) -> (PersistenceWriter, mpsc::UnboundedSender<Record>, Arc<RunFlag>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(RunFlag::new());
        let writer = PersistenceWriter::new(
            dir.join("csv_data"),
            RainfallTotals::new(&dir.join("rainfall_data")),
            rx,
            running.clone(),
        );
        (writer, tx, running)
    }

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new(datetime!(2024-06-10 12:30:00 UTC));
        snapshot.merge(vec![
            (Metric::Temperature, Value::Number(25.0)),
            (Metric::Humidity, Value::Number(45.0)),
            (Metric::Pressure, Value::Number(1013.0)),
            (Metric::UvIndex, Value::Number(3.25)),
            (Metric::Pm2_5, Value::Number(12.0)),
            (Metric::WindSpeed, Value::Number(4.2)),
            (Metric::WindDirDegrees, Value::Integer(180)),
            (Metric::WindDirCardinal, Value::Text("S".into())),
            (Metric::Rainfall, Value::Number(1.5)),
            (Metric::Ozone, Value::Number(31.0)),
        ]);
        snapshot
    }

    #[test]
    fn test_header_matches_column_order() {
        assert_eq!(
            data_header().join(","),
            "timestamp,temperature,humidity,pressure,uv_index,co2,formaldehyde,tvoc,\
             pm2_5,pm10,aqi_temperature,aqi_humidity,wind_speed,wind_dir_degrees,\
             wind_dir_cardinal,rainfall"
        );
    }

    #[test]
    fn test_row_leaves_missing_fields_empty() {
        assert_eq!(
            data_row(&sample_snapshot()).join(","),
            "2024-06-10T12:30:00,25.0,45.0,1013.0,3.25,,,,12.0,,,,4.2,180,S,1.5"
        );
    }

    #[test]
    fn test_append_creates_file_with_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, _tx, _running) = writer_in(dir.path());

        let path = writer.append_snapshot(&sample_snapshot()).unwrap();
        writer.append_snapshot(&sample_snapshot()).unwrap();

        assert_eq!(
            path,
            dir.path().join("csv_data/weather_data_2024-06-10.csv")
        );
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,temperature"));
        assert_eq!(lines[1], lines[2]);
    }

    #[test]
    fn test_empty_leftover_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("csv_data");
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("weather_data_2024-06-10.csv"), "").unwrap();

        let (writer, _tx, _running) = writer_in(dir.path());
        let path = writer.append_snapshot(&sample_snapshot()).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("timestamp,temperature"));
    }

    #[test]
    fn test_new_file_sweeps_expired_data() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("csv_data");
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("weather_data_2024-05-01.csv"), "old").unwrap();
        fs::write(data_dir.join("weather_data_2024-06-05.csv"), "recent").unwrap();

        let (writer, _tx, _running) = writer_in(dir.path());
        writer.append_snapshot(&sample_snapshot()).unwrap();

        assert!(!data_dir.join("weather_data_2024-05-01.csv").exists());
        assert!(data_dir.join("weather_data_2024-06-05.csv").exists());
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, tx, running) = writer_in(dir.path());
        let task = tokio::spawn(writer.run());

        tx.send(Record::Snapshot(sample_snapshot())).unwrap();
        tx.send(Record::DailyRainfall(DailyTotal {
            date: date!(2024 - 06 - 09),
            total: 7.5,
        }))
        .unwrap();

        // Give the writer a moment, then stop it
        tokio::time::sleep(Duration::from_millis(200)).await;
        running.stop();
        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("writer did not stop")
            .unwrap();

        let data = fs::read_to_string(dir.path().join("csv_data/weather_data_2024-06-10.csv")).unwrap();
        assert_eq!(data.lines().count(), 2);
        let totals =
            fs::read_to_string(dir.path().join("rainfall_data/daily_rainfall_totals.csv")).unwrap();
        assert_eq!(totals, "Date,Rainfall (mm)\n2024-06-09,7.5\n");
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_writer() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the data directory should be
        fs::write(dir.path().join("csv_data"), "blocker").unwrap();
        let (writer, tx, running) = writer_in(dir.path());
        let task = tokio::spawn(writer.run());

        tx.send(Record::Snapshot(sample_snapshot())).unwrap();
        tx.send(Record::DailyRainfall(DailyTotal {
            date: date!(2024 - 06 - 09),
            total: 1.0,
        }))
        .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        running.stop();
        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .unwrap()
            .unwrap();

        // The rainfall record after the failed snapshot still landed
        assert!(dir
            .path()
            .join("rainfall_data/daily_rainfall_totals.csv")
            .exists());
    }
}
