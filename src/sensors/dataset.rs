/// Air quality values looked up from a pre-fetched hourly dataset
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::{Result, StationError};
use crate::models::{Metric, Readings, Value};

/// One row of the dataset as written by the hourly air quality export
#[derive(Debug, Clone, Deserialize)]
struct DatasetRecord {
    date: String,
    pm2_5: f64,
    pm10: f64,
    carbon_dioxide: f64,
    carbon_monoxide: f64,
    nitrogen_dioxide: f64,
    sulphur_dioxide: f64,
    ozone: f64,
}

#[derive(Debug, Clone)]
pub struct AirQualityRow {
    pub time: PrimitiveDateTime,
    pub pm2_5: f64,
    pub pm10: f64,
    pub carbon_dioxide: f64,
    pub carbon_monoxide: f64,
    pub nitrogen_dioxide: f64,
    pub sulphur_dioxide: f64,
    pub ozone: f64,
}

impl AirQualityRow {
    fn readings(&self) -> Readings {
        vec![
            (Metric::Co2, Value::Number(self.carbon_dioxide)),
            (Metric::Pm2_5, Value::Number(self.pm2_5)),
            (Metric::Pm10, Value::Number(self.pm10)),
            (Metric::CarbonMonoxide, Value::Number(self.carbon_monoxide)),
            (Metric::NitrogenDioxide, Value::Number(self.nitrogen_dioxide)),
            (Metric::SulphurDioxide, Value::Number(self.sulphur_dioxide)),
            (Metric::Ozone, Value::Number(self.ozone)),
        ]
    }
}

/// Parse a dataset timestamp as local wall-clock time.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` or the ISO `T` separator; anything after the
/// seconds (fractions, UTC offsets) is ignored.
pub fn parse_dataset_time(text: &str) -> Option<PrimitiveDateTime> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let head = text.trim().get(..19)?.replacen('T', " ", 1);
    PrimitiveDateTime::parse(&head, format).ok()
}

/// Row whose timestamp is closest to `now` by absolute difference
pub fn nearest(rows: &[AirQualityRow], now: PrimitiveDateTime) -> Option<&AirQualityRow> {
    rows.iter().min_by_key(|row| (row.time - now).abs())
}

/// Dataset-backed replacement for the live air quality sensor.
///
/// The file is parsed on first use and again whenever its modification time
/// changes, so an external job can refresh it while the station runs.
pub struct AirQualityDataset {
    path: PathBuf,
    rows: Vec<AirQualityRow>,
    loaded_at: Option<SystemTime>,
}

impl AirQualityDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AirQualityDataset {
            path: path.into(),
            rows: Vec::new(),
            loaded_at: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Readings from the row nearest to `now`
    pub fn read(&mut self, now: OffsetDateTime) -> Result<Readings> {
        self.refresh()?;
        let now = PrimitiveDateTime::new(now.date(), now.time());
        nearest(&self.rows, now)
            .map(AirQualityRow::readings)
            .ok_or_else(|| StationError::Parse {
                what: self.path.display().to_string(),
                reason: "dataset has no usable rows".to_string(),
            })
    }

    fn refresh(&mut self) -> Result<()> {
        let modified = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|e| StationError::Filesystem(self.path.clone(), e))?;

        if self.loaded_at == Some(modified) {
            return Ok(());
        }

        self.rows = load_rows(&self.path)?;
        self.loaded_at = Some(modified);
        debug!(
            "Loaded {} air quality rows from {}",
            self.rows.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn load_rows(path: &Path) -> Result<Vec<AirQualityRow>> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| StationError::Csv(path.to_path_buf(), e))?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for record in reader.deserialize::<DatasetRecord>() {
        let parsed = record.ok().and_then(|record| {
            let time = parse_dataset_time(&record.date)?;
            Some(AirQualityRow {
                time,
                pm2_5: record.pm2_5,
                pm10: record.pm10,
                carbon_dioxide: record.carbon_dioxide,
                carbon_monoxide: record.carbon_monoxide,
                nitrogen_dioxide: record.nitrogen_dioxide,
                sulphur_dioxide: record.sulphur_dioxide,
                ozone: record.ozone,
            })
        });
        match parsed {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(
            "Skipped {} malformed rows in AQI dataset {}",
            skipped,
            path.display()
        );
    }

    Ok(rows)
}
