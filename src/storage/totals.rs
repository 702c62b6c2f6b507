use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{Result, StationError};
use crate::rainfall::DailyTotal;
use crate::utils::date_stamp;

const TOTALS_FILE: &str = "daily_rainfall_totals.csv";

#[derive(Debug, Serialize)]
struct TotalRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Rainfall (mm)")]
    rainfall_mm: String,
}

/// Append-only CSV of one rainfall total per calendar day
#[derive(Debug, Clone)]
pub struct RainfallTotals {
    path: PathBuf,
}

impl RainfallTotals {
    pub fn new(dir: &Path) -> Self {
        RainfallTotals {
            path: dir.join(TOTALS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, total: &DailyTotal) -> Result<()> {
        let fs_error = |e| StationError::Filesystem(self.path.clone(), e);
        let csv_error = |e| StationError::Csv(self.path.clone(), e);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(fs_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(fs_error)?;
        let is_new = file.metadata().map_err(fs_error)?.len() == 0;

        // Header only goes into a freshly created file
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer
            .serialize(TotalRow {
                date: date_stamp(total.date),
                rainfall_mm: format!("{:.1}", total.total),
            })
            .map_err(csv_error)?;
        writer.flush().map_err(fs_error)?;
        Ok(())
    }
}
