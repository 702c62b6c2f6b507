pub mod retention;
pub mod totals;
pub mod writer;

use std::path::{Path, PathBuf};
use time::Date;

use crate::models::Snapshot;
use crate::rainfall::DailyTotal;
use crate::utils::date_stamp;

pub use retention::sweep;
pub use totals::RainfallTotals;
pub use writer::PersistenceWriter;

/// Kinds of date-stamped files the station rotates daily
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    SensorData,
    Log,
}

impl FileKind {
    pub fn prefix(self) -> &'static str {
        match self {
            FileKind::SensorData => "weather_data",
            FileKind::Log => "weather_station",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileKind::SensorData => "csv",
            FileKind::Log => "log",
        }
    }
}

/// A rotated file, identified by its kind and the day it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedFile {
    pub kind: FileKind,
    pub date: Date,
}

impl PersistedFile {
    pub fn new(kind: FileKind, date: Date) -> Self {
        PersistedFile { kind, date }
    }

    /// `<prefix>_<YYYY-MM-DD>.<ext>`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            self.kind.prefix(),
            date_stamp(self.date),
            self.kind.extension()
        )
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

/// Work items handed from the acquisition loop to the persistence writer
#[derive(Debug, Clone)]
pub enum Record {
    Snapshot(Snapshot),
    DailyRainfall(DailyTotal),
}
