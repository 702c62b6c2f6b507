/// Removal of rotated files past the retention horizon
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use time::Date;

use crate::error::{Result, StationError};
use crate::storage::FileKind;
use crate::utils::parse_date_stamp;

/// Files strictly older than this many days are deleted
pub const RETENTION_DAYS: i64 = 7;

/// Delete every `<prefix>_<YYYY-MM-DD>.<ext>` file in `dir` older than the
/// retention horizon relative to `today`.
///
/// Files of other kinds are ignored. Names that look like ours but carry an
/// unparseable date are logged and skipped, as are individual delete
/// failures. Returns the paths that were removed.
pub fn sweep(dir: &Path, kind: FileKind, today: Date) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| StationError::Filesystem(dir.to_path_buf(), e))?;

    let prefix = format!("{}_", kind.prefix());
    let suffix = format!(".{}", kind.extension());
    let mut removed = Vec::new();

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(stamp) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
        else {
            continue;
        };

        let Some(file_date) = parse_date_stamp(stamp) else {
            warn!("Skipping file with malformed date: {}", name);
            continue;
        };

        let age = (today - file_date).whole_days();
        if age <= RETENTION_DAYS {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed old file: {} ({} days old)", name, age);
                removed.push(path);
            }
            Err(e) => error!("Error removing {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use time::macros::date;

    const TODAY: Date = date!(2024 - 06 - 10);

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    fn listing(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_removes_only_expired_files_of_kind() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "weather_data_2024-06-10.csv");
        touch(dir.path(), "weather_data_2024-06-03.csv"); // exactly 7 days: kept
        touch(dir.path(), "weather_data_2024-06-02.csv"); // 8 days: removed
        touch(dir.path(), "weather_data_2024-05-01.csv");
        touch(dir.path(), "weather_station_2024-05-01.log"); // other kind
        touch(dir.path(), "notes.txt");

        let removed = sweep(dir.path(), FileKind::SensorData, TODAY).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(
            listing(dir.path()),
            BTreeSet::from([
                "weather_data_2024-06-10.csv".to_string(),
                "weather_data_2024-06-03.csv".to_string(),
                "weather_station_2024-05-01.log".to_string(),
                "notes.txt".to_string(),
            ])
        );
    }

    #[test]
    fn test_malformed_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "weather_station_backup.log");
        touch(dir.path(), "weather_station_2024-02-30.log");
        touch(dir.path(), "weather_station_2024-01-01.log");

        let removed = sweep(dir.path(), FileKind::Log, TODAY).unwrap();
        assert_eq!(
            removed,
            vec![dir.path().join("weather_station_2024-01-01.log")]
        );
        assert_eq!(listing(dir.path()).len(), 2);
    }

    #[test]
    fn test_sweep_without_expired_files_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "weather_data_2024-06-09.csv");
        touch(dir.path(), "weather_data_2024-06-10.csv");
        let before = listing(dir.path());

        assert!(sweep(dir.path(), FileKind::SensorData, TODAY)
            .unwrap()
            .is_empty());
        assert!(sweep(dir.path(), FileKind::SensorData, TODAY)
            .unwrap()
            .is_empty());
        assert_eq!(listing(dir.path()), before);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = sweep(Path::new("/nonexistent/logs"), FileKind::Log, TODAY);
        assert!(matches!(result, Err(StationError::Filesystem(..))));
    }
}
