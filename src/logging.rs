/// Logger setup with one log file per local day
use env_logger::{Env, Target, WriteStyle};
use log::{error, info};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::Date;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::error::{Result, StationError};
use crate::state::RunFlag;
use crate::storage::{sweep, FileKind, PersistedFile};
use crate::utils::{format_datetime, now_local};

struct LogFile {
    date: Date,
    file: Option<File>,
}

/// The currently open day's log file, shared between the logger and the
/// hourly maintenance task.
///
/// Nothing in here may emit log records: the logger holds the lock while it
/// writes, so a nested record would deadlock.
#[derive(Clone)]
pub struct DailyLog {
    dir: PathBuf,
    current: Arc<Mutex<LogFile>>,
}

impl DailyLog {
    pub fn open(dir: &Path, today: Date) -> Result<Self> {
        let file = open_day(dir, today)?;
        Ok(DailyLog {
            dir: dir.to_path_buf(),
            current: Arc::new(Mutex::new(LogFile {
                date: today,
                file: Some(file),
            })),
        })
    }

    pub fn path_for(&self, date: Date) -> PathBuf {
        PersistedFile::new(FileKind::Log, date).path_in(&self.dir)
    }

    fn lock(&self) -> MutexGuard<'_, LogFile> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch to the file for `today` if the day has changed.
    ///
    /// Returns true when a new file was opened. On failure the old handle is
    /// dropped and writes are discarded until the next successful roll.
    pub fn roll_to(&self, today: Date) -> Result<bool> {
        let mut current = self.lock();
        Self::roll_locked(&self.dir, &mut current, today)
    }

    fn roll_locked(dir: &Path, current: &mut LogFile, today: Date) -> Result<bool> {
        if current.date == today && current.file.is_some() {
            return Ok(false);
        }
        current.date = today;
        current.file = None;
        current.file = Some(open_day(dir, today)?);
        Ok(true)
    }

    /// Write one formatted record into the file for `today`
    pub fn append(&self, today: Date, buf: &[u8]) -> io::Result<()> {
        let mut current = self.lock();
        // A failed reopen is retried on the next record
        let _ = Self::roll_locked(&self.dir, &mut current, today);
        match current.file.as_mut() {
            Some(file) => file.write_all(buf),
            None => Ok(()),
        }
    }

    /// Hourly upkeep: roll the file over and drop logs past retention
    pub fn maintain(&self, today: Date) -> Result<Vec<PathBuf>> {
        if self.roll_to(today)? {
            info!("Rotated log file to {}", self.path_for(today).display());
        }
        sweep(&self.dir, FileKind::Log, today)
    }

    pub fn writer(&self, echo: bool) -> LogWriter {
        LogWriter {
            log: self.clone(),
            echo,
        }
    }
}

fn open_day(dir: &Path, date: Date) -> Result<File> {
    let path = PersistedFile::new(FileKind::Log, date).path_in(dir);
    fs::create_dir_all(dir).map_err(|e| StationError::Filesystem(dir.to_path_buf(), e))?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| StationError::Filesystem(path, e))
}

/// Logger sink: the day's file, optionally mirrored to stderr
pub struct LogWriter {
    log: DailyLog,
    echo: bool,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.echo {
            let _ = io::stderr().write_all(buf);
        }
        self.log.append(now_local().date(), buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.log.lock().file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Install the global logger.
///
/// Level defaults to info and can be overridden through `RUST_LOG`. Lines
/// read `<local time> - <LEVEL> - <message>`.
pub fn init(dir: &Path) -> std::result::Result<DailyLog, Box<dyn std::error::Error>> {
    let log = DailyLog::open(dir, now_local().date())?;

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                format_datetime(&now_local()),
                record.level(),
                record.args()
            )
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(log.writer(true))))
        .try_init()?;

    Ok(log)
}

/// Run log maintenance at start-up and then every `period` until shutdown
pub async fn rotation_loop(log: DailyLog, running: Arc<RunFlag>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while running.is_running() {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = running.stopped() => break,
        }

        match log.maintain(now_local().date()) {
            Ok(removed) if !removed.is_empty() => {
                info!("Removed {} expired log files", removed.len())
            }
            Ok(_) => {}
            Err(e) => error!("Error cleaning up old log files: {}", e),
        }
    }
}
