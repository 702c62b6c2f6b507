mod acquisition;
mod config;
mod display;
mod error;
mod logging;
mod metrics;
mod models;
mod rainfall;
mod sensors;
mod state;
mod storage;
mod utils;

use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use acquisition::AcquisitionLoop;
use config::StationConfig;
use logging::DailyLog;
use models::Snapshot;
use sensors::{AirQualityDataset, ModbusClient, SensorSource, StationSensors};
use state::{snapshot_channel, RunFlag, StationHandle};
use storage::{PersistenceWriter, RainfallTotals};
use utils::{format_datetime, init_local_offset, now_local};

const DISPLAY_REFRESH: Duration = Duration::from_secs(1);
const LOG_ROTATION_CHECK: Duration = Duration::from_secs(3600);
/// How long each task gets to finish after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

async fn run(config: StationConfig, log: DailyLog) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting weather station on {} at {}",
        config.serial.port,
        format_datetime(&now_local())
    );

    let running = Arc::new(RunFlag::new());
    let (publisher, handle) = snapshot_channel(Snapshot::new(now_local()));
    let (queue, records) = mpsc::unbounded_channel();

    let sensors = StationSensors::new(
        ModbusClient::new(config.serial.clone(), config.sensors.clone()),
        config.aqi_dataset.clone().map(AirQualityDataset::new),
    );
    let acquisition = tokio::spawn(
        AcquisitionLoop::new(
            sensors,
            publisher,
            queue,
            running.clone(),
            config.poll_interval,
            config.csv_interval,
        )
        .run(),
    );

    let writer = tokio::spawn(
        PersistenceWriter::new(
            config.data_dir.clone(),
            RainfallTotals::new(&config.rainfall_dir),
            records,
            running.clone(),
        )
        .run(),
    );
    let display = tokio::spawn(display::refresh_loop(
        handle.clone(),
        running.clone(),
        DISPLAY_REFRESH,
    ));
    let rotation = tokio::spawn(logging::rotation_loop(
        log,
        running.clone(),
        LOG_ROTATION_CHECK,
    ));
    let refresh_signal = spawn_refresh_signal(handle);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down weather station system");
    running.stop();
    if let Some(listener) = refresh_signal {
        listener.abort();
    }

    let source = join_within(acquisition, "acquisition").await;
    join_within(writer, "persistence writer").await;
    join_within(display, "display refresh").await;
    join_within(rotation, "log rotation").await;

    if let Some(mut source) = source {
        source.close().await;
    }

    info!("Weather station stopped");
    Ok(())
}

/// Await a task for at most the grace period; a task that overruns is
/// abandoned.
async fn join_within<T>(task: JoinHandle<T>, name: &str) -> Option<T> {
    match timeout(SHUTDOWN_GRACE, task).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            warn!("Task {} ended abnormally: {}", name, e);
            None
        }
        Err(_) => {
            warn!("Task {} did not stop in time, abandoning it", name);
            None
        }
    }
}

/// SIGHUP forces an immediate poll and redraw
#[cfg(unix)]
fn spawn_refresh_signal(handle: StationHandle) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Manual refresh unavailable: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            handle.force_refresh();
            info!("Display manually refreshed");
        }
    }))
}

#[cfg(not(unix))]
fn spawn_refresh_signal(_handle: StationHandle) -> Option<JoinHandle<()>> {
    None
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Must happen while the process is still single-threaded
    init_local_offset();

    let (config, issues) = StationConfig::new();
    let log = logging::init(&config.log_dir)?;
    for issue in issues {
        warn!("{}, using default", issue);
    }

    tokio::runtime::Runtime::new()?.block_on(run(config, log))
}
