/// Periodic sensor polling: read, merge, publish, enqueue
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};

use crate::models::{Metric, Snapshot, Value};
use crate::rainfall::RainfallAccumulator;
use crate::sensors::{SensorKind, SensorSource};
use crate::state::{RunFlag, SnapshotPublisher};
use crate::storage::Record;
use crate::utils::{now_local, panic_message};

/// Wait after a failed connection attempt before trying again
const CONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// The only writer of the live snapshot.
///
/// Each cycle builds a fresh snapshot from scratch, so nothing read in an
/// earlier cycle survives a failed read in this one.
pub struct AcquisitionLoop<S> {
    source: S,
    publisher: SnapshotPublisher,
    queue: UnboundedSender<Record>,
    rainfall: RainfallAccumulator,
    running: Arc<RunFlag>,
    poll_interval: Duration,
    persist_interval: Duration,
}

impl<S: SensorSource + Send> AcquisitionLoop<S> {
    pub fn new(
        source: S,
        publisher: SnapshotPublisher,
        queue: UnboundedSender<Record>,
        running: Arc<RunFlag>,
        poll_interval: Duration,
        persist_interval: Duration,
    ) -> Self {
        AcquisitionLoop {
            source,
            publisher,
            queue,
            rainfall: RainfallAccumulator::new(),
            running,
            poll_interval,
            persist_interval,
        }
    }

    /// Poll until the run flag is cleared, then hand the source back so the
    /// caller can close the connection.
    pub async fn run(mut self) -> S {
        info!(
            "Starting sensor acquisition every {} ms, persisting every {} s",
            self.poll_interval.as_millis(),
            self.persist_interval.as_secs()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_persist = Instant::now();

        while self.running.is_running() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.publisher.refresh_requested() => debug!("Forced sensor refresh"),
                _ = self.running.stopped() => break,
            }

            if let Err(e) = self.source.ensure_connected().await {
                error!("Modbus connection failed: {}", e);
                tokio::select! {
                    _ = sleep(CONNECT_BACKOFF) => {}
                    _ = self.running.stopped() => break,
                }
                continue;
            }

            let snapshot = self.poll_cycle(now_local()).await;

            if last_persist.elapsed() >= self.persist_interval {
                self.enqueue(Record::Snapshot(snapshot.as_ref().clone()));
                last_persist = Instant::now();
            }
        }

        info!("Sensor acquisition stopped");
        self.source
    }

    /// Read every sensor once, in fixed order, and publish the result.
    ///
    /// A failing sensor contributes its fallback values and never aborts the
    /// rest of the cycle, even when the read panics.
    pub async fn poll_cycle(&mut self, now: OffsetDateTime) -> Arc<Snapshot> {
        let mut snapshot = Snapshot::new(now);

        for sensor in SensorKind::POLL_ORDER {
            let read = AssertUnwindSafe(self.source.read(sensor))
                .catch_unwind()
                .await;
            let read = match read {
                Ok(read) => read,
                Err(payload) => {
                    error!(
                        "Panic reading {}: {}",
                        sensor.name(),
                        panic_message(payload.as_ref())
                    );
                    snapshot.merge(sensor.fallback());
                    continue;
                }
            };

            match read {
                Ok(readings) if readings.is_empty() => {
                    debug!("No usable {} reading this cycle", sensor.name());
                }
                Ok(readings) => {
                    info!("{}", sensor.summary(&readings));
                    snapshot.merge(readings);
                }
                Err(e) => {
                    error!("Error reading {}: {}", sensor.name(), e);
                    snapshot.merge(sensor.fallback());
                }
            }
        }

        self.accumulate_rainfall(&mut snapshot);
        self.publisher.publish(snapshot)
    }

    /// Replace the gauge's raw counter with today's running total
    fn accumulate_rainfall(&mut self, snapshot: &mut Snapshot) {
        let Some(raw) = snapshot.number(Metric::Rainfall) else {
            return;
        };

        let update = self.rainfall.update(raw, snapshot.timestamp.date());
        if let Some(day) = update.completed_day {
            self.enqueue(Record::DailyRainfall(day));
        }
        snapshot.insert(Metric::Rainfall, Value::Number(update.total));
    }

    fn enqueue(&self, record: Record) {
        if self.queue.send(record).is_err() {
            warn!("Persistence queue closed, dropping record");
        }
    }
}
