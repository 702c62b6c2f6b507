/// Shared state between the background tasks and presentation
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

use crate::models::Snapshot;

/// Cooperative shutdown flag.
///
/// Tasks poll `is_running` at their loop boundary; long sleeps can await
/// `stopped` instead so they wake as soon as the flag is cleared.
#[derive(Debug)]
pub struct RunFlag {
    running: AtomicBool,
    changed: Notify,
}

impl RunFlag {
    pub fn new() -> Self {
        RunFlag {
            running: AtomicBool::new(true),
            changed: Notify::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.changed.notify_waiters();
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        loop {
            let notified = self.changed.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Write side of the live snapshot, owned by the acquisition loop.
///
/// Each publish swaps in a whole new `Arc<Snapshot>`, so readers see either
/// the previous cycle or the new one, never a mix.
pub struct SnapshotPublisher {
    sender: watch::Sender<Arc<Snapshot>>,
    refresh: Arc<Notify>,
}

impl SnapshotPublisher {
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.sender.send_replace(snapshot.clone());
        snapshot
    }

    /// Resolves when presentation asks for an immediate refresh
    pub async fn refresh_requested(&self) {
        self.refresh.notified().await
    }
}

/// Read-only view of the station for presentation
#[derive(Clone)]
pub struct StationHandle {
    snapshot: watch::Receiver<Arc<Snapshot>>,
    refresh: Arc<Notify>,
}

impl StationHandle {
    /// The latest complete snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Ask the acquisition loop to poll right away instead of waiting for
    /// its next tick
    pub fn force_refresh(&self) {
        self.refresh.notify_one();
    }
}

pub fn snapshot_channel(initial: Snapshot) -> (SnapshotPublisher, StationHandle) {
    let (sender, receiver) = watch::channel(Arc::new(initial));
    let refresh = Arc::new(Notify::new());
    (
        SnapshotPublisher {
            sender,
            refresh: refresh.clone(),
        },
        StationHandle {
            snapshot: receiver,
            refresh,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, Value};
    use std::time::Duration;
    use time::OffsetDateTime;

    fn cycle(n: i64) -> Snapshot {
        let mut snapshot = Snapshot::new(OffsetDateTime::UNIX_EPOCH);
        for metric in Metric::PERSISTED {
            snapshot.insert(metric, Value::Integer(n));
        }
        snapshot
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_mixed_cycles() {
        let (publisher, handle) = snapshot_channel(cycle(0));
        let running = Arc::new(RunFlag::new());

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let handle = handle.clone();
                let running = running.clone();
                tokio::spawn(async move {
                    let mut observed = 0usize;
                    loop {
                        let snapshot = handle.current();
                        let first = snapshot.get(Metric::Temperature).cloned();
                        assert!(Metric::PERSISTED
                            .iter()
                            .all(|metric| snapshot.get(*metric) == first.as_ref()));
                        observed += 1;
                        if !running.is_running() {
                            break;
                        }
                        tokio::task::yield_now().await;
                    }
                    observed
                })
            })
            .collect();

        for n in 1..=2000 {
            publisher.publish(cycle(n));
            if n % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }
        running.stop();

        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
        assert_eq!(
            handle.current().get(Metric::Rainfall),
            Some(&Value::Integer(2000))
        );
    }

    #[tokio::test]
    async fn test_force_refresh_wakes_publisher() {
        let (publisher, handle) = snapshot_channel(cycle(0));
        handle.force_refresh();
        tokio::time::timeout(Duration::from_secs(1), publisher.refresh_requested())
            .await
            .expect("refresh was not delivered");
    }

    #[tokio::test]
    async fn test_run_flag_stopped_resolves() {
        let running = Arc::new(RunFlag::new());
        let waiter = {
            let running = running.clone();
            tokio::spawn(async move { running.stopped().await })
        };
        assert!(running.is_running());
        running.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!running.is_running());
    }
}
