//! Purger — periodically drops snapshots older than each service's
//! retention window.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use qscale_state::{EpochMillis, ObservationStore, ServiceId, epoch_millis};

struct Tracked {
    service: ServiceId,
    store: ObservationStore,
    retention: Duration,
}

/// Purges every registered store on a fixed interval.
pub struct Purger {
    tracked: Vec<Tracked>,
    interval: Duration,
}

impl Purger {
    pub fn new(interval: Duration) -> Self {
        Self {
            tracked: Vec::new(),
            interval,
        }
    }

    /// Track a service's store with its retention window.
    pub fn register(&mut self, service: ServiceId, store: ObservationStore, retention: Duration) {
        debug!(service = %service, retention_secs = retention.as_secs(), "registered for purge");
        self.tracked.push(Tracked {
            service,
            store,
            retention,
        });
    }

    /// Purge all tracked stores as of `now`. Returns the total removed.
    pub fn purge_once(&self, now: EpochMillis) -> usize {
        self.tracked
            .iter()
            .map(|t| {
                let removed = t.store.purge(now, t.retention);
                if removed > 0 {
                    debug!(
                        service = %t.service,
                        removed,
                        retention_secs = t.retention.as_secs(),
                        "purged metric entries"
                    );
                }
                removed
            })
            .sum()
    }

    /// Run the purge loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            services = self.tracked.len(),
            "metrics purger started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.purge_once(epoch_millis());
                }
                _ = shutdown.changed() => {
                    info!("metrics purger shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qscale_state::QueueMetrics;

    const NOW: EpochMillis = 1_000_000;

    fn store_with_ages(ages_secs: &[u64]) -> ObservationStore {
        let store = ObservationStore::new();
        for age in ages_secs {
            store.put(NOW - age * 1000, QueueMetrics::default());
        }
        store
    }

    #[test]
    fn purge_once_applies_each_retention() {
        let a = store_with_ages(&[10, 130, 500]);
        let b = store_with_ages(&[10, 130, 500]);

        let mut purger = Purger::new(Duration::from_secs(120));
        purger.register(ServiceId::new("c", "a"), a.clone(), Duration::from_secs(120));
        purger.register(ServiceId::new("c", "b"), b.clone(), Duration::from_secs(600));

        assert_eq!(purger.purge_once(NOW), 2);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 3);
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let purger = Purger::new(Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { purger.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_purges_on_interval() {
        let store = ObservationStore::new();
        // Ancient entry; any tick removes it.
        store.put(1, QueueMetrics::default());

        let mut purger = Purger::new(Duration::from_secs(120));
        purger.register(ServiceId::new("c", "s"), store.clone(), Duration::from_secs(120));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { purger.run(rx).await });

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(store.is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
