//! ObservationStore — time-keyed metric snapshots for one managed service.
//!
//! Snapshots are keyed by capture time (epoch ms). Inserts are O(1) and
//! may arrive out of order; iteration order is unspecified. Readers get a
//! copied view, so a snapshot is never observed half-written, and a key
//! inserted while a reader copies may or may not be included.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::types::{EpochMillis, MetricSnapshot, QueueMetrics};

/// Snapshots are always kept for at least this long.
pub const MIN_RETENTION: Duration = Duration::from_secs(120);

/// Retention for a service: twice the larger stabilization window, and
/// never less than [`MIN_RETENTION`].
pub fn retention_window(scale_out_window: Duration, scale_in_window: Duration) -> Duration {
    (scale_out_window.max(scale_in_window) * 2).max(MIN_RETENTION)
}

/// Thread-safe snapshot store shared by the ingest, purge and decision tasks.
#[derive(Clone, Default)]
pub struct ObservationStore {
    entries: Arc<RwLock<HashMap<EpochMillis, QueueMetrics>>>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a snapshot captured at `timestamp`.
    ///
    /// A second snapshot with the same timestamp replaces the first.
    pub fn put(&self, timestamp: EpochMillis, metrics: QueueMetrics) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(timestamp, metrics);
    }

    /// Remove every snapshot older than `retention` relative to `now`.
    ///
    /// Returns the number of snapshots removed.
    pub fn purge(&self, now: EpochMillis, retention: Duration) -> usize {
        let retention_ms = retention.as_millis() as EpochMillis;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|ts, _| ts.saturating_add(retention_ms) >= now);
        let removed = before - entries.len();
        debug!(
            removed,
            retained = entries.len(),
            retention_secs = retention.as_secs(),
            "purged old metric snapshots"
        );
        removed
    }

    /// Copy out all stored snapshots, in no particular order.
    pub fn snapshots(&self) -> Vec<MetricSnapshot> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(&timestamp, &metrics)| MetricSnapshot { timestamp, metrics })
            .collect()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
