//! Window reducer — folds stored snapshots into per-direction maxima.
//!
//! Each direction looks back over its own stabilization window and keeps
//! the largest message count and receive rate seen strictly inside it. When
//! a window is empty, the newest snapshot overall stands in for it, provided
//! it is younger than [`FALLBACK_MAX_AGE`].

use std::time::Duration;

use qscale_state::{EpochMillis, MetricSnapshot};

/// Oldest snapshot that may stand in for an empty window.
pub const FALLBACK_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// What one direction saw over its stabilization window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionObservation {
    pub max_message_count: u64,
    pub max_message_rate: u64,
    /// At least one snapshot fell strictly inside the window.
    pub found_in_window: bool,
    /// Age of the newest snapshot in the store, if any.
    pub newest_snapshot_age: Option<Duration>,
    /// The maxima above may be used to compute a target.
    pub computable: bool,
}

/// Reduced observations for both directions of one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowedObservations {
    pub scale_out: DirectionObservation,
    pub scale_in: DirectionObservation,
}

impl WindowedObservations {
    /// False when the decision cycle has nothing to work with.
    pub fn any_computable(&self) -> bool {
        self.scale_out.computable || self.scale_in.computable
    }
}

/// Reduce `snapshots` as of `now` using the two stabilization windows.
///
/// Input order does not matter.
pub fn reduce_window(
    snapshots: &[MetricSnapshot],
    now: EpochMillis,
    scale_out_window: Duration,
    scale_in_window: Duration,
) -> WindowedObservations {
    let out_horizon = now.saturating_sub(scale_out_window.as_millis() as EpochMillis);
    let in_horizon = now.saturating_sub(scale_in_window.as_millis() as EpochMillis);

    let mut scale_out = DirectionObservation::default();
    let mut scale_in = DirectionObservation::default();
    let mut newest: Option<&MetricSnapshot> = None;

    for snap in snapshots {
        if snap.timestamp > out_horizon {
            absorb(&mut scale_out, snap);
        }
        if snap.timestamp > in_horizon {
            absorb(&mut scale_in, snap);
        }
        if newest.is_none_or(|n| snap.timestamp > n.timestamp) {
            newest = Some(snap);
        }
    }

    let newest_age =
        newest.map(|n| Duration::from_millis(now.saturating_sub(n.timestamp)));
    for direction in [&mut scale_out, &mut scale_in] {
        direction.newest_snapshot_age = newest_age;
        finish(direction, newest);
    }

    WindowedObservations {
        scale_out,
        scale_in,
    }
}

fn absorb(direction: &mut DirectionObservation, snap: &MetricSnapshot) {
    direction.max_message_count = direction.max_message_count.max(snap.metrics.message_count);
    direction.max_message_rate = direction
        .max_message_rate
        .max(snap.metrics.message_receive_rate);
    direction.found_in_window = true;
}

fn finish(direction: &mut DirectionObservation, newest: Option<&MetricSnapshot>) {
    if direction.found_in_window {
        direction.computable = true;
        return;
    }
    match (newest, direction.newest_snapshot_age) {
        (Some(snap), Some(age)) if age < FALLBACK_MAX_AGE => {
            direction.max_message_count = snap.metrics.message_count;
            direction.max_message_rate = snap.metrics.message_receive_rate;
            direction.computable = true;
        }
        _ => direction.computable = false,
    }
}
