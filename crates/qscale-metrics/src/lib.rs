//! qscale-metrics — windowed views over queue metric snapshots.
//!
//! # Architecture
//!
//! ```text
//! ObservationStore ──snapshots()──▶ reduce_window() ──▶ WindowedObservations
//!        ▲                                                ├── scale_out
//!        │                                                └── scale_in
//!        └── Purger::run() → purge() every interval
//! ```

pub mod purger;
pub mod window;

pub use purger::Purger;
pub use window::{DirectionObservation, FALLBACK_MAX_AGE, WindowedObservations, reduce_window};
