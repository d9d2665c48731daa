//! qscale-state — shared state for the qscale autoscaler.
//!
//! Holds the domain types every other crate speaks (metric snapshots,
//! task counts, scaling decisions), the narrow collaborator contracts the
//! decision engine consumes, and the in-memory [`ObservationStore`] that
//! the broker ingest task writes and the decision loop reads.
//!
//! # Architecture
//!
//! ```text
//! ingest task ──put()──▶ ObservationStore ◀──snapshots()── decision loop
//!                              ▲
//!                              └──────purge()────────────── purge task
//! ```
//!
//! The `ObservationStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<RwLock<..>>`) and can be shared across async tasks.

pub mod collaborators;
pub mod error;
pub mod store;
pub mod types;

pub use collaborators::{
    BoxFuture, ClusterServiceMutator, ClusterTaskCountSource, QueueMetricsSource, VpnStateProbe,
    is_success_status,
};
pub use error::{CollaboratorError, CollaboratorResult};
pub use store::{ObservationStore, retention_window};
pub use types::*;
