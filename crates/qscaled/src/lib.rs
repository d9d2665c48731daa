//! qscaled — the qscale daemon.
//!
//! Wires the configured services to the broker and the cluster control
//! plane and runs them until shutdown.

pub mod control_plane;
pub mod daemon;

pub use control_plane::HttpControlPlane;
pub use daemon::{ClusterClient, DaemonOptions, RunningScaler, spawn};
