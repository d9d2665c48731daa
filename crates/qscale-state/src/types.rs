//! Domain types shared across the qscale crates.
//!
//! Timestamps are unix epoch milliseconds throughout; replica counts are
//! `u32` so "negative" counts cannot be represented.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
pub type EpochMillis = u64;

// ── Service identity ───────────────────────────────────────────────

/// Identifies one managed service on the cluster control plane.
///
/// Displays as `{cluster}/{service}`, which is also the `service` field
/// used in every log line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId {
    pub cluster: String,
    pub service: String,
}

impl ServiceId {
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.service)
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// Queue statistics captured from the metrics source in one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// Messages currently spooled on the queue.
    pub message_count: u64,
    /// Average inbound message rate (messages per second).
    pub message_receive_rate: u64,
    /// Bytes of spool used by the queue.
    pub message_spool_usage: u64,
}

/// A [`QueueMetrics`] value keyed by its capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: EpochMillis,
    pub metrics: QueueMetrics,
}

// ── Cluster ───────────────────────────────────────────────────────

/// Desired and running replica counts as reported by the control plane.
///
/// `None` means "unknown", never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub desired: Option<u32>,
    pub running: Option<u32>,
}

impl TaskCounts {
    pub fn known(desired: u32, running: u32) -> Self {
        Self {
            desired: Some(desired),
            running: Some(running),
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }
}

// ── Scaling ───────────────────────────────────────────────────────

/// Which way a scaling action moves the replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ScaleOut,
    ScaleIn,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ScaleOut => f.write_str("scale-out"),
            Direction::ScaleIn => f.write_str("scale-in"),
        }
    }
}

/// Outcome of one decision cycle for a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", content = "target", rename_all = "snake_case")]
pub enum ScalingDecision {
    /// Leave the replica count alone.
    NoOp,
    /// Raise the desired count to the target.
    ScaleOut(u32),
    /// Lower the desired count to the target.
    ScaleIn(u32),
}

impl ScalingDecision {
    /// The direction of the action, or `None` for a no-op.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            ScalingDecision::NoOp => None,
            ScalingDecision::ScaleOut(_) => Some(Direction::ScaleOut),
            ScalingDecision::ScaleIn(_) => Some(Direction::ScaleIn),
        }
    }

    /// The target replica count, or `None` for a no-op.
    pub fn target(&self) -> Option<u32> {
        match self {
            ScalingDecision::NoOp => None,
            ScalingDecision::ScaleOut(n) | ScalingDecision::ScaleIn(n) => Some(*n),
        }
    }
}

// ── Broker ────────────────────────────────────────────────────────

/// One metrics-source (broker management) endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    /// Base management URL, e.g. `http://broker-a:8080`.
    pub semp_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerEndpoint {
    pub fn new(semp_url: impl Into<String>) -> Self {
        Self {
            semp_url: semp_url.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }
}

// Credentials stay out of logs.
impl fmt::Debug for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerEndpoint")
            .field("semp_url", &self.semp_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as EpochMillis
}
