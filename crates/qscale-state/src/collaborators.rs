//! Contracts for the external systems the decision engine talks to.
//!
//! The core only ever sees these traits. Transport, authentication and
//! request shaping live in the adapters (`qscale-broker::semp`, the
//! daemon's control-plane client) or in test fakes.
//!
//! Methods return boxed futures so implementations can be held as
//! `Arc<dyn Trait>` and shared between tasks.

use std::future::Future;
use std::pin::Pin;

use crate::error::CollaboratorResult;
use crate::types::{BrokerEndpoint, QueueMetrics, ServiceId, TaskCounts};

/// A pinned, boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reports desired/running replica counts for a managed service.
pub trait ClusterTaskCountSource: Send + Sync {
    fn task_counts<'a>(
        &'a self,
        service: &'a ServiceId,
    ) -> BoxFuture<'a, CollaboratorResult<TaskCounts>>;
}

/// Changes the desired replica count of a managed service.
///
/// Returns the HTTP-style status of the mutation; see [`is_success_status`].
pub trait ClusterServiceMutator: Send + Sync {
    fn set_desired_count<'a>(
        &'a self,
        service: &'a ServiceId,
        count: u32,
    ) -> BoxFuture<'a, CollaboratorResult<u16>>;
}

/// Fetches queue statistics from a metrics-source endpoint.
///
/// `Ok(None)` means the endpoint answered but had nothing usable
/// (e.g. a non-success status).
pub trait QueueMetricsSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        endpoint: &'a BrokerEndpoint,
    ) -> BoxFuture<'a, CollaboratorResult<Option<QueueMetrics>>>;
}

/// Reports whether the message VPN behind an endpoint is "up".
///
/// Any failure to ask is reported as not up.
pub trait VpnStateProbe: Send + Sync {
    fn is_up<'a>(&'a self, endpoint: &'a BrokerEndpoint) -> BoxFuture<'a, bool>;
}

/// Statuses the control plane and the metrics source treat as success.
pub fn is_success_status(status: u16) -> bool {
    (200..=204).contains(&status)
}
