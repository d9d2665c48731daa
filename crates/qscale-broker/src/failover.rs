//! Active/standby failover for the metrics source.
//!
//! Each poll probes the active endpoint first. When it is not up and a
//! standby is, the two swap roles and the fetch goes to the new active
//! endpoint. When neither is up the poll is skipped. Consecutive fetch
//! failures are counted; more than [`MAX_CONSECUTIVE_FAILURES`] in a row
//! ends the monitor.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use qscale_state::{BrokerEndpoint, QueueMetrics, QueueMetricsSource, ServiceId, VpnStateProbe};

use crate::error::{MonitorError, MonitorResult};

/// Fetch failures tolerated in a row before the monitor gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// The active endpoint and optional standby for one service.
#[derive(Debug, Clone)]
pub struct BrokerEndpointSet {
    active: BrokerEndpoint,
    standby: Option<BrokerEndpoint>,
    consecutive_failures: u32,
}

impl BrokerEndpointSet {
    pub fn new(active: BrokerEndpoint, standby: Option<BrokerEndpoint>) -> Self {
        Self {
            active,
            standby,
            consecutive_failures: 0,
        }
    }

    pub fn active(&self) -> &BrokerEndpoint {
        &self.active
    }

    pub fn standby(&self) -> Option<&BrokerEndpoint> {
        self.standby.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Exchange active and standby. No-op without a standby.
    fn swap(&mut self) {
        if let Some(standby) = self.standby.as_mut() {
            mem::swap(&mut self.active, standby);
        }
    }

    fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Snapshot(QueueMetrics),
    /// Neither endpoint reported the VPN as up.
    Unavailable,
    /// The fetch failed; `failures` is the consecutive count so far.
    FetchFailed { failures: u32 },
}

/// Polls the metrics source for one service, failing over as needed.
pub struct FailoverMonitor {
    service: ServiceId,
    endpoints: BrokerEndpointSet,
    probe: Arc<dyn VpnStateProbe>,
    source: Arc<dyn QueueMetricsSource>,
    call_timeout: Duration,
}

impl FailoverMonitor {
    pub fn new(
        service: ServiceId,
        endpoints: BrokerEndpointSet,
        probe: Arc<dyn VpnStateProbe>,
        source: Arc<dyn QueueMetricsSource>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            service,
            endpoints,
            probe,
            source,
            call_timeout,
        }
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    pub fn endpoints(&self) -> &BrokerEndpointSet {
        &self.endpoints
    }

    /// Run one probe/fetch cycle.
    ///
    /// Errors only when the consecutive failure count exceeds
    /// [`MAX_CONSECUTIVE_FAILURES`].
    pub async fn poll(&mut self) -> MonitorResult<PollOutcome> {
        if !self.is_up(self.endpoints.active()).await {
            let standby_up = match self.endpoints.standby() {
                Some(standby) => self.is_up(standby).await,
                None => false,
            };
            if !standby_up {
                warn!(
                    service = %self.service,
                    active = %self.endpoints.active().semp_url,
                    "no metrics source endpoint is up, skipping poll"
                );
                return Ok(PollOutcome::Unavailable);
            }
            self.endpoints.swap();
            info!(
                service = %self.service,
                active = %self.endpoints.active().semp_url,
                "failed over to standby metrics source"
            );
        }

        let fetched =
            tokio::time::timeout(self.call_timeout, self.source.fetch(self.endpoints.active()))
                .await;
        match fetched {
            Ok(Ok(Some(metrics))) => {
                self.endpoints.record_success();
                Ok(PollOutcome::Snapshot(metrics))
            }
            Ok(Ok(None)) => self.fetch_failed("no queue metrics returned"),
            Ok(Err(e)) => self.fetch_failed(&e.to_string()),
            Err(_) => self.fetch_failed("queue metrics request timed out"),
        }
    }

    async fn is_up(&self, endpoint: &BrokerEndpoint) -> bool {
        match tokio::time::timeout(self.call_timeout, self.probe.is_up(endpoint)).await {
            Ok(up) => up,
            Err(_) => {
                warn!(
                    service = %self.service,
                    semp_url = %endpoint.semp_url,
                    "VPN state probe timed out"
                );
                false
            }
        }
    }

    fn fetch_failed(&mut self, reason: &str) -> MonitorResult<PollOutcome> {
        let failures = self.endpoints.record_failure();
        if failures > MAX_CONSECUTIVE_FAILURES {
            return Err(MonitorError::SourceUnavailable { failures });
        }
        warn!(
            service = %self.service,
            failures,
            max = MAX_CONSECUTIVE_FAILURES,
            reason,
            "failed to fetch queue metrics"
        );
        Ok(PollOutcome::FetchFailed { failures })
    }
}
