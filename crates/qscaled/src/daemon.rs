//! Task wiring for a running scaler process.
//!
//! Per managed service, one task runs the metrics ingest loop and, beside
//! it, the service's decision loop. A single purge task serves all stores.
//!
//! ```text
//! service task ──▶ run_ingest(FailoverMonitor) ──put()──▶ ObservationStore
//!      └──spawn──▶ ServiceScaler::run() ◀──snapshots()──────┘
//! purge task   ──▶ Purger::run() ──purge()──▶ every store
//! ```
//!
//! When a service's metrics source is lost, its decision loop is stopped
//! too; other services keep running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use qscale_autoscale::{ClusterScaler, ScalingStatus, ServiceScaler, warmup_delay};
use qscale_broker::{BrokerEndpointSet, FailoverMonitor, INITIAL_POLL_DELAY, SempClient, run_ingest};
use qscale_config::{ScalerConfig, ServiceConfig};
use qscale_metrics::Purger;
use qscale_state::{ClusterServiceMutator, ClusterTaskCountSource, ObservationStore};

/// Loop timings not carried in the configuration file.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub decision_interval: Duration,
    pub purge_interval: Duration,
    /// Bound on every cluster and broker call.
    pub call_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Delay before the first decision; `None` derives it from the
    /// broker polling interval.
    pub warmup: Option<Duration>,
    pub initial_poll_delay: Duration,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            decision_interval: Duration::from_secs(10),
            purge_interval: Duration::from_secs(120),
            call_timeout: Duration::from_millis(2500),
            shutdown_grace: Duration::from_secs(5),
            warmup: None,
            initial_poll_delay: INITIAL_POLL_DELAY,
        }
    }
}

/// The cluster control plane, seen through the two collaborator traits.
#[derive(Clone)]
pub struct ClusterClient {
    pub counts: Arc<dyn ClusterTaskCountSource>,
    pub mutator: Arc<dyn ClusterServiceMutator>,
}

/// Handles to everything spawned by [`spawn`].
pub struct RunningScaler {
    services: Vec<JoinHandle<()>>,
    purger: JoinHandle<()>,
    statuses: Vec<watch::Receiver<ScalingStatus>>,
}

impl RunningScaler {
    /// Latest status of every service scaler.
    pub fn statuses(&self) -> Vec<ScalingStatus> {
        self.statuses.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// Wait up to `grace` for all tasks to finish after shutdown was
    /// signalled, then abort whatever is left.
    pub async fn join(self, grace: Duration) -> Vec<ScalingStatus> {
        let receivers = self.statuses;
        let mut handles = self.services;
        handles.push(self.purger);

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(grace, all).await.is_err() {
            warn!(grace_secs = grace.as_secs(), "tasks still running after grace period, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
        receivers.iter().map(|rx| rx.borrow().clone()).collect()
    }
}

/// Spawn the ingest, decision and purge tasks for every configured service.
pub fn spawn(
    config: &ScalerConfig,
    cluster: ClusterClient,
    options: &DaemonOptions,
    shutdown: watch::Receiver<bool>,
) -> RunningScaler {
    let warmup = options
        .warmup
        .unwrap_or_else(|| warmup_delay(config.broker.polling_interval));
    let mut purger = Purger::new(options.purge_interval);
    let mut services = Vec::with_capacity(config.services.len());
    let mut statuses = Vec::with_capacity(config.services.len());

    for service in &config.services {
        let store = ObservationStore::new();
        purger.register(service.id.clone(), store.clone(), service.retention());

        let scaler = ServiceScaler::new(
            service.clone(),
            store.clone(),
            cluster.counts.clone(),
            ClusterScaler::new(cluster.mutator.clone(), options.call_timeout),
            options.call_timeout,
        );
        statuses.push(scaler.status());

        let monitor = broker_monitor(config, service, options.call_timeout);
        let timing = ServiceTiming {
            initial_poll_delay: options.initial_poll_delay,
            poll_interval: config.broker.polling_interval,
            warmup,
            decision_interval: options.decision_interval,
        };
        info!(
            service = %service.id,
            queue = %service.queue,
            "configured scaler for service"
        );
        services.push(tokio::spawn(run_service(
            monitor,
            scaler,
            store,
            timing,
            shutdown.clone(),
        )));
    }

    let purge_shutdown = shutdown.clone();
    let purger = tokio::spawn(async move { purger.run(purge_shutdown).await });

    RunningScaler {
        services,
        purger,
        statuses,
    }
}

fn broker_monitor(
    config: &ScalerConfig,
    service: &ServiceConfig,
    timeout: Duration,
) -> FailoverMonitor {
    let semp = Arc::new(SempClient::new(
        config.broker.msg_vpn_name.clone(),
        service.queue.clone(),
        timeout,
    ));
    FailoverMonitor::new(
        service.id.clone(),
        BrokerEndpointSet::new(config.broker.active.clone(), config.broker.standby.clone()),
        semp.clone(),
        semp,
        timeout,
    )
}

#[derive(Debug, Clone, Copy)]
struct ServiceTiming {
    initial_poll_delay: Duration,
    poll_interval: Duration,
    warmup: Duration,
    decision_interval: Duration,
}

async fn run_service(
    monitor: FailoverMonitor,
    scaler: ServiceScaler,
    store: ObservationStore,
    timing: ServiceTiming,
    shutdown: watch::Receiver<bool>,
) {
    let service = scaler.service().clone();
    let (stop_tx, stop_rx) = watch::channel(false);
    let decisions = tokio::spawn(scaler.run(timing.warmup, timing.decision_interval, stop_rx));

    if let Err(e) = run_ingest(
        monitor,
        store,
        timing.initial_poll_delay,
        timing.poll_interval,
        shutdown,
    )
    .await
    {
        error!(service = %service, error = %e, "metrics source lost, stopping scaler for service");
    }

    // Lets a cycle in progress finish.
    let _ = stop_tx.send(true);
    let _ = decisions.await;
}
