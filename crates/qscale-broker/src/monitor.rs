//! Ingest loop — polls the metrics source and fills the observation store.
//!
//! One loop per managed service, each driven by its own
//! [`FailoverMonitor`]. The loop ends on shutdown, or with an error once the
//! monitor gives up on the metrics source.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use qscale_state::{ObservationStore, epoch_millis};

use crate::error::MonitorResult;
use crate::failover::{FailoverMonitor, PollOutcome};

/// Default delay before the first poll after startup.
pub const INITIAL_POLL_DELAY: Duration = Duration::from_secs(5);

/// Poll every `interval`, starting after `initial_delay`, until shutdown.
/// Each snapshot is stored under its capture time.
pub async fn run_ingest(
    mut monitor: FailoverMonitor,
    store: ObservationStore,
    initial_delay: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> MonitorResult<()> {
    let service = monitor.service().clone();
    info!(
        service = %service,
        interval_secs = interval.as_secs(),
        active = %monitor.endpoints().active().semp_url,
        "metrics ingest started"
    );

    let mut delay = initial_delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                info!(service = %service, "metrics ingest shutting down");
                return Ok(());
            }
        }
        delay = interval;

        match monitor.poll().await {
            Ok(PollOutcome::Snapshot(metrics)) => {
                store.put(epoch_millis(), metrics);
                debug!(
                    service = %service,
                    message_count = metrics.message_count,
                    message_receive_rate = metrics.message_receive_rate,
                    message_spool_usage = metrics.message_spool_usage,
                    "stored queue metrics"
                );
            }
            Ok(PollOutcome::Unavailable | PollOutcome::FetchFailed { .. }) => {}
            Err(e) => {
                error!(service = %service, error = %e, "metrics ingest stopped");
                return Err(e);
            }
        }
    }
}
