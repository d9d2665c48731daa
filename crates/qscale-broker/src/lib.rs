//! qscale-broker — metrics-source access for the autoscaler.
//!
//! Polls queue statistics from the broker's SEMP v2 monitor API and feeds
//! them into each service's [`ObservationStore`](qscale_state::ObservationStore).
//!
//! # Architecture
//!
//! ```text
//! run_ingest()                       (one task per service)
//!   └── FailoverMonitor::poll()
//!         ├── VpnStateProbe::is_up(active)  ──not up──▶ is_up(standby) ──▶ swap
//!         ├── QueueMetricsSource::fetch(active)
//!         └── consecutive failure count, fatal past 5
//!
//! SempClient  implements VpnStateProbe + QueueMetricsSource over client::exchange_with_tls()
//!             (http:// or https://, rustls)
//! ```

pub mod client;
pub mod error;
pub mod failover;
pub mod monitor;
pub mod semp;

pub use client::{HttpResponse, TlsConfig, encode_path_segment, exchange, exchange_with_tls};
pub use error::{MonitorError, MonitorResult};
pub use failover::{BrokerEndpointSet, FailoverMonitor, MAX_CONSECUTIVE_FAILURES, PollOutcome};
pub use monitor::{INITIAL_POLL_DELAY, run_ingest};
pub use semp::{SempClient, parse_queue_metrics};
