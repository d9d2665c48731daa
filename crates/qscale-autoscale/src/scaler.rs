//! Service scaler — the per-service decision loop.
//!
//! Each managed service gets its own `ServiceScaler`, spawned as its own
//! task. The scaler owns that service's [`ScalingState`], so no other task
//! ever touches it. One cycle:
//!
//! ```text
//! task_counts() ─▶ reduce_window(store) ─▶ DecisionGate::evaluate()
//!                                               │
//!                           Decided(ScaleOut|ScaleIn)
//!                                               ▼
//!                          ClusterScaler::set_desired_count()
//!                                 ok │         │ err
//!                     ScalingState::commit()   log, retry next cycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use qscale_config::ServiceConfig;
use qscale_metrics::reduce_window;
use qscale_state::{
    ClusterTaskCountSource, EpochMillis, ObservationStore, ScalingDecision, ServiceId, TaskCounts,
    epoch_millis,
};

use crate::cluster::ClusterScaler;
use crate::gate::{BlockReason, DecisionGate, GateOutcome, ScalingState};

/// Shortest wait before the first decision, regardless of polling interval.
const MIN_WARMUP_POLL: Duration = Duration::from_secs(60);
/// Extra slack on top of the polling interval before the first decision.
const WARMUP_SLACK: Duration = Duration::from_secs(10);

/// How long to wait after startup before deciding, so the store holds
/// at least one poll's worth of snapshots.
pub fn warmup_delay(polling_interval: Duration) -> Duration {
    polling_interval.max(MIN_WARMUP_POLL) + WARMUP_SLACK
}

/// Read-only view of a scaler, published after every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingStatus {
    pub service: ServiceId,
    pub cycles: u64,
    pub last_decision: Option<ScalingDecision>,
    pub last_confirmed: Option<u32>,
    pub last_scale_out: Option<EpochMillis>,
    pub last_scale_in: Option<EpochMillis>,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Blocked(BlockReason),
    NoObservations,
    CoolingDown(ScalingDecision),
    NoOp,
    /// Mutation confirmed and committed.
    Scaled(ScalingDecision),
    /// Mutation failed; nothing committed.
    ApplyFailed(ScalingDecision),
}

pub struct ServiceScaler {
    gate: DecisionGate,
    state: ScalingState,
    store: ObservationStore,
    counts: Arc<dyn ClusterTaskCountSource>,
    cluster: ClusterScaler,
    call_timeout: Duration,
    status: watch::Sender<ScalingStatus>,
}

impl ServiceScaler {
    pub fn new(
        config: ServiceConfig,
        store: ObservationStore,
        counts: Arc<dyn ClusterTaskCountSource>,
        cluster: ClusterScaler,
        call_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(ScalingStatus {
            service: config.id.clone(),
            cycles: 0,
            last_decision: None,
            last_confirmed: None,
            last_scale_out: None,
            last_scale_in: None,
        });
        Self {
            gate: DecisionGate::new(config),
            state: ScalingState::new(),
            store,
            counts,
            cluster,
            call_timeout,
            status,
        }
    }

    pub fn service(&self) -> &ServiceId {
        &self.gate.config().id
    }

    pub fn state(&self) -> &ScalingState {
        &self.state
    }

    /// Subscribe to this scaler's status updates.
    pub fn status(&self) -> watch::Receiver<ScalingStatus> {
        self.status.subscribe()
    }

    /// Run one decision cycle as of `now`.
    pub async fn run_cycle(&mut self, now: EpochMillis) -> CycleOutcome {
        let counts = self.fetch_counts().await;
        let config = self.gate.config();
        let observations = reduce_window(
            &self.store.snapshots(),
            now,
            config.scale_out.stabilization_window,
            config.scale_in.stabilization_window,
        );
        let service = config.id.clone();

        let outcome = match self.gate.evaluate(&mut self.state, counts, &observations, now) {
            GateOutcome::Blocked(reason) => {
                info!(service = %service, %reason, "skipping scaling cycle");
                CycleOutcome::Blocked(reason)
            }
            GateOutcome::NoObservations => {
                warn!(service = %service, "no usable metric observations, skipping cycle");
                CycleOutcome::NoObservations
            }
            GateOutcome::CoolingDown(decision) => {
                debug!(service = %service, ?decision, "cooldown active, not scaling");
                CycleOutcome::CoolingDown(decision)
            }
            GateOutcome::Decided {
                decision: ScalingDecision::NoOp,
                current_desired,
                targets,
            } => {
                debug!(
                    service = %service,
                    current_desired,
                    scale_out_target = ?targets.scale_out,
                    scale_in_target = ?targets.scale_in,
                    "no scaling needed"
                );
                CycleOutcome::NoOp
            }
            GateOutcome::Decided {
                decision,
                current_desired,
                ..
            } => self.apply(decision, current_desired, now).await,
        };

        self.publish(outcome);
        outcome
    }

    async fn apply(
        &mut self,
        decision: ScalingDecision,
        current_desired: u32,
        now: EpochMillis,
    ) -> CycleOutcome {
        let Some(target) = decision.target() else {
            return CycleOutcome::NoOp;
        };
        let service = self.gate.config().id.clone();
        info!(
            service = %service,
            direction = ?decision.direction(),
            from = current_desired,
            to = target,
            "scaling service"
        );

        match self.cluster.set_desired_count(&service, target).await {
            Ok(()) => {
                self.state.commit(decision, now);
                CycleOutcome::Scaled(decision)
            }
            Err(e) => {
                error!(
                    service = %service,
                    target,
                    error = %e,
                    "scaling action failed, will retry next cycle"
                );
                CycleOutcome::ApplyFailed(decision)
            }
        }
    }

    async fn fetch_counts(&self) -> TaskCounts {
        let service = self.service();
        match tokio::time::timeout(self.call_timeout, self.counts.task_counts(service)).await {
            Ok(Ok(counts)) => counts,
            Ok(Err(e)) => {
                warn!(service = %service, error = %e, "failed to read task counts");
                TaskCounts::unknown()
            }
            Err(_) => {
                warn!(
                    service = %service,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "task count request timed out"
                );
                TaskCounts::unknown()
            }
        }
    }

    fn publish(&self, outcome: CycleOutcome) {
        let decision = match outcome {
            CycleOutcome::Scaled(d)
            | CycleOutcome::ApplyFailed(d)
            | CycleOutcome::CoolingDown(d) => Some(d),
            CycleOutcome::NoOp => Some(ScalingDecision::NoOp),
            CycleOutcome::Blocked(_) | CycleOutcome::NoObservations => None,
        };
        let state = self.state;
        self.status.send_modify(|s| {
            s.cycles += 1;
            if decision.is_some() {
                s.last_decision = decision;
            }
            s.last_confirmed = state.last_confirmed;
            s.last_scale_out = state.last_scale_out;
            s.last_scale_in = state.last_scale_in;
        });
    }

    /// Run the decision loop until shutdown signal.
    ///
    /// Waits `warmup` before the first cycle, then runs every `interval`.
    /// A cycle in progress always completes before shutdown is observed.
    pub async fn run(
        mut self,
        warmup: Duration,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let service = self.service().clone();
        info!(
            service = %service,
            warmup_secs = warmup.as_secs(),
            interval_secs = interval.as_secs(),
            "service scaler started"
        );

        tokio::select! {
            _ = tokio::time::sleep(warmup) => {}
            _ = shutdown.changed() => {
                info!(service = %service, "service scaler shutting down");
                return;
            }
        }

        loop {
            self.run_cycle(epoch_millis()).await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!(service = %service, "service scaler shutting down");
                    break;
                }
            }
        }
    }
}
