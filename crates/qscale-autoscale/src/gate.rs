//! Decision gate — preconditions, hysteresis, cooldowns.
//!
//! ```text
//! Idle ─▶ preconditions ──fail──▶ Blocked(Unknown | NotSteady | InFlight)
//!              │ ok
//!              ▼
//!       reduce + resolve ──none computable──▶ NoObservations
//!              │
//!              ▼
//!        hysteresis ─▶ decide ─▶ cooldown ──active──▶ CoolingDown
//!                                    │
//!                                    ▼
//!                         Decided(NoOp | ScaleOut | ScaleIn)
//! ```
//!
//! The gate never talks to the cluster. A decided scale action is applied
//! by the caller, and only a confirmed apply is fed back via
//! [`ScalingState::commit`].

use std::fmt;
use std::time::Duration;

use qscale_config::ServiceConfig;
use qscale_metrics::WindowedObservations;
use qscale_state::{Direction, EpochMillis, ScalingDecision, TaskCounts};

use crate::target::{ResolvedTargets, resolve_targets};

/// Long-lived scaling state for one service, owned by its decision task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalingState {
    pub last_scale_out: Option<EpochMillis>,
    pub last_scale_in: Option<EpochMillis>,
    /// Replica count of the last confirmed mutation. `None` until the
    /// first steady cycle seeds it from the running count.
    pub last_confirmed: Option<u32>,
}

impl ScalingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the preconditions and return the current desired count.
    ///
    /// Seeds `last_confirmed` on the first steady pass.
    pub fn check_preconditions(&mut self, counts: TaskCounts) -> Result<u32, BlockReason> {
        let (Some(desired), Some(running)) = (counts.desired, counts.running) else {
            return Err(BlockReason::Unknown);
        };
        if desired != running {
            return Err(BlockReason::NotSteady { desired, running });
        }
        match self.last_confirmed {
            Some(confirmed) if confirmed != running => {
                Err(BlockReason::InFlight { confirmed, running })
            }
            Some(_) => Ok(desired),
            None => {
                self.last_confirmed = Some(running);
                Ok(desired)
            }
        }
    }

    /// True when `direction` is out of its cooldown at `now`.
    pub fn cooldown_elapsed(
        &self,
        direction: Direction,
        now: EpochMillis,
        cooldown: Duration,
    ) -> bool {
        let last = match direction {
            Direction::ScaleOut => self.last_scale_out,
            Direction::ScaleIn => self.last_scale_in,
        };
        match last {
            Some(last) => now.saturating_sub(last) >= cooldown.as_millis() as EpochMillis,
            None => true,
        }
    }

    /// Record a confirmed mutation.
    pub fn commit(&mut self, decision: ScalingDecision, now: EpochMillis) {
        match decision {
            ScalingDecision::NoOp => {}
            ScalingDecision::ScaleOut(target) => {
                self.last_confirmed = Some(target);
                self.last_scale_out = Some(now);
            }
            ScalingDecision::ScaleIn(target) => {
                self.last_confirmed = Some(target);
                self.last_scale_in = Some(now);
            }
        }
    }
}

/// Why a cycle was skipped before any target was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Desired or running count not reported.
    Unknown,
    /// A deployment is still converging.
    NotSteady { desired: u32, running: u32 },
    /// A previous mutation has not shown up in the running count yet.
    InFlight { confirmed: u32, running: u32 },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Unknown => f.write_str("desired/running count unknown"),
            BlockReason::NotSteady { desired, running } => {
                write!(f, "not steady: desired={desired} running={running}")
            }
            BlockReason::InFlight { confirmed, running } => {
                write!(f, "scaling in flight: confirmed={confirmed} running={running}")
            }
        }
    }
}

/// Result of evaluating one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Blocked(BlockReason),
    /// Neither direction had usable observations.
    NoObservations,
    /// A scale action was wanted but its direction is cooling down.
    CoolingDown(ScalingDecision),
    /// Final decision for this cycle; may be [`ScalingDecision::NoOp`].
    Decided {
        decision: ScalingDecision,
        current_desired: u32,
        targets: ResolvedTargets,
    },
}

/// Evaluates scaling cycles for one service.
#[derive(Debug, Clone)]
pub struct DecisionGate {
    config: ServiceConfig,
}

impl DecisionGate {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run one cycle's decision logic against `state`.
    ///
    /// Only the first-pass seeding of `last_confirmed` mutates `state`;
    /// committing an applied decision is left to the caller.
    pub fn evaluate(
        &self,
        state: &mut ScalingState,
        counts: TaskCounts,
        observations: &WindowedObservations,
        now: EpochMillis,
    ) -> GateOutcome {
        let current_desired = match state.check_preconditions(counts) {
            Ok(desired) => desired,
            Err(reason) => return GateOutcome::Blocked(reason),
        };
        if !observations.any_computable() {
            return GateOutcome::NoObservations;
        }

        let targets =
            resolve_targets(&self.config, observations, current_desired).with_hysteresis();
        let decision = decide(targets, current_desired);

        if let Some(direction) = decision.direction() {
            let cooldown = match direction {
                Direction::ScaleOut => self.config.scale_out.cooldown,
                Direction::ScaleIn => self.config.scale_in.cooldown,
            };
            if !state.cooldown_elapsed(direction, now, cooldown) {
                return GateOutcome::CoolingDown(decision);
            }
        }

        GateOutcome::Decided {
            decision,
            current_desired,
            targets,
        }
    }
}

/// Scale-out wins over scale-in; otherwise no-op.
pub fn decide(targets: ResolvedTargets, current_desired: u32) -> ScalingDecision {
    match (targets.scale_out, targets.scale_in) {
        (Some(out), _) if out > current_desired => ScalingDecision::ScaleOut(out),
        (_, Some(inn)) if inn < current_desired => ScalingDecision::ScaleIn(inn),
        _ => ScalingDecision::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qscale_config::ScalerOperation;
    use qscale_metrics::DirectionObservation;
    use qscale_state::ServiceId;

    const NOW: EpochMillis = 1_000_000_000;

    fn config() -> ServiceConfig {
        ServiceConfig {
            id: ServiceId::new("prod", "orders"),
            queue: "orders".into(),
            min_replicas: 1,
            max_replicas: 10,
            message_count_target: 50,
            message_receive_rate_target: 0,
            message_spool_usage_target: 0,
            scale_out: ScalerOperation {
                max_scale_step: 5,
                cooldown: Duration::from_secs(60),
                stabilization_window: Duration::from_secs(30),
            },
            scale_in: ScalerOperation {
                max_scale_step: 2,
                cooldown: Duration::from_secs(120),
                stabilization_window: Duration::from_secs(300),
            },
        }
    }

    fn obs(out_count: u64, in_count: u64) -> WindowedObservations {
        let dir = |count| DirectionObservation {
            max_message_count: count,
            max_message_rate: 0,
            found_in_window: true,
            newest_snapshot_age: Some(Duration::from_secs(1)),
            computable: true,
        };
        WindowedObservations {
            scale_out: dir(out_count),
            scale_in: dir(in_count),
        }
    }

    #[test]
    fn unknown_counts_block() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState::new();
        let counts = TaskCounts {
            desired: Some(5),
            running: None,
        };
        assert_eq!(
            gate.evaluate(&mut state, counts, &obs(500, 500), NOW),
            GateOutcome::Blocked(BlockReason::Unknown)
        );
        assert_eq!(state.last_confirmed, None);
    }

    #[test]
    fn unsteady_counts_block() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState::new();
        assert_eq!(
            gate.evaluate(&mut state, TaskCounts::known(5, 4), &obs(500, 500), NOW),
            GateOutcome::Blocked(BlockReason::NotSteady {
                desired: 5,
                running: 4
            })
        );
    }

    #[test]
    fn first_pass_seeds_confirmed_count() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState::new();
        // 250 / 50 = 5 replicas: nothing to do.
        let outcome = gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(250, 250), NOW);
        assert!(matches!(
            outcome,
            GateOutcome::Decided {
                decision: ScalingDecision::NoOp,
                ..
            }
        ));
        assert_eq!(state.last_confirmed, Some(5));
    }

    #[test]
    fn scale_out_decided_and_committed() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState::new();

        let outcome = gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(500, 500), NOW);
        let GateOutcome::Decided { decision, .. } = outcome else {
            panic!("expected a decision, got {outcome:?}");
        };
        assert_eq!(decision, ScalingDecision::ScaleOut(10));

        state.commit(decision, NOW);
        assert_eq!(state.last_confirmed, Some(10));
        assert_eq!(state.last_scale_out, Some(NOW));
        assert_eq!(state.last_scale_in, None);
    }

    #[test]
    fn in_flight_blocks_regardless_of_targets() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState {
            last_confirmed: Some(3),
            ..ScalingState::default()
        };
        assert_eq!(
            gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(10_000, 10_000), NOW),
            GateOutcome::Blocked(BlockReason::InFlight {
                confirmed: 3,
                running: 5
            })
        );
    }

    #[test]
    fn no_observations_skip() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState::new();
        let outcome = gate.evaluate(
            &mut state,
            TaskCounts::known(5, 5),
            &WindowedObservations::default(),
            NOW,
        );
        assert_eq!(outcome, GateOutcome::NoObservations);
    }

    #[test]
    fn scale_in_decided() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState::new();
        let outcome = gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(20, 20), NOW);
        assert!(matches!(
            outcome,
            GateOutcome::Decided {
                decision: ScalingDecision::ScaleIn(3),
                ..
            }
        ));
    }

    #[test]
    fn hysteresis_prevents_scale_in_below_scale_out() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState::new();
        // Short window sees 250 (-> 5), long window saw only 20 (-> 3).
        // Clamped scale-in target is 5, equal to desired: no-op.
        let outcome = gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(250, 20), NOW);
        let GateOutcome::Decided {
            decision, targets, ..
        } = outcome
        else {
            panic!("expected a decision, got {outcome:?}");
        };
        assert_eq!(targets.scale_in, Some(5));
        assert_eq!(decision, ScalingDecision::NoOp);
    }

    #[test]
    fn cooldown_downgrades_to_noop() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState {
            last_scale_out: Some(NOW - 30_000),
            last_confirmed: Some(5),
            ..ScalingState::default()
        };
        assert_eq!(
            gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(500, 500), NOW),
            GateOutcome::CoolingDown(ScalingDecision::ScaleOut(10))
        );

        // Exactly at the boundary the cooldown has elapsed.
        state.last_scale_out = Some(NOW - 60_000);
        assert!(matches!(
            gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(500, 500), NOW),
            GateOutcome::Decided {
                decision: ScalingDecision::ScaleOut(10),
                ..
            }
        ));
    }

    #[test]
    fn scale_in_cooldown_is_independent() {
        let gate = DecisionGate::new(config());
        let mut state = ScalingState {
            last_scale_out: Some(NOW),
            ..ScalingState::default()
        };
        assert!(matches!(
            gate.evaluate(&mut state, TaskCounts::known(5, 5), &obs(20, 20), NOW),
            GateOutcome::Decided {
                decision: ScalingDecision::ScaleIn(3),
                ..
            }
        ));
    }

    #[test]
    fn decide_prefers_scale_out() {
        let targets = ResolvedTargets {
            scale_out: Some(7),
            scale_in: Some(2),
        };
        assert_eq!(decide(targets, 5), ScalingDecision::ScaleOut(7));
        assert_eq!(decide(ResolvedTargets::default(), 5), ScalingDecision::NoOp);
    }

    #[test]
    fn noop_commit_changes_nothing() {
        let mut state = ScalingState::new();
        state.commit(ScalingDecision::NoOp, NOW);
        assert_eq!(state, ScalingState::default());
    }
}
