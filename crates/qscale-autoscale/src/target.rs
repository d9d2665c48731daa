//! Replica target calculator.
//!
//! ```text
//! factor    = 1.0 (scale-out) | 0.9 (scale-in)
//! candidate = ceil(observation / (target * factor))
//!
//! scale-out: candidate = min(candidate, desired + step)   if step > 0
//!            candidate = min(candidate, max_replicas)
//! scale-in:  candidate = max(candidate, desired - step)   if step > 0
//!            candidate = max(candidate, min_replicas)
//! ```
//!
//! A direction's target is the largest candidate across the tracked metrics
//! (message count, receive rate). Metrics whose target is 0 are disabled.

use qscale_config::ServiceConfig;
use qscale_metrics::{DirectionObservation, WindowedObservations};
use qscale_state::Direction;

/// Headroom applied when scaling in, so the fleet is not shrunk to exactly
/// the load it carries.
pub const SCALE_IN_ADJUSTMENT: f64 = 0.9;

/// Candidate replica count for one metric in one direction.
///
/// `boundary` is `max_replicas` for scale-out and `min_replicas` for
/// scale-in. A missing or negative `step` means no step cap. Returns `None`
/// when the inputs cannot produce a target: `target < 1`, or a negative
/// observation, boundary or current desired count.
///
/// The scale-in step floor wins over `max_replicas`: a service already above
/// its maximum walks down by at most `step` per action.
pub fn compute_target(
    direction: Direction,
    target: i64,
    observation: i64,
    boundary: i64,
    step: Option<i64>,
    current_desired: i64,
) -> Option<u32> {
    if target < 1 || observation < 0 || boundary < 0 || current_desired < 0 {
        return None;
    }
    let step = step.filter(|s| *s > 0).unwrap_or(0);

    let factor = match direction {
        Direction::ScaleOut => 1.0,
        Direction::ScaleIn => SCALE_IN_ADJUSTMENT,
    };
    let raw = observation as f64 / (target as f64 * factor);
    let mut candidate = raw.ceil() as i64;

    match direction {
        Direction::ScaleOut => {
            if step > 0 {
                candidate = candidate.min(current_desired.saturating_add(step));
            }
            candidate = candidate.min(boundary);
        }
        Direction::ScaleIn => {
            if step > 0 {
                candidate = candidate.max(current_desired.saturating_sub(step));
            }
            candidate = candidate.max(boundary);
        }
    }

    u32::try_from(candidate).ok()
}

/// Per-direction targets for one decision cycle, before hysteresis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub scale_out: Option<u32>,
    pub scale_in: Option<u32>,
}

impl ResolvedTargets {
    /// Never let scale-in undershoot scale-out.
    pub fn with_hysteresis(self) -> Self {
        match (self.scale_out, self.scale_in) {
            (Some(out), Some(inn)) if inn < out => Self {
                scale_out: Some(out),
                scale_in: Some(out),
            },
            _ => self,
        }
    }
}

/// Resolve both directions' targets from the reduced observations.
pub fn resolve_targets(
    config: &ServiceConfig,
    observations: &WindowedObservations,
    current_desired: u32,
) -> ResolvedTargets {
    ResolvedTargets {
        scale_out: direction_target(
            config,
            Direction::ScaleOut,
            &observations.scale_out,
            current_desired,
        ),
        scale_in: direction_target(
            config,
            Direction::ScaleIn,
            &observations.scale_in,
            current_desired,
        ),
    }
}

fn direction_target(
    config: &ServiceConfig,
    direction: Direction,
    observation: &DirectionObservation,
    current_desired: u32,
) -> Option<u32> {
    if !observation.computable {
        return None;
    }
    let (boundary, step) = match direction {
        Direction::ScaleOut => (config.max_replicas, config.scale_out.max_scale_step),
        Direction::ScaleIn => (config.min_replicas, config.scale_in.max_scale_step),
    };
    let metrics = [
        (config.message_count_target, observation.max_message_count),
        (
            config.message_receive_rate_target,
            observation.max_message_rate,
        ),
    ];

    metrics
        .into_iter()
        .filter_map(|(target, observed)| {
            compute_target(
                direction,
                i64::from(target),
                i64::try_from(observed).unwrap_or(i64::MAX),
                i64::from(boundary),
                Some(i64::from(step)),
                i64::from(current_desired),
            )
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qscale_config::ScalerOperation;
    use qscale_state::ServiceId;
    use std::time::Duration;

    fn config(count_target: u32, rate_target: u32) -> ServiceConfig {
        ServiceConfig {
            id: ServiceId::new("prod", "orders"),
            queue: "orders".into(),
            min_replicas: 1,
            max_replicas: 10,
            message_count_target: count_target,
            message_receive_rate_target: rate_target,
            message_spool_usage_target: 0,
            scale_out: ScalerOperation {
                max_scale_step: 5,
                cooldown: Duration::ZERO,
                stabilization_window: Duration::from_secs(30),
            },
            scale_in: ScalerOperation {
                max_scale_step: 2,
                cooldown: Duration::ZERO,
                stabilization_window: Duration::from_secs(300),
            },
        }
    }

    fn observed(count: u64, rate: u64) -> DirectionObservation {
        DirectionObservation {
            max_message_count: count,
            max_message_rate: rate,
            found_in_window: true,
            newest_snapshot_age: Some(Duration::from_secs(5)),
            computable: true,
        }
    }

    #[test]
    fn scale_out_example() {
        assert_eq!(
            compute_target(Direction::ScaleOut, 50, 500, 10, Some(5), 5),
            Some(10)
        );
    }

    #[test]
    fn scale_in_example() {
        assert_eq!(
            compute_target(Direction::ScaleIn, 50, 20, 1, Some(2), 5),
            Some(3)
        );
    }

    #[test]
    fn scale_in_uses_headroom() {
        // 90 / (100 * 0.9) = 1.0 exactly; 91 tips over to 2.
        assert_eq!(compute_target(Direction::ScaleIn, 100, 91, 1, None, 4), Some(2));
        assert_eq!(compute_target(Direction::ScaleOut, 100, 91, 10, None, 4), Some(1));
    }

    #[test]
    fn invalid_inputs_are_not_computable() {
        assert_eq!(compute_target(Direction::ScaleOut, 0, 500, 10, None, 5), None);
        assert_eq!(compute_target(Direction::ScaleOut, 50, -1, 10, None, 5), None);
        assert_eq!(compute_target(Direction::ScaleOut, 50, 500, -1, None, 5), None);
        assert_eq!(compute_target(Direction::ScaleIn, 50, 500, 1, None, -3), None);
    }

    #[test]
    fn negative_step_means_uncapped() {
        assert_eq!(
            compute_target(Direction::ScaleOut, 10, 1000, 100, Some(-4), 1),
            Some(100)
        );
        assert_eq!(
            compute_target(Direction::ScaleOut, 10, 1000, 100, Some(4), 1),
            Some(5)
        );
    }

    #[test]
    fn scale_out_respects_bounds() {
        for observation in [0, 1, 49, 50, 51, 250, 10_000] {
            for desired in 0..12 {
                for step in [None, Some(1), Some(3)] {
                    let t = compute_target(Direction::ScaleOut, 50, observation, 10, step, desired)
                        .unwrap();
                    assert!(t <= 10);
                    if let Some(s) = step {
                        assert!(i64::from(t) <= desired + s);
                    }
                }
            }
        }
    }

    #[test]
    fn scale_in_respects_bounds() {
        for observation in [0, 1, 45, 46, 250, 10_000] {
            for desired in 0..12 {
                for step in [None, Some(1), Some(3)] {
                    let t = compute_target(Direction::ScaleIn, 50, observation, 2, step, desired)
                        .unwrap();
                    assert!(t >= 2);
                    if let Some(s) = step {
                        assert!(i64::from(t) >= desired - s);
                    }
                }
            }
        }
    }

    #[test]
    fn scale_in_above_max_steps_down_gradually() {
        // desired 15 with max 10: the step floor keeps the target at 13
        let t = compute_target(Direction::ScaleIn, 50, 0, 1, Some(2), 15);
        assert_eq!(t, Some(13));
        // without a step cap it drops straight to the observed need
        let t = compute_target(Direction::ScaleIn, 50, 0, 1, None, 15);
        assert_eq!(t, Some(1));
    }

    #[test]
    fn direction_takes_max_across_metrics() {
        let cfg = config(100, 10);
        let obs = WindowedObservations {
            // count wants 2, rate wants 6
            scale_out: observed(200, 60),
            scale_in: observed(200, 60),
        };
        let targets = resolve_targets(&cfg, &obs, 1);
        assert_eq!(targets.scale_out, Some(6));
    }

    #[test]
    fn disabled_metric_is_ignored() {
        let cfg = config(50, 0);
        let obs = WindowedObservations {
            scale_out: observed(500, 10_000),
            scale_in: observed(500, 10_000),
        };
        let targets = resolve_targets(&cfg, &obs, 5);
        assert_eq!(targets.scale_out, Some(10));
    }

    #[test]
    fn non_computable_direction_has_no_target() {
        let cfg = config(50, 0);
        let obs = WindowedObservations {
            scale_out: observed(500, 0),
            scale_in: DirectionObservation::default(),
        };
        let targets = resolve_targets(&cfg, &obs, 5);
        assert_eq!(targets.scale_out, Some(10));
        assert_eq!(targets.scale_in, None);
    }

    #[test]
    fn hysteresis_lifts_scale_in_to_scale_out() {
        let t = ResolvedTargets {
            scale_out: Some(6),
            scale_in: Some(3),
        }
        .with_hysteresis();
        assert_eq!(t.scale_in, Some(6));

        let untouched = ResolvedTargets {
            scale_out: Some(3),
            scale_in: None,
        };
        assert_eq!(untouched.with_hysteresis(), untouched);
    }
}
