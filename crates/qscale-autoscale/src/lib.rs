//! qscale-autoscale — queue-driven replica scaling.
//!
//! Turns windowed queue observations into a desired replica count for one
//! service and applies it through the cluster control plane.
//!
//! # Scaling Algorithm
//!
//! ```text
//! per direction, per metric (message count, receive rate):
//!     candidate = ceil(observed_max / (target * factor))    factor: out 1.0, in 0.9
//!     capped by max_scale_step, then by max/min replicas
//! direction target = max(candidates)
//!
//! scale_in_target = max(scale_in_target, scale_out_target)   (hysteresis)
//!
//! if scale_out_target > desired:  ScaleOut(scale_out_target)
//! elif scale_in_target < desired: ScaleIn(scale_in_target)
//! else:                           NoOp
//! ```
//!
//! A scale action is only taken when the service is steady (desired ==
//! running), the previous action has landed, and the direction's cooldown
//! has elapsed.

pub mod cluster;
pub mod error;
pub mod gate;
pub mod scaler;
pub mod target;

pub use cluster::ClusterScaler;
pub use error::{ScaleError, ScaleResult};
pub use gate::{BlockReason, DecisionGate, GateOutcome, ScalingState, decide};
pub use scaler::{CycleOutcome, ScalingStatus, ServiceScaler, warmup_delay};
pub use target::{ResolvedTargets, SCALE_IN_ADJUSTMENT, compute_target, resolve_targets};
