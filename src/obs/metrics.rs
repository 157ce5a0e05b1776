// std
use std::time::Duration as StdDuration;
// self
use crate::obs::{OperationKind, Outcome};

/// Increments `session_broker_op_total{op, outcome}` when the `metrics` feature is enabled.
pub fn record_outcome(kind: OperationKind, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"session_broker_op_total",
		"op" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Records how long one refresh episode held callers suspended, labeled by its outcome.
pub fn record_episode_duration(outcome: Outcome, elapsed: StdDuration) {
	#[cfg(feature = "metrics")]
	metrics::histogram!("session_broker_refresh_episode_seconds", "outcome" => outcome.as_str())
		.record(elapsed.as_secs_f64());
	#[cfg(not(feature = "metrics"))]
	let _ = (outcome, elapsed);
}
