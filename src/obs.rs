//! Optional observability helpers for coordinator, dispatcher, and session operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_broker.op` with the `op`, `stage`
//!   (call site) and `episode` fields, plus log events for best-effort failures.
//! - Enable `metrics` to increment the `session_broker_op_total` counter for every outcome,
//!   labeled by `op` + `outcome`, and to record `session_broker_refresh_episode_seconds`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Outbound request dispatch, including the credential retry.
	Dispatch,
	/// Credential refresh episode.
	Refresh,
	/// Session termination.
	Terminate,
}
impl OperationKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::Dispatch => "dispatch",
			OperationKind::Refresh => "refresh",
			OperationKind::Terminate => "terminate",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Caller joined an episode that was already in flight.
	Coalesced,
	/// Caller went away before the outcome was delivered.
	Cancelled,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
			Outcome::Coalesced => "coalesced",
			Outcome::Cancelled => "cancelled",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
