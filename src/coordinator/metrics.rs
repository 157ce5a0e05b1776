//! Lock-free counters describing refresh episodes and the callers they served.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters describing coordinator activity.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
	episodes: AtomicU64,
	coalesced: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	timeouts: AtomicU64,
	cancellations: AtomicU64,
}
impl CoordinatorMetrics {
	/// Returns the number of refresh episodes started (one invoker call each).
	pub fn episodes(&self) -> u64 {
		self.episodes.load(Ordering::Relaxed)
	}

	/// Returns the number of callers served without starting a new episode.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	/// Returns the number of episodes that produced a new credential.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Returns the number of failed episodes, timeouts included.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of episodes that hit the refresh deadline.
	pub fn timeouts(&self) -> u64 {
		self.timeouts.load(Ordering::Relaxed)
	}

	/// Returns the number of waiters that went away before their episode finished.
	pub fn cancellations(&self) -> u64 {
		self.cancellations.load(Ordering::Relaxed)
	}

	pub(crate) fn record_episode(&self) {
		self.episodes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_timeout(&self) {
		self.timeouts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cancellation(&self) {
		self.cancellations.fetch_add(1, Ordering::Relaxed);
	}
}
