//! Single-flight credential refresh with FIFO fan-out to every suspended caller.
//!
//! The coordinator is a two-state machine. While [`CoordinatorState::Idle`], the first caller that
//! reports a rejected credential opens a new episode, registers itself as the first waiter, and
//! spawns the episode driver. Every caller arriving while [`CoordinatorState::Refreshing`] joins
//! that same episode. When the driver finishes it swaps the state back to idle, drains the waiter
//! arena under the same lock, and settles each waiter in registration order.
//!
//! The state lock is a plain `parking_lot` mutex held only for check-and-set; no `.await` ever
//! happens while it is held. The driver runs on its own task, so a caller that gives up (its
//! future is dropped) only removes its own waiter and never cancels the refresh.

pub mod metrics;

mod waiters;

pub use metrics::CoordinatorMetrics;

// std
use std::time::Instant;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{Credential, SessionProfile},
	config::CoordinatorConfig,
	obs::{self, OperationKind, OperationSpan, Outcome},
	refresh::{RefreshError, RefreshInvoker},
	session::{SessionEpoch, SessionTerminator, TerminationOutcome, TerminationReason},
	store::CredentialStore,
};
use waiters::{WaiterArena, WaiterId};

type EpisodeOutcome = Result<RefreshedCredential, EpisodeFailure>;

/// Identifier of one `Idle → Refreshing → Idle` cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(u64);
impl EpisodeId {
	/// Wraps a raw episode number.
	pub const fn new(value: u64) -> Self {
		Self(value)
	}

	/// Returns the raw episode number.
	pub const fn get(self) -> u64 {
		self.0
	}
}
impl Display for EpisodeId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "#{}", self.0)
	}
}

/// Observable coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
	/// No refresh is outstanding.
	Idle,
	/// A refresh episode is in flight.
	Refreshing {
		/// Episode every new caller joins.
		episode: EpisodeId,
	},
}
impl CoordinatorState {
	/// Returns `true` while an episode is in flight.
	pub fn is_refreshing(&self) -> bool {
		matches!(self, Self::Refreshing { .. })
	}
}

/// Signal that a request was answered with a credential rejection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRejected {
	/// Status code of the rejection.
	pub status: u16,
	/// Credential the rejected request carried, if any.
	pub presented: Option<Credential>,
}
impl CredentialRejected {
	/// Describes a rejection of `presented` with `status`.
	pub fn new(status: u16, presented: Option<Credential>) -> Self {
		Self { status, presented }
	}
}

/// Credential delivered to every waiter of a successful episode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshedCredential {
	/// Newly minted access credential, already written to the store.
	pub credential: Credential,
	/// Episode that produced it.
	pub episode: EpisodeId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum EpisodeFailure {
	Refresh(RefreshError),
	Timeout(Duration),
	Superseded,
	Aborted,
}
impl EpisodeFailure {
	fn into_error(self, episode: EpisodeId) -> Error {
		match self {
			Self::Refresh(source) => Error::RefreshFailed { episode, source },
			Self::Timeout(after) => Error::RefreshTimeout { episode, after },
			Self::Superseded => Error::SessionTerminated,
			Self::Aborted => Error::Cancelled { episode },
		}
	}

	fn termination_reason(&self) -> TerminationReason {
		match self {
			Self::Timeout(_) => TerminationReason::RefreshTimeout,
			_ => TerminationReason::RefreshFailed,
		}
	}
}
impl Display for EpisodeFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Refresh(e) => write!(f, "{e}"),
			Self::Timeout(after) => write!(f, "timed out after {after}"),
			Self::Superseded => f.write_str("session ended while the refresh was in flight"),
			Self::Aborted => f.write_str("driver ended without an outcome"),
		}
	}
}

#[derive(Debug)]
struct CoordinatorInner {
	state: CoordinatorState,
	waiters: WaiterArena,
	next_episode: u64,
	last_refreshed: Option<EpisodeId>,
}
impl CoordinatorInner {
	fn open_episode(&mut self) -> EpisodeId {
		self.next_episode += 1;

		let episode = EpisodeId(self.next_episode);

		self.state = CoordinatorState::Refreshing { episode };

		episode
	}
}

struct Shared {
	inner: Mutex<CoordinatorInner>,
	store: Arc<dyn CredentialStore>,
	invoker: Arc<dyn RefreshInvoker>,
	terminator: SessionTerminator,
	config: CoordinatorConfig,
	metrics: CoordinatorMetrics,
}
impl Shared {
	async fn run_episode(self: Arc<Self>, episode: EpisodeId, epoch: SessionEpoch) {
		let span = OperationSpan::for_episode(OperationKind::Refresh, "episode", episode);

		span.instrument(async move {
			let guard = EpisodeGuard { shared: self.clone(), episode, armed: true };
			let started = Instant::now();

			self.metrics.record_episode();
			obs_debug!("Refresh episode {episode} started.");

			let outcome = self.refresh_once(epoch).await;
			let logout = match &outcome {
				Ok(_) => {
					self.metrics.record_success();
					obs::record_episode_duration(Outcome::Success, started.elapsed());
					obs_info!("Refresh episode {episode} produced a new credential.");

					None
				},
				Err(EpisodeFailure::Superseded) => {
					self.metrics.record_failure();
					obs::record_episode_duration(Outcome::Cancelled, started.elapsed());
					obs_info!("Refresh episode {episode} outlived its session; result discarded.");

					None
				},
				Err(failure) => {
					if matches!(failure, EpisodeFailure::Timeout(_)) {
						self.metrics.record_timeout();
					}

					self.metrics.record_failure();
					obs::record_episode_duration(Outcome::Failure, started.elapsed());
					obs_warn!("Refresh episode {episode} failed: {failure}.");

					// Still refreshing: late arrivals join this failing episode.
					self.terminator.end(failure.termination_reason(), Some(epoch))
				},
			};

			guard.finish(outcome);

			if let Some(logout) = logout {
				self.terminator.notify_logout(logout).await;
			}
		})
		.await
	}

	async fn refresh_once(&self, epoch: SessionEpoch) -> Result<Credential, EpisodeFailure> {
		let deadline = self.config.refresh_timeout;
		let result = tokio::time::timeout(deadline.unsigned_abs(), self.invoker.refresh()).await;

		if self.terminator.epoch() != epoch {
			return Err(EpisodeFailure::Superseded);
		}

		let credential = match result {
			Ok(result) => result.map_err(EpisodeFailure::Refresh)?,
			Err(_) => return Err(EpisodeFailure::Timeout(deadline)),
		};

		match self.terminator.commit_refresh(epoch, credential.clone()) {
			Ok(true) => Ok(credential),
			Ok(false) => Err(EpisodeFailure::Superseded),
			Err(e) => Err(EpisodeFailure::Refresh(RefreshError::Storage(e))),
		}
	}

	fn complete(&self, episode: EpisodeId, outcome: Result<Credential, EpisodeFailure>) {
		let waiters = {
			let mut inner = self.inner.lock();

			inner.state = CoordinatorState::Idle;
			inner.last_refreshed = outcome.is_ok().then_some(episode);

			inner.waiters.drain()
		};
		let outcome = outcome.map(|credential| RefreshedCredential { credential, episode });

		for waiter in waiters {
			debug_assert_eq!(waiter.episode, episode);

			waiter.settle(outcome.clone());
		}
	}
}

/// Fails the episode if its driver is torn down before reaching [`EpisodeGuard::finish`].
struct EpisodeGuard {
	shared: Arc<Shared>,
	episode: EpisodeId,
	armed: bool,
}
impl EpisodeGuard {
	fn finish(mut self, outcome: Result<Credential, EpisodeFailure>) {
		self.armed = false;

		self.shared.complete(self.episode, outcome);
	}
}
impl Drop for EpisodeGuard {
	fn drop(&mut self) {
		if self.armed {
			obs_warn!("Refresh episode {} was aborted before completing.", self.episode);

			self.shared.metrics.record_failure();
			self.shared.complete(self.episode, Err(EpisodeFailure::Aborted));
		}
	}
}

/// Removes the caller's waiter when its future is dropped before the episode settles it.
struct WaiterTicket {
	shared: Arc<Shared>,
	id: WaiterId,
}
impl Drop for WaiterTicket {
	fn drop(&mut self) {
		let removed = self.shared.inner.lock().waiters.remove(self.id);

		if removed {
			self.shared.metrics.record_cancellation();
			obs::record_outcome(OperationKind::Refresh, Outcome::Cancelled);
		}
	}
}

enum Joined {
	Ready(RefreshedCredential),
	Waiting {
		ticket: WaiterTicket,
		receiver: oneshot::Receiver<EpisodeOutcome>,
		episode: EpisodeId,
		/// Session epoch of a caller that opened the episode and must spawn its driver.
		driver: Option<SessionEpoch>,
	},
}

/// Serializes credential refreshes for one session and fans each outcome out to its waiters.
///
/// Cloning is cheap; every clone drives the same state machine. Pass one instance explicitly to
/// each [`Dispatcher`](crate::dispatch::Dispatcher) sharing the session.
#[derive(Clone)]
pub struct RefreshCoordinator {
	shared: Arc<Shared>,
}
impl RefreshCoordinator {
	/// Creates a coordinator writing to the store the `terminator` clears.
	pub fn new(
		invoker: Arc<dyn RefreshInvoker>,
		terminator: SessionTerminator,
		config: CoordinatorConfig,
	) -> Result<Self> {
		config.validate()?;

		Ok(Self {
			shared: Arc::new(Shared {
				inner: Mutex::new(CoordinatorInner {
					state: CoordinatorState::Idle,
					waiters: WaiterArena::default(),
					next_episode: 0,
					last_refreshed: None,
				}),
				store: terminator.store().clone(),
				invoker,
				terminator,
				config,
				metrics: CoordinatorMetrics::default(),
			}),
		})
	}

	/// Resolves once a refresh covering `reason` has completed.
	///
	/// Callers arriving while an episode is in flight share its outcome. A caller whose rejected
	/// credential was already replaced by the last successful episode receives the stored
	/// credential without a new exchange. Must be called from within a Tokio runtime.
	pub async fn ensure_fresh_credential(
		&self,
		reason: CredentialRejected,
	) -> Result<RefreshedCredential> {
		const KIND: OperationKind = OperationKind::Refresh;

		let span = OperationSpan::new(KIND, "ensure_fresh_credential");

		obs::record_outcome(KIND, Outcome::Attempt);

		let result = span.instrument(self.await_episode(reason, &span)).await;

		match &result {
			Ok(_) => obs::record_outcome(KIND, Outcome::Success),
			Err(_) => obs::record_outcome(KIND, Outcome::Failure),
		}

		result
	}

	/// Returns the current state.
	pub fn state(&self) -> CoordinatorState {
		self.shared.inner.lock().state
	}

	/// Returns the number of callers suspended on the in-flight episode.
	pub fn pending_waiters(&self) -> usize {
		self.shared.inner.lock().waiters.len()
	}

	/// Returns the coordinator counters.
	pub fn metrics(&self) -> &CoordinatorMetrics {
		&self.shared.metrics
	}

	/// Returns the credential store.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.shared.store
	}

	/// Returns the session terminator.
	pub fn terminator(&self) -> &SessionTerminator {
		&self.shared.terminator
	}

	/// Returns the credential outbound requests should currently present.
	pub fn current_credential(&self) -> Option<Credential> {
		self.shared.store.get()
	}

	/// Stores a credential obtained from a sign-in flow and reopens the session.
	///
	/// An episode still in flight from the previous session is discarded: its waiters receive
	/// [`Error::SessionTerminated`] and its credential never reaches the store.
	pub fn sign_in(&self, credential: Credential, profile: Option<SessionProfile>) -> Result<()> {
		self.shared.terminator.reinstate_with(credential, profile)?;
		self.shared.inner.lock().last_refreshed = None;
		obs_info!("Session established.");

		Ok(())
	}

	/// Ends the session at the user's request.
	pub async fn sign_out(&self) -> TerminationOutcome {
		self.shared.terminator.terminate(TerminationReason::SignedOut).await
	}

	async fn await_episode(
		&self,
		reason: CredentialRejected,
		span: &OperationSpan,
	) -> Result<RefreshedCredential> {
		let (ticket, receiver, episode, driver) = match self.join(&reason)? {
			Joined::Ready(refreshed) => {
				span.record_episode(refreshed.episode);

				return Ok(refreshed);
			},
			Joined::Waiting { ticket, receiver, episode, driver } =>
				(ticket, receiver, episode, driver),
		};

		span.record_episode(episode);

		if let Some(epoch) = driver {
			tokio::spawn(Shared::run_episode(self.shared.clone(), episode, epoch));
		}

		let outcome = receiver.await;

		drop(ticket);

		match outcome {
			Ok(Ok(refreshed)) => Ok(refreshed),
			Ok(Err(failure)) => Err(failure.into_error(episode)),
			Err(_) => Err(Error::Cancelled { episode }),
		}
	}

	fn join(&self, reason: &CredentialRejected) -> Result<Joined> {
		let mut inner = self.shared.inner.lock();
		let (episode, driver) = match inner.state {
			CoordinatorState::Refreshing { episode } => {
				self.shared.metrics.record_coalesced();
				obs::record_outcome(OperationKind::Refresh, Outcome::Coalesced);

				(episode, None)
			},
			CoordinatorState::Idle => {
				let Some(epoch) = self.shared.terminator.live_epoch() else {
					return Err(Error::SessionTerminated);
				};

				if let Some(refreshed) = self.already_replaced(&inner, reason) {
					self.shared.metrics.record_coalesced();
					obs::record_outcome(OperationKind::Refresh, Outcome::Coalesced);

					return Ok(Joined::Ready(refreshed));
				}

				(inner.open_episode(), Some(epoch))
			},
		};
		let (id, receiver) = inner.waiters.register(episode);

		drop(inner);
		obs_debug!(
			"Rejection with status {} joined refresh episode {episode}.",
			reason.status
		);

		Ok(Joined::Waiting {
			ticket: WaiterTicket { shared: self.shared.clone(), id },
			receiver,
			episode,
			driver,
		})
	}

	/// Returns the stored credential when the last successful episode already replaced the one
	/// the rejected request presented.
	fn already_replaced(
		&self,
		inner: &CoordinatorInner,
		reason: &CredentialRejected,
	) -> Option<RefreshedCredential> {
		let episode = inner.last_refreshed?;
		let presented = reason.presented.as_ref()?;
		let credential = self.shared.store.get()?;

		(credential != *presented).then_some(RefreshedCredential { credential, episode })
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let inner = self.shared.inner.lock();

		f.debug_struct("RefreshCoordinator")
			.field("state", &inner.state)
			.field("pending_waiters", &inner.waiters.len())
			.field("config", &self.shared.config)
			.finish()
	}
}
