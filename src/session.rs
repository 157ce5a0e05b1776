//! Session termination: clear local credential state and tell the host to re-authenticate.
//!
//! [`SessionTerminator::terminate`] is idempotent. Concurrent triggers (a failed refresh episode
//! racing a user-initiated sign-out, say) contend for the session state lock; whichever gets it
//! first clears the store, wipes the profile, records a [`TerminationNotice`], and signals
//! listeners. Every later call returns [`TerminationOutcome::AlreadyTerminated`] without side
//! effects until [`SessionTerminator::reinstate`] opens a new session.
//!
//! Each termination and each sign-in starts a new session epoch. A refresh requested under an
//! older epoch is never written to the store. The best-effort logout notification runs after
//! local state is cleared, one notification at a time.

pub mod logout;

pub use logout::*;

// crates.io
use parking_lot::RwLockWriteGuard;
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{Credential, SessionProfile},
	config::SessionConfig,
	obs::{self, OperationKind, OperationSpan, Outcome},
	store::{CredentialStore, StoreError},
};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
	/// The refresh exchange failed.
	RefreshFailed,
	/// The refresh exchange exceeded its deadline.
	RefreshTimeout,
	/// The user signed out.
	SignedOut,
}
impl TerminationReason {
	/// Returns a stable label suitable for logs and notices.
	pub const fn as_str(self) -> &'static str {
		match self {
			TerminationReason::RefreshFailed => "refresh_failed",
			TerminationReason::RefreshTimeout => "refresh_timeout",
			TerminationReason::SignedOut => "signed_out",
		}
	}

	/// Returns `true` when the session ended without the user asking for it.
	pub const fn is_expiry(self) -> bool {
		!matches!(self, TerminationReason::SignedOut)
	}
}
impl Display for TerminationReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Record of the most recent termination, kept for the host to display on its sign-in view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationNotice {
	/// Why the session ended.
	pub reason: TerminationReason,
	/// User-facing message; only set for expiries.
	pub message: Option<String>,
	/// When the session ended.
	pub at: OffsetDateTime,
}

/// Result of a [`SessionTerminator::terminate`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationOutcome {
	/// This call ended the session.
	Terminated,
	/// The session had already ended; nothing changed.
	AlreadyTerminated,
}

/// In-process hook through which the host application learns that the session ended.
pub trait SessionListener
where
	Self: Send + Sync,
{
	/// Invoked exactly once per termination, after local state is cleared.
	fn session_terminated(&self, notice: &TerminationNotice);
}

/// Identity of one signed-in session; bumped by every termination and every sign-in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SessionEpoch(u64);

/// Logout notification owed by a termination that actually ended the session.
#[derive(Debug)]
pub(crate) struct PendingLogout {
	reason: TerminationReason,
	credential: Option<Credential>,
}

#[derive(Debug, Default)]
struct SessionState {
	terminated: bool,
	epoch: SessionEpoch,
	profile: Option<SessionProfile>,
	notice: Option<TerminationNotice>,
	terminations: u64,
}

struct TerminatorInner {
	store: Arc<dyn CredentialStore>,
	config: SessionConfig,
	notifier: Option<Arc<dyn LogoutNotifier>>,
	listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
	state: RwLock<SessionState>,
	events: watch::Sender<Option<TerminationNotice>>,
	logout_gate: AsyncMutex<()>,
}

/// Idempotent session terminator shared by the coordinator and the host application.
#[derive(Clone)]
pub struct SessionTerminator(Arc<TerminatorInner>);
impl SessionTerminator {
	/// Returns a builder that clears `store` on termination.
	pub fn builder(store: Arc<dyn CredentialStore>) -> SessionTerminatorBuilder {
		SessionTerminatorBuilder {
			store,
			config: SessionConfig::default(),
			notifier: None,
			listeners: Vec::new(),
		}
	}

	/// Ends the session for `reason`; a no-op once the session is already terminated.
	pub async fn terminate(&self, reason: TerminationReason) -> TerminationOutcome {
		let span = OperationSpan::new(OperationKind::Terminate, "terminate");

		span.instrument(async move {
			match self.end(reason, None) {
				Some(logout) => {
					self.notify_logout(logout).await;

					TerminationOutcome::Terminated
				},
				None => TerminationOutcome::AlreadyTerminated,
			}
		})
		.await
	}

	/// Opens a new session after sign-in, replacing the profile and dropping any stale notice.
	pub fn reinstate(&self, profile: Option<SessionProfile>) {
		self.reopen(self.0.state.write(), profile);
	}

	/// Stores `credential` and opens a new session in one step, so no in-flight refresh from the
	/// previous session can overwrite it.
	pub(crate) fn reinstate_with(
		&self,
		credential: Credential,
		profile: Option<SessionProfile>,
	) -> Result<(), StoreError> {
		let state = self.0.state.write();

		self.0.store.set(credential)?;
		self.reopen(state, profile);

		Ok(())
	}

	/// Returns the current session identity.
	pub(crate) fn epoch(&self) -> SessionEpoch {
		self.0.state.read().epoch
	}

	/// Returns the current session identity, or `None` while the session is terminated.
	pub(crate) fn live_epoch(&self) -> Option<SessionEpoch> {
		let state = self.0.state.read();

		(!state.terminated).then_some(state.epoch)
	}

	/// Writes a refreshed credential unless the session it was requested for has ended.
	///
	/// Returns `Ok(false)` without touching the store when `epoch` is no longer current.
	pub(crate) fn commit_refresh(
		&self,
		epoch: SessionEpoch,
		credential: Credential,
	) -> Result<bool, StoreError> {
		let state = self.0.state.read();

		if state.terminated || state.epoch != epoch {
			return Ok(false);
		}

		self.0.store.set(credential)?;

		Ok(true)
	}

	/// Clears local session state, returning the logout notification still owed.
	///
	/// Returns `None` when the session is already terminated, or when `expected` names a session
	/// that has since been replaced by a new sign-in.
	pub(crate) fn end(
		&self,
		reason: TerminationReason,
		expected: Option<SessionEpoch>,
	) -> Option<PendingLogout> {
		const KIND: OperationKind = OperationKind::Terminate;

		obs::record_outcome(KIND, Outcome::Attempt);

		let notice = TerminationNotice {
			reason,
			message: reason.is_expiry().then(|| self.0.config.expiry_message.clone()),
			at: OffsetDateTime::now_utc(),
		};
		let credential = {
			let mut state = self.0.state.write();

			if state.terminated || expected.is_some_and(|epoch| epoch != state.epoch) {
				drop(state);
				obs::record_outcome(KIND, Outcome::Coalesced);

				return None;
			}

			let credential = self.0.store.get();

			// A backend persistence failure is logged; the session still counts as terminated.
			if let Err(e) = self.0.store.clear() {
				obs_warn!("Credential store could not persist the cleared credential: {e}");
			}

			state.terminated = true;
			state.epoch = SessionEpoch(state.epoch.0 + 1);
			state.profile = None;
			state.notice = Some(notice.clone());
			state.terminations += 1;

			credential
		};

		self.0.events.send_replace(Some(notice.clone()));

		let listeners = self.0.listeners.read().clone();

		for listener in listeners {
			listener.session_terminated(&notice);
		}

		obs_info!("Session terminated ({reason}).");
		obs::record_outcome(KIND, Outcome::Success);

		Some(PendingLogout { reason, credential })
	}

	/// Sends the best-effort logout notification, one at a time and bounded by `logout_timeout`.
	pub(crate) async fn notify_logout(&self, logout: PendingLogout) {
		let Some(notifier) = self.0.notifier.as_ref() else {
			return;
		};
		let deadline = self.0.config.logout_timeout.unsigned_abs();
		let _gate = self.0.logout_gate.lock().await;
		let notification = notifier.notify_logout(logout.reason, logout.credential);

		match tokio::time::timeout(deadline, notification).await {
			Ok(Ok(())) => {},
			Ok(Err(e)) => obs_warn!("Logout notification failed: {e}"),
			Err(_) => obs_warn!(
				"Logout notification timed out after {}.",
				self.0.config.logout_timeout
			),
		}
	}

	fn reopen(
		&self,
		mut state: RwLockWriteGuard<'_, SessionState>,
		profile: Option<SessionProfile>,
	) {
		state.terminated = false;
		state.epoch = SessionEpoch(state.epoch.0 + 1);
		state.profile = profile;
		state.notice = None;

		drop(state);

		self.0.events.send_replace(None);
	}

	/// Returns `true` once the session has been terminated and not yet reinstated.
	pub fn is_terminated(&self) -> bool {
		self.0.state.read().terminated
	}

	/// Returns the signed-in profile, if any.
	pub fn profile(&self) -> Option<SessionProfile> {
		self.0.state.read().profile.clone()
	}

	/// Returns the most recent termination notice without consuming it.
	pub fn notice(&self) -> Option<TerminationNotice> {
		self.0.state.read().notice.clone()
	}

	/// Consumes the most recent termination notice so it is shown only once.
	pub fn take_notice(&self) -> Option<TerminationNotice> {
		self.0.state.write().notice.take()
	}

	/// Number of times a session has actually been terminated.
	pub fn terminations(&self) -> u64 {
		self.0.state.read().terminations
	}

	/// Registers another listener.
	pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
		self.0.listeners.write().push(listener);
	}

	/// Returns a receiver that observes the current notice (`None` while signed in).
	pub fn subscribe(&self) -> watch::Receiver<Option<TerminationNotice>> {
		self.0.events.subscribe()
	}

	/// Returns the credential store this terminator clears.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.0.store
	}
}
impl Debug for SessionTerminator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.0.state.read();

		f.debug_struct("SessionTerminator")
			.field("terminated", &state.terminated)
			.field("terminations", &state.terminations)
			.field("notifier_set", &self.0.notifier.is_some())
			.field("listeners", &self.0.listeners.read().len())
			.finish()
	}
}

/// Builder for [`SessionTerminator`].
pub struct SessionTerminatorBuilder {
	store: Arc<dyn CredentialStore>,
	config: SessionConfig,
	notifier: Option<Arc<dyn LogoutNotifier>>,
	listeners: Vec<Arc<dyn SessionListener>>,
}
impl SessionTerminatorBuilder {
	/// Overrides the session settings.
	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;

		self
	}

	/// Sets the best-effort logout notifier.
	pub fn logout_notifier(mut self, notifier: Arc<dyn LogoutNotifier>) -> Self {
		self.notifier = Some(notifier);

		self
	}

	/// Registers a listener.
	pub fn listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
		self.listeners.push(listener);

		self
	}

	/// Validates the settings and builds the terminator.
	pub fn build(self) -> Result<SessionTerminator> {
		self.config.validate()?;

		let (events, _) = watch::channel(None);

		Ok(SessionTerminator(Arc::new(TerminatorInner {
			store: self.store,
			config: self.config,
			notifier: self.notifier,
			listeners: RwLock::new(self.listeners),
			state: Default::default(),
			events,
			logout_gate: AsyncMutex::new(()),
		})))
	}
}
impl Debug for SessionTerminatorBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionTerminatorBuilder")
			.field("config", &self.config)
			.field("notifier_set", &self.notifier.is_some())
			.field("listeners", &self.listeners.len())
			.finish()
	}
}
