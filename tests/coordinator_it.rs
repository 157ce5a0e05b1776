mod common;

// self
use common::{
	FakeLogout, GatedInvoker, Harness, HangingInvoker, InstantInvoker, LogoutBehavior,
};
use session_broker::{
	_preludet::*,
	auth::Credential,
	config::CoordinatorConfig,
	coordinator::{CoordinatorState, CredentialRejected, EpisodeId, RefreshCoordinator},
	refresh::RefreshError,
	session::{SessionTerminator, TerminationOutcome, TerminationReason},
	store::{CredentialStore, StoreError},
};

fn rejected_t1() -> CredentialRejected {
	CredentialRejected::new(401, Some(Credential::new("T1")))
}

#[tokio::test]
async fn concurrent_rejections_share_one_refresh() {
	let invoker = GatedInvoker::succeeding("T2");
	let harness = Harness::new(invoker.clone());
	let handles = (0..5)
		.map(|_| {
			let coordinator = harness.coordinator.clone();

			tokio::spawn(async move { coordinator.ensure_fresh_credential(rejected_t1()).await })
		})
		.collect::<Vec<_>>();

	invoker.wait_started().await;
	harness.wait_for_waiters(5).await;

	assert_eq!(
		harness.coordinator.state(),
		CoordinatorState::Refreshing { episode: EpisodeId::new(1) }
	);

	invoker.release();

	for handle in handles {
		let refreshed = handle
			.await
			.expect("Waiter task should not panic.")
			.expect("Every waiter should receive the new credential.");

		assert_eq!(refreshed.credential.expose(), "T2");
		assert_eq!(refreshed.episode, EpisodeId::new(1));
	}

	assert_eq!(invoker.calls(), 1);
	assert_eq!(harness.coordinator.state(), CoordinatorState::Idle);
	assert_eq!(harness.coordinator.pending_waiters(), 0);
	assert_eq!(
		harness.store.get().map(|credential| credential.expose().to_owned()),
		Some("T2".into())
	);
	assert_eq!(harness.coordinator.metrics().episodes(), 1);
	assert_eq!(harness.coordinator.metrics().coalesced(), 4);
}

#[tokio::test]
async fn failed_refresh_rejects_every_waiter_and_terminates_once() {
	let invoker = GatedInvoker::failing(RefreshError::Rejected { status: 401 });
	let harness = Harness::new(invoker.clone());
	let handles = (0..3)
		.map(|_| {
			let coordinator = harness.coordinator.clone();

			tokio::spawn(async move { coordinator.ensure_fresh_credential(rejected_t1()).await })
		})
		.collect::<Vec<_>>();

	harness.wait_for_waiters(3).await;
	invoker.release();

	for handle in handles {
		let err = handle
			.await
			.expect("Waiter task should not panic.")
			.expect_err("Every waiter should observe the failure.");

		assert!(err.is_terminal());
		assert!(matches!(
			err,
			Error::RefreshFailed { episode, source: RefreshError::Rejected { status: 401 } }
				if episode == EpisodeId::new(1)
		));
	}

	let notices = harness.listener.notices();

	assert_eq!(invoker.calls(), 1);
	assert_eq!(notices.len(), 1);
	assert_eq!(notices[0].reason, TerminationReason::RefreshFailed);
	assert_eq!(harness.coordinator.terminator().terminations(), 1);
	assert!(harness.store.get().is_none());

	let err = harness
		.coordinator
		.ensure_fresh_credential(rejected_t1())
		.await
		.expect_err("Terminated sessions should not start another refresh.");

	assert!(matches!(err, Error::SessionTerminated));
	assert_eq!(invoker.calls(), 1);
}

#[tokio::test]
async fn cancelled_initiator_does_not_cancel_the_refresh() {
	let invoker = GatedInvoker::succeeding("T2");
	let harness = Harness::new(invoker.clone());
	let initiator = {
		let coordinator = harness.coordinator.clone();

		tokio::spawn(async move { coordinator.ensure_fresh_credential(rejected_t1()).await })
	};

	invoker.wait_started().await;

	let follower = {
		let coordinator = harness.coordinator.clone();

		tokio::spawn(async move { coordinator.ensure_fresh_credential(rejected_t1()).await })
	};

	harness.wait_for_waiters(2).await;
	initiator.abort();

	assert!(
		initiator.await.expect_err("Aborted task should not complete.").is_cancelled(),
		"Initiator should be cancelled."
	);

	harness.wait_for_waiters(1).await;
	invoker.release();

	let refreshed = follower
		.await
		.expect("Follower task should not panic.")
		.expect("Remaining waiter should receive the new credential.");

	assert_eq!(refreshed.credential.expose(), "T2");
	assert_eq!(invoker.calls(), 1);
	assert_eq!(harness.coordinator.metrics().cancellations(), 1);
	assert_eq!(harness.coordinator.metrics().successes(), 1);
	assert_eq!(harness.coordinator.state(), CoordinatorState::Idle);
}

#[tokio::test]
async fn timeout_is_a_terminal_failure() {
	let config = CoordinatorConfig::builder()
		.refresh_timeout(Duration::milliseconds(50))
		.build()
		.expect("Coordinator config should build.");
	let harness = Harness::with_config(Arc::new(HangingInvoker), config);
	let err = harness
		.coordinator
		.ensure_fresh_credential(rejected_t1())
		.await
		.expect_err("Hanging invokers should time out.");

	assert!(matches!(
		err,
		Error::RefreshTimeout { after, .. } if after == Duration::milliseconds(50)
	));
	assert!(err.is_terminal());
	assert_eq!(harness.coordinator.metrics().timeouts(), 1);
	assert_eq!(
		harness.coordinator.terminator().notice().map(|notice| notice.reason),
		Some(TerminationReason::RefreshTimeout)
	);
	assert_eq!(harness.coordinator.state(), CoordinatorState::Idle);
}

#[tokio::test]
async fn sequential_episodes_get_new_ids() {
	let invoker = InstantInvoker::succeeding("T2");
	let harness = Harness::new(invoker.clone());
	let first = harness
		.coordinator
		.ensure_fresh_credential(rejected_t1())
		.await
		.expect("First refresh should succeed.");
	let second = harness
		.coordinator
		.ensure_fresh_credential(CredentialRejected::new(401, Some(first.credential.clone())))
		.await
		.expect("Second refresh should succeed.");

	assert_eq!(first.episode, EpisodeId::new(1));
	assert_eq!(second.episode, EpisodeId::new(2));
	assert_eq!(invoker.calls(), 2);
}

#[tokio::test]
async fn storage_failure_fails_the_episode() {
	struct BrokenStore;
	impl CredentialStore for BrokenStore {
		fn get(&self) -> Option<Credential> {
			Some(Credential::new("T1"))
		}

		fn set(&self, _credential: Credential) -> Result<(), StoreError> {
			Err(StoreError::Backend { message: "read-only".into() })
		}

		fn clear(&self) -> Result<(), StoreError> {
			Ok(())
		}
	}

	let terminator = SessionTerminator::builder(Arc::new(BrokenStore))
		.build()
		.expect("Terminator should build.");
	let coordinator = RefreshCoordinator::new(
		InstantInvoker::succeeding("T2"),
		terminator,
		CoordinatorConfig::default(),
	)
	.expect("Coordinator should build.");
	let err = coordinator
		.ensure_fresh_credential(rejected_t1())
		.await
		.expect_err("Unstorable credentials should fail the episode.");

	assert!(matches!(err, Error::RefreshFailed { source: RefreshError::Storage(_), .. }));
	assert!(coordinator.terminator().is_terminated());
}

#[tokio::test]
async fn sign_out_during_refresh_discards_the_new_credential() {
	let invoker = GatedInvoker::succeeding("T2");
	let harness = Harness::new(invoker.clone());
	let coordinator = harness.coordinator.clone();
	let waiter =
		tokio::spawn(async move { coordinator.ensure_fresh_credential(rejected_t1()).await });

	harness.wait_for_waiters(1).await;
	invoker.wait_started().await;

	assert_eq!(harness.coordinator.sign_out().await, TerminationOutcome::Terminated);
	assert!(harness.store.get().is_none());

	invoker.release();

	let err = waiter
		.await
		.expect("Waiter task should not panic.")
		.expect_err("Waiters of a signed-out session should not receive a credential.");

	assert!(matches!(err, Error::SessionTerminated));
	assert!(err.is_terminal());
	assert!(harness.store.get().is_none());
	assert!(harness.coordinator.terminator().is_terminated());
	assert_eq!(harness.coordinator.terminator().terminations(), 1);
	assert_eq!(harness.listener.notices().len(), 1);
	assert_eq!(harness.coordinator.state(), CoordinatorState::Idle);
	assert_eq!(invoker.calls(), 1);
}

#[tokio::test]
async fn sign_in_during_refresh_keeps_the_new_session_credential() {
	let invoker = GatedInvoker::succeeding("T2");
	let harness = Harness::new(invoker.clone());
	let coordinator = harness.coordinator.clone();
	let waiter =
		tokio::spawn(async move { coordinator.ensure_fresh_credential(rejected_t1()).await });

	harness.wait_for_waiters(1).await;
	invoker.wait_started().await;
	harness
		.coordinator
		.sign_in(Credential::new("S1"), None)
		.expect("Sign-in should store the credential.");
	invoker.release();

	let err = waiter
		.await
		.expect("Waiter task should not panic.")
		.expect_err("Episodes from a previous session should be discarded.");

	assert!(matches!(err, Error::SessionTerminated));
	assert_eq!(harness.store.get(), Some(Credential::new("S1")));
	assert!(!harness.coordinator.terminator().is_terminated());
	assert!(harness.listener.notices().is_empty());
}

#[tokio::test]
async fn failed_refresh_settles_waiters_before_the_logout_notification() {
	let logout = FakeLogout::new(LogoutBehavior::Stall);
	let invoker = InstantInvoker::failing(RefreshError::Rejected { status: 401 });
	let harness = Harness::with_logout(invoker, logout);
	let err = tokio::time::timeout(
		std::time::Duration::from_secs(1),
		harness.coordinator.ensure_fresh_credential(rejected_t1()),
	)
	.await
	.expect("Waiters should not wait for a stalled logout notification.")
	.expect_err("Refresh failure should surface to the waiter.");

	assert!(matches!(err, Error::RefreshFailed { .. }));
	assert!(harness.coordinator.terminator().is_terminated());
	assert!(harness.store.get().is_none());
}

#[tokio::test]
async fn logout_notification_presents_the_latest_credential() {
	let logout = FakeLogout::new(LogoutBehavior::Succeed);
	let harness = Harness::with_logout(InstantInvoker::succeeding("T2"), logout.clone());

	harness
		.coordinator
		.ensure_fresh_credential(rejected_t1())
		.await
		.expect("Refresh should succeed.");
	harness.coordinator.sign_out().await;

	assert_eq!(logout.presented(), vec![Some(Credential::new("T2"))]);
}
