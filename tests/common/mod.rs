//! Shared fakes for integration tests.

#![allow(dead_code)]

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use tokio::sync::Notify;
// self
use session_broker::{
	_preludet::*,
	auth::Credential,
	config::{CoordinatorConfig, DispatcherConfig},
	coordinator::RefreshCoordinator,
	dispatch::{ApiResponse, Dispatcher, PreparedRequest, Transport, TransportFuture},
	refresh::{RefreshError, RefreshFuture, RefreshInvoker},
	session::{
		LogoutFuture, LogoutNotifier, SessionListener, SessionTerminator, TerminationNotice,
		TerminationReason,
	},
	store::MemoryStore,
};

/// Refresh invoker that blocks every exchange until [`GatedInvoker::release`] is called.
pub struct GatedInvoker {
	calls: AtomicUsize,
	started: Notify,
	gate: Notify,
	result: Result<Credential, RefreshError>,
}
impl GatedInvoker {
	pub fn succeeding(token: &str) -> Arc<Self> {
		Arc::new(Self::new(Ok(Credential::new(token))))
	}

	pub fn failing(error: RefreshError) -> Arc<Self> {
		Arc::new(Self::new(Err(error)))
	}

	fn new(result: Result<Credential, RefreshError>) -> Self {
		Self { calls: AtomicUsize::new(0), started: Notify::new(), gate: Notify::new(), result }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub async fn wait_started(&self) {
		self.started.notified().await;
	}

	pub fn release(&self) {
		self.gate.notify_one();
	}
}
impl RefreshInvoker for GatedInvoker {
	fn refresh(&self) -> RefreshFuture<'_> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.started.notify_one();

		Box::pin(async move {
			self.gate.notified().await;

			self.result.clone()
		})
	}
}

/// Refresh invoker that answers immediately.
pub struct InstantInvoker {
	calls: AtomicUsize,
	result: Result<Credential, RefreshError>,
}
impl InstantInvoker {
	pub fn succeeding(token: &str) -> Arc<Self> {
		Arc::new(Self { calls: AtomicUsize::new(0), result: Ok(Credential::new(token)) })
	}

	pub fn failing(error: RefreshError) -> Arc<Self> {
		Arc::new(Self { calls: AtomicUsize::new(0), result: Err(error) })
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl RefreshInvoker for InstantInvoker {
	fn refresh(&self) -> RefreshFuture<'_> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let result = self.result.clone();

		Box::pin(async move { result })
	}
}

/// Refresh invoker that never answers.
pub struct HangingInvoker;
impl RefreshInvoker for HangingInvoker {
	fn refresh(&self) -> RefreshFuture<'_> {
		Box::pin(std::future::pending())
	}
}

/// In-process API that accepts exactly one bearer credential and records every request.
#[derive(Default)]
pub struct FakeApi {
	accepted: Mutex<Option<String>>,
	requests: Mutex<Vec<PreparedRequest>>,
}
impl FakeApi {
	pub fn accepting(token: &str) -> Self {
		Self { accepted: Mutex::new(Some(token.into())), requests: Default::default() }
	}

	pub fn rejecting_everything() -> Self {
		Self::default()
	}

	pub fn requests(&self) -> Vec<PreparedRequest> {
		self.requests.lock().clone()
	}

	/// Bearer credentials presented so far, in arrival order.
	pub fn presented(&self) -> Vec<Option<String>> {
		self.requests
			.lock()
			.iter()
			.map(|request| request.header("authorization").map(str::to_owned))
			.collect()
	}
}
impl Transport for FakeApi {
	type TransportError = std::io::Error;

	fn send(&self, request: PreparedRequest) -> TransportFuture<'_, Self::TransportError> {
		let authorized = match (self.accepted.lock().as_deref(), request.header("authorization")) {
			(Some(token), Some(header)) => header == format!("Bearer {token}"),
			_ => false,
		};
		let status = if request.url.path().ends_with("/forbidden") {
			403
		} else if authorized {
			200
		} else {
			401
		};

		self.requests.lock().push(request);

		Box::pin(async move { Ok(ApiResponse::new(status, r#"{"ok":true}"#)) })
	}
}

/// Listener that records every notice it receives.
#[derive(Default)]
pub struct RecordingListener(Mutex<Vec<TerminationNotice>>);
impl RecordingListener {
	pub fn notices(&self) -> Vec<TerminationNotice> {
		self.0.lock().clone()
	}
}
impl SessionListener for RecordingListener {
	fn session_terminated(&self, notice: &TerminationNotice) {
		self.0.lock().push(notice.clone());
	}
}

/// Logout notifier that records the credential of each call and optionally fails or stalls.
pub struct FakeLogout {
	presented: Mutex<Vec<Option<Credential>>>,
	behavior: LogoutBehavior,
}
#[derive(Clone, Copy)]
pub enum LogoutBehavior {
	Succeed,
	Fail,
	Stall,
}
impl FakeLogout {
	pub fn new(behavior: LogoutBehavior) -> Arc<Self> {
		Arc::new(Self { presented: Default::default(), behavior })
	}

	pub fn calls(&self) -> usize {
		self.presented.lock().len()
	}

	pub fn presented(&self) -> Vec<Option<Credential>> {
		self.presented.lock().clone()
	}
}
impl LogoutNotifier for FakeLogout {
	fn notify_logout(
		&self,
		_reason: TerminationReason,
		credential: Option<Credential>,
	) -> LogoutFuture<'_> {
		self.presented.lock().push(credential);

		let behavior = self.behavior;

		Box::pin(async move {
			match behavior {
				LogoutBehavior::Succeed => Ok(()),
				LogoutBehavior::Fail => Err(Error::status(502, b"bad gateway")),
				LogoutBehavior::Stall => std::future::pending().await,
			}
		})
	}
}

/// Everything one session needs, wired around an in-memory store holding `T1`.
pub struct Harness {
	pub store: MemoryStore,
	pub listener: Arc<RecordingListener>,
	pub coordinator: RefreshCoordinator,
}
impl Harness {
	pub fn new(invoker: Arc<dyn RefreshInvoker>) -> Self {
		Self::with_config(invoker, CoordinatorConfig::default())
	}

	pub fn with_config(invoker: Arc<dyn RefreshInvoker>, config: CoordinatorConfig) -> Self {
		Self::build(invoker, config, None)
	}

	pub fn with_logout(invoker: Arc<dyn RefreshInvoker>, logout: Arc<FakeLogout>) -> Self {
		Self::build(invoker, CoordinatorConfig::default(), Some(logout))
	}

	fn build(
		invoker: Arc<dyn RefreshInvoker>,
		config: CoordinatorConfig,
		logout: Option<Arc<FakeLogout>>,
	) -> Self {
		let store = MemoryStore::with_credential(Credential::new("T1"));
		let listener = Arc::new(RecordingListener::default());
		let mut builder =
			SessionTerminator::builder(Arc::new(store.clone())).listener(listener.clone());

		if let Some(logout) = logout {
			builder = builder.logout_notifier(logout);
		}

		let terminator = builder.build().expect("Terminator should build with default config.");
		let coordinator = RefreshCoordinator::new(invoker, terminator, config)
			.expect("Coordinator should build.");

		Self { store, listener, coordinator }
	}

	pub fn dispatcher<T>(&self, transport: T) -> Dispatcher<T>
	where
		T: Transport,
	{
		let config = DispatcherConfig::builder(url("https://api.example.com/api"))
			.build()
			.expect("Dispatcher config should build.");

		Dispatcher::new(transport, self.coordinator.clone(), config)
			.expect("Dispatcher should build.")
	}

	/// Polls until `count` callers are suspended on the in-flight episode.
	pub async fn wait_for_waiters(&self, count: usize) {
		tokio::time::timeout(std::time::Duration::from_secs(5), async {
			while self.coordinator.pending_waiters() != count {
				tokio::time::sleep(std::time::Duration::from_millis(1)).await;
			}
		})
		.await
		.expect("Waiters should register within the deadline.");
	}
}

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("Failed to parse test URL.")
}

/// Builds a reqwest client that accepts the self-signed certificates produced by `httpmock`.
#[cfg(feature = "reqwest")]
pub fn test_reqwest_client() -> ReqwestClient {
	ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.redirect(session_broker::reqwest::redirect::Policy::none())
		.build()
		.expect("Failed to build insecure Reqwest client for tests.")
}
