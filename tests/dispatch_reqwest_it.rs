#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
// self
use common::{test_reqwest_client, url};
use session_broker::{
	_preludet::*,
	auth::{Credential, RefreshSecret},
	config::{CoordinatorConfig, DispatcherConfig},
	coordinator::RefreshCoordinator,
	dispatch::{ApiRequest, Dispatcher, ReqwestTransport},
	refresh::{HttpRefreshInvoker, RefreshError},
	session::{HttpLogoutNotifier, SessionTerminator},
	store::{CredentialStore, MemoryStore},
};

#[derive(Debug, Deserialize)]
struct Task {
	id: u32,
	title: String,
}

fn wire(server: &MockServer) -> (Dispatcher<ReqwestTransport>, MemoryStore) {
	let client = test_reqwest_client();
	let store = MemoryStore::with_credential(Credential::new("T1"));
	let notifier = Arc::new(
		HttpLogoutNotifier::with_client(client.clone(), url(&server.url("/auth/logout")))
			.expect("Logout notifier should build."),
	);
	let terminator = SessionTerminator::builder(Arc::new(store.clone()))
		.logout_notifier(notifier)
		.build()
		.expect("Terminator should build.");
	let invoker = HttpRefreshInvoker::builder(url(&server.url("/auth/refresh")))
		.client(client.clone())
		.refresh_secret(RefreshSecret::new("R1"))
		.build()
		.expect("Refresh invoker should build.");
	let coordinator =
		RefreshCoordinator::new(Arc::new(invoker), terminator, CoordinatorConfig::default())
			.expect("Coordinator should build.");
	let config = DispatcherConfig::builder(url(&server.url("/api")))
		.build()
		.expect("Dispatcher config should build.");
	let dispatcher = Dispatcher::new(ReqwestTransport::with_client(client), coordinator, config)
		.expect("Dispatcher should build.");

	(dispatcher, store)
}

#[tokio::test]
async fn expired_credential_is_refreshed_and_the_request_replayed() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/tasks/7").header("authorization", "Bearer T1");
			then.status(401).body("{\"msg\":\"Token has expired\"}");
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/tasks/7").header("authorization", "Bearer T2");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":7,\"title\":\"write docs\"}");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh").header("cookie", "refresh_token_cookie=R1");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"T2\"}");
		})
		.await;
	let (dispatcher, store) = wire(&server);
	let task: Task = dispatcher
		.dispatch_json(ApiRequest::get("/tasks/7"))
		.await
		.expect("Request should succeed after refresh.");

	assert_eq!(task.id, 7);
	assert_eq!(task.title, "write docs");
	assert_eq!(store.get(), Some(Credential::new("T2")));

	stale.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn refresh_failure_terminates_and_notifies_logout() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/tasks");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(401);
		})
		.await;
	let logout = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/logout")
				.query_param("reason", "refresh_failed")
				.header("authorization", "Bearer T1");
			then.status(302).header("location", "/login");
		})
		.await;
	let (dispatcher, store) = wire(&server);
	let err = dispatcher
		.dispatch(ApiRequest::get("/tasks"))
		.await
		.expect_err("Refresh failure should surface to the caller.");

	assert!(matches!(
		err,
		Error::RefreshFailed { source: RefreshError::Rejected { status: 401 }, .. }
	));
	assert!(store.get().is_none());
	assert!(dispatcher.coordinator().terminator().is_terminated());

	api.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	logout.assert_calls_async(1).await;
}
