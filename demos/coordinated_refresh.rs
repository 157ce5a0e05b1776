//! Demonstrates three concurrent API calls hitting an expired credential, sharing one refresh
//! exchange, and replaying with the new credential.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use session_broker::{
	auth::{Credential, RefreshSecret},
	config::{CoordinatorConfig, DispatcherConfig},
	coordinator::RefreshCoordinator,
	dispatch::{ApiRequest, Dispatcher, ReqwestTransport},
	refresh::HttpRefreshInvoker,
	reqwest::Client,
	session::SessionTerminator,
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/tasks").header("authorization", "Bearer demo-expired");
			then.status(401).body("{\"msg\":\"Token has expired\"}");
		})
		.await;
	let fresh_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/tasks").header("authorization", "Bearer demo-fresh");
			then.status(200).header("content-type", "application/json").body("{\"ok\":true}");
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"demo-fresh\"}");
		})
		.await;
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()?;
	let terminator = SessionTerminator::builder(Arc::new(MemoryStore::with_credential(
		Credential::new("demo-expired"),
	)))
	.build()?;
	let invoker = HttpRefreshInvoker::builder(Url::parse(&server.url("/auth/refresh"))?)
		.client(client.clone())
		.refresh_secret(RefreshSecret::new("demo-refresh"))
		.build()?;
	let coordinator =
		RefreshCoordinator::new(Arc::new(invoker), terminator, CoordinatorConfig::default())?;
	let dispatcher = Dispatcher::new(
		ReqwestTransport::with_client(client),
		coordinator.clone(),
		DispatcherConfig::builder(Url::parse(&server.url("/api"))?).build()?,
	)?;
	let (first, second, third) = tokio::join!(
		dispatcher.dispatch(ApiRequest::get("/tasks").query("page", "1")),
		dispatcher.dispatch(ApiRequest::get("/tasks").query("page", "2")),
		dispatcher.dispatch(ApiRequest::get("/tasks").query("page", "3")),
	);

	println!(
		"Statuses after one shared refresh: {}, {}, {}.",
		first?.status,
		second?.status,
		third?.status
	);
	println!(
		"Refresh episodes: {}, coalesced callers: {}.",
		coordinator.metrics().episodes(),
		coordinator.metrics().coalesced()
	);

	stale_mock.assert_calls_async(3).await;
	fresh_mock.assert_calls_async(3).await;
	refresh_mock.assert_calls_async(1).await;

	Ok(())
}
