//! Outbound request dispatch with transparent, single-retry credential refresh.
//!
//! Every request carries `Authorization: Bearer <credential>` when the store holds one. A
//! credential rejection suspends the request on the shared [`RefreshCoordinator`] and re-issues it
//! exactly once with the refreshed credential. A second rejection is reported as
//! [`Error::DispatcherRetryExhausted`] instead of looping back into the coordinator.
//!
//! Requests marked [`ApiRequest::exempt_from_refresh`], and requests aimed at the configured
//! refresh path, never enter the coordinator; their rejections surface as
//! [`Error::CredentialRejected`].

pub mod request;
pub mod transport;

pub use request::*;
pub use transport::*;

// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::DispatcherConfig,
	coordinator::{CredentialRejected, RefreshCoordinator},
	error::TransportError,
	obs::{self, OperationKind, OperationSpan, Outcome},
};

/// Sends API requests through a [`Transport`], refreshing the credential on rejection.
pub struct Dispatcher<T>
where
	T: Transport,
{
	transport: Arc<T>,
	coordinator: RefreshCoordinator,
	config: DispatcherConfig,
}
impl<T> Dispatcher<T>
where
	T: Transport,
{
	/// Creates a dispatcher bound to one session's coordinator.
	pub fn new(
		transport: T,
		coordinator: RefreshCoordinator,
		config: DispatcherConfig,
	) -> Result<Self> {
		Self::with_shared_transport(Arc::new(transport), coordinator, config)
	}

	/// Creates a dispatcher that shares an existing transport handle.
	pub fn with_shared_transport(
		transport: Arc<T>,
		coordinator: RefreshCoordinator,
		config: DispatcherConfig,
	) -> Result<Self> {
		config.validate()?;

		Ok(Self { transport, coordinator, config })
	}

	/// Returns the coordinator requests wait on.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	/// Returns the dispatcher settings.
	pub fn config(&self) -> &DispatcherConfig {
		&self.config
	}

	/// Returns the underlying transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Sends `request`, refreshing and retrying once if the credential is rejected.
	///
	/// Non-rejection statuses (including other 4xx/5xx) are returned as ordinary responses; use
	/// [`ApiResponse::error_for_status`] or [`Dispatcher::dispatch_json`] to treat them as errors.
	pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: OperationKind = OperationKind::Dispatch;

		let span = OperationSpan::new(KIND, "dispatch");

		obs::record_outcome(KIND, Outcome::Attempt);

		let result = span.instrument(self.dispatch_with_retry(request)).await;

		match &result {
			Ok(_) => obs::record_outcome(KIND, Outcome::Success),
			Err(_) => obs::record_outcome(KIND, Outcome::Failure),
		}

		result
	}

	/// Sends `request`, requires a 2xx status, and decodes the JSON body into `R`.
	pub async fn dispatch_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: serde::de::DeserializeOwned,
	{
		self.dispatch(request).await?.error_for_status()?.json()
	}

	async fn dispatch_with_retry(&self, request: ApiRequest) -> Result<ApiResponse> {
		let exempt = request.exempt_from_refresh || self.config.is_refresh_path(&request.path);
		let presented = self.coordinator.current_credential();
		let response = self.send(&request, presented.as_ref()).await?;

		if !self.config.is_rejection(response.status) {
			return Ok(response);
		}
		if exempt {
			return Err(Error::CredentialRejected { status: response.status });
		}

		obs_debug!(
			"{} {} was rejected with status {}; waiting for a fresh credential.",
			request.method,
			request.path,
			response.status
		);

		let refreshed = self
			.coordinator
			.ensure_fresh_credential(CredentialRejected::new(response.status, presented))
			.await?;
		let retried = self.send(&request, Some(&refreshed.credential)).await?;

		if self.config.is_rejection(retried.status) {
			obs_warn!(
				"{} {} was rejected again after refresh episode {}.",
				request.method,
				request.path,
				refreshed.episode
			);

			return Err(Error::DispatcherRetryExhausted { status: retried.status });
		}

		Ok(retried)
	}

	async fn send(
		&self,
		request: &ApiRequest,
		credential: Option<&Credential>,
	) -> Result<ApiResponse> {
		let prepared = self.prepare(request, credential)?;
		let target = prepared.url.to_string();

		self.transport
			.send(prepared)
			.await
			.map_err(|e| TransportError::network(target, e).into())
	}

	fn prepare(
		&self,
		request: &ApiRequest,
		credential: Option<&Credential>,
	) -> Result<PreparedRequest> {
		let mut url = self.config.resolve(&request.path)?;

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(request.query.iter());
		}

		let mut headers = request
			.headers
			.iter()
			.filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
			.cloned()
			.collect::<Vec<_>>();

		if let Some(credential) = credential {
			headers.push(("Authorization".into(), credential.bearer()));
		}

		let body = request.body.as_ref().map(|body| {
			if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type")) {
				headers.push(("Content-Type".into(), "application/json".into()));
			}

			body.to_string().into_bytes()
		});

		Ok(PreparedRequest { method: request.method, url, headers, body })
	}
}
impl<T> Clone for Dispatcher<T>
where
	T: Transport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			coordinator: self.coordinator.clone(),
			config: self.config.clone(),
		}
	}
}
impl<T> Debug for Dispatcher<T>
where
	T: Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}
