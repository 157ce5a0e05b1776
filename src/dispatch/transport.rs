//! Pluggable HTTP transport used by the [`Dispatcher`](super::Dispatcher).
//!
//! The dispatcher owns credential attachment and the retry decision; a transport only moves one
//! [`PreparedRequest`] across the wire and reports what came back. Non-2xx statuses are ordinary
//! responses, never transport errors.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
use crate::{
	_prelude::*,
	dispatch::{ApiResponse, PreparedRequest},
};
#[cfg(feature = "reqwest")] use crate::dispatch::Method;

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a, E> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, E>> + 'a + Send>>;

/// Moves prepared requests across the wire.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying client.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends `request` and returns the raw response.
	fn send(&self, request: PreparedRequest) -> TransportFuture<'_, Self::TransportError>;
}

/// Thin wrapper around [`ReqwestClient`] implementing [`Transport`].
///
/// API calls are not redirected by the dispatcher; configure custom clients to stop at
/// redirects so a credential rejection is never masked by a login page.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport whose client never follows redirects.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn execute(&self, request: PreparedRequest) -> Result<ApiResponse, ReqwestError> {
		let mut builder = self.0.request(method(request.method), request.url);

		for (name, value) in request.headers {
			builder = builder.header(name, value);
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
			})
			.collect();
		let body = response.bytes().await?.to_vec();

		Ok(ApiResponse { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	type TransportError = ReqwestError;

	fn send(&self, request: PreparedRequest) -> TransportFuture<'_, Self::TransportError> {
		Box::pin(self.execute(request))
	}
}

#[cfg(feature = "reqwest")]
fn method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Post => reqwest::Method::POST,
		Method::Put => reqwest::Method::PUT,
		Method::Patch => reqwest::Method::PATCH,
		Method::Delete => reqwest::Method::DELETE,
	}
}
