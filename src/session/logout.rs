//! Best-effort server-side logout notification sent after local state is cleared.

// self
use crate::{_prelude::*, auth::Credential, session::TerminationReason};
#[cfg(feature = "reqwest")]
use crate::{
	config,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`LogoutNotifier::notify_logout`].
pub type LogoutFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Tells the identity provider that the session ended.
///
/// Failures never block termination; the terminator logs them and moves on.
pub trait LogoutNotifier
where
	Self: Send + Sync,
{
	/// Sends the notification for a session that ended because of `reason`.
	///
	/// `credential` is the access credential the store held when the session ended.
	fn notify_logout(
		&self,
		reason: TerminationReason,
		credential: Option<Credential>,
	) -> LogoutFuture<'_>;
}

/// Logout notifier that `POST`s to the provider's logout endpoint.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct HttpLogoutNotifier {
	client: ReqwestClient,
	endpoint: Url,
}
#[cfg(feature = "reqwest")]
impl HttpLogoutNotifier {
	/// Creates a notifier for `endpoint` (HTTPS required) with a client that never follows
	/// redirects.
	pub fn new(endpoint: Url) -> Result<Self, ConfigError> {
		let client =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Self::with_client(client, endpoint)
	}

	/// Creates a notifier that reuses an existing reqwest client.
	pub fn with_client(client: ReqwestClient, endpoint: Url) -> Result<Self, ConfigError> {
		config::validate_endpoint("logout", &endpoint)?;

		Ok(Self { client, endpoint })
	}

	/// Returns the logout endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn send(&self, reason: TerminationReason, credential: Option<Credential>) -> Result<()> {
		let mut request =
			self.client.post(self.endpoint.clone()).query(&[("reason", reason.as_str())]);

		if let Some(credential) = credential {
			request = request.bearer_auth(credential.expose());
		}

		let response = request
			.send()
			.await
			.map_err(|e| TransportError::network(self.endpoint.as_str(), e))?;
		let status = response.status();

		if status.is_success() || status.is_redirection() {
			return Ok(());
		}

		let body = response.bytes().await.unwrap_or_default();

		Err(Error::status(status.as_u16(), &body))
	}
}
#[cfg(feature = "reqwest")]
impl LogoutNotifier for HttpLogoutNotifier {
	fn notify_logout(
		&self,
		reason: TerminationReason,
		credential: Option<Credential>,
	) -> LogoutFuture<'_> {
		Box::pin(self.send(reason, credential))
	}
}
#[cfg(feature = "reqwest")]
impl Debug for HttpLogoutNotifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpLogoutNotifier")
			.field("endpoint", &self.endpoint.as_str())
			.finish()
	}
}
