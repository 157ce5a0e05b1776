//! Refresh invoker contract: trade the out-of-band refresh credential for a new access credential.
//!
//! The coordinator guarantees that [`RefreshInvoker::refresh`] is never called concurrently, so
//! implementations do not need to be reentrant. Any retry policy (for example one extra attempt
//! on a dropped connection) lives inside the invoker, never in the coordinator.

#[cfg(feature = "reqwest")] pub mod http;

#[cfg(feature = "reqwest")] pub use http::*;

// self
use crate::{_prelude::*, auth::Credential, store::StoreError};

/// Boxed future returned by [`RefreshInvoker::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, RefreshError>> + 'a + Send>>;

/// Performs the network exchange that mints a new access credential.
pub trait RefreshInvoker
where
	Self: Send + Sync,
{
	/// Requests a new access credential from the identity provider.
	fn refresh(&self) -> RefreshFuture<'_>;
}

/// Failure reported by a [`RefreshInvoker`].
///
/// The enum is cloneable so one failure can be broadcast to every waiter of an episode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum RefreshError {
	/// The refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the refresh credential with status {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// The refresh endpoint succeeded but returned no usable access credential.
	#[error("Refresh response did not contain an access token.")]
	MissingAccessToken,
	/// The refresh response could not be parsed.
	#[error("Refresh response is malformed: {message}.")]
	MalformedResponse {
		/// Parser diagnostic including the failing path.
		message: String,
	},
	/// The exchange never produced a response.
	#[error("Refresh transport failed: {message}.")]
	Transport {
		/// Transport diagnostic.
		message: String,
	},
	/// The new credential could not be written to the credential store.
	#[error("Refreshed credential could not be stored: {0}")]
	Storage(#[from] StoreError),
}

/// Wire shape of a successful refresh response.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
	#[serde(default)]
	pub(crate) access_token: Option<String>,
}
impl RefreshResponse {
	/// Parses a refresh response body, reporting the failing JSON path on error.
	pub(crate) fn parse(body: &[u8]) -> Result<Credential, RefreshError> {
		let mut de = serde_json::Deserializer::from_slice(body);
		let response: RefreshResponse = serde_path_to_error::deserialize(&mut de)
			.map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;

		response
			.access_token
			.map(Credential::new)
			.filter(|credential| !credential.is_blank())
			.ok_or(RefreshError::MissingAccessToken)
	}
}
