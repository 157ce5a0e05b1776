//! Crate-level error types shared by the coordinator, dispatcher, stores, and session.

// self
use crate::{_prelude::*, coordinator::EpisodeId, refresh::RefreshError, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Server rejected the presented credential on a request that is never auto-refreshed.
	#[error("Server rejected the presented credential with status {status}.")]
	CredentialRejected {
		/// Status code that signaled the rejection.
		status: u16,
	},
	/// The refresh exchange failed; the session has been terminated.
	#[error("Credential refresh failed during episode {episode}.")]
	RefreshFailed {
		/// Refresh episode that produced the failure.
		episode: EpisodeId,
		/// Failure reported by the refresh invoker.
		#[source]
		source: RefreshError,
	},
	/// The refresh exchange exceeded its deadline; handled exactly like [`Error::RefreshFailed`].
	#[error("Credential refresh timed out after {after} during episode {episode}.")]
	RefreshTimeout {
		/// Refresh episode that timed out.
		episode: EpisodeId,
		/// Deadline that elapsed.
		after: Duration,
	},
	/// A request already retried once for credential reasons was rejected again.
	#[error("Request was rejected again after retrying with a refreshed credential (status {status}).")]
	DispatcherRetryExhausted {
		/// Status code of the second rejection.
		status: u16,
	},
	/// No refresh was attempted because the session is already terminated.
	#[error("Session has been terminated; sign in again.")]
	SessionTerminated,
	/// The refresh episode ended without delivering an outcome to this waiter.
	#[error("Refresh episode {episode} ended without an outcome.")]
	Cancelled {
		/// Episode the waiter had joined.
		episode: EpisodeId,
	},
	/// Upstream answered with a non-success status.
	#[error("Request failed with status {status}: {body_preview}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Leading bytes of the response body, lossily decoded.
		body_preview: String,
	},
	/// Response body could not be decoded into the requested type.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the decoded response.
		status: u16,
	},
}
impl Error {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Builds [`Error::Status`] from a raw response body, keeping only a short prefix.
	pub fn status(status: u16, body: &[u8]) -> Self {
		let text = String::from_utf8_lossy(body);
		let body_preview = match text.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			Some((end, _)) => format!("{}…", &text[..end]),
			None => text.into_owned(),
		};

		Self::Status { status, body_preview }
	}

	/// Returns `true` for failures that ended (or found already ended) the session.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			Self::RefreshFailed { .. } | Self::RefreshTimeout { .. } | Self::SessionTerminated
		)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL or request path cannot be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Which setting failed validation.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A request path resolved to a different origin than the dispatcher's base URL.
	#[error("Request target {url} is outside the configured base URL.")]
	ForeignRequestTarget {
		/// Resolved request URL.
		url: String,
	},
	/// Timeouts must be strictly positive.
	#[error("The {field} timeout must be positive.")]
	NonPositiveTimeout {
		/// Which timeout failed validation.
		field: &'static str,
	},
	/// At least one status must signal credential rejection.
	#[error("At least one credential rejection status is required.")]
	EmptyRejectionStatuses,
	/// Rejection statuses must be valid client error codes.
	#[error("Status {status} cannot signal a credential rejection.")]
	InvalidRejectionStatus {
		/// Offending status code.
		status: u16,
	},
	/// A header name or value cannot be encoded.
	#[error("The {header} header cannot be encoded.")]
	InvalidHeader {
		/// Header that failed validation.
		header: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Request target that failed.
		target: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		target: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { target: target.into(), source: Box::new(src) }
	}
}
