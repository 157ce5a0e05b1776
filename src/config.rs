//! Validated configuration for the coordinator, dispatcher, and session terminator.
//!
//! Every config type deserializes with serde (missing fields fall back to defaults) and exposes a
//! builder whose `build` runs the same `validate` check used after deserialization.

// self
use crate::{_prelude::*, error::ConfigError};

/// Settings for the refresh coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
	/// Upper bound on a single refresh exchange; elapsing counts as a refresh failure.
	pub refresh_timeout: Duration,
}
impl CoordinatorConfig {
	const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::seconds(15);

	/// Returns a builder seeded with defaults.
	pub fn builder() -> CoordinatorConfigBuilder {
		CoordinatorConfigBuilder(Self::default())
	}

	/// Checks invariants after deserialization or manual construction.
	pub fn validate(&self) -> Result<(), ConfigError> {
		ensure_positive("refresh", self.refresh_timeout)
	}
}
impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self { refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT }
	}
}

/// Builder for [`CoordinatorConfig`].
#[derive(Debug)]
pub struct CoordinatorConfigBuilder(CoordinatorConfig);
impl CoordinatorConfigBuilder {
	/// Overrides the refresh deadline.
	pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
		self.0.refresh_timeout = timeout;

		self
	}

	/// Validates and returns the config.
	pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
		self.0.validate()?;

		Ok(self.0)
	}
}

/// Settings for the request dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Path of the refresh endpoint; requests to it are never auto-refreshed.
	#[serde(default = "DispatcherConfig::default_refresh_path")]
	pub refresh_path: String,
	/// Statuses that signal a credential rejection.
	#[serde(default = "DispatcherConfig::default_rejection_statuses")]
	pub rejection_statuses: Vec<u16>,
}
impl DispatcherConfig {
	/// Returns a builder for the provided base URL.
	pub fn builder(base_url: Url) -> DispatcherConfigBuilder {
		DispatcherConfigBuilder(Self {
			base_url,
			refresh_path: Self::default_refresh_path(),
			rejection_statuses: Self::default_rejection_statuses(),
		})
	}

	/// Returns `true` when `status` signals a rejected credential.
	pub fn is_rejection(&self, status: u16) -> bool {
		self.rejection_statuses.contains(&status)
	}

	/// Returns `true` when `path` targets the refresh endpoint.
	pub fn is_refresh_path(&self, path: &str) -> bool {
		normalize_path(path) == normalize_path(&self.refresh_path)
	}

	/// Resolves a request path against the base URL.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		let mut base = self.base_url.clone();

		if !base.path().ends_with('/') {
			let with_slash = format!("{}/", base.path());

			base.set_path(&with_slash);
		}

		let url = base
			.join(path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidUrl { field: "request", source })?;

		if url.origin() != self.base_url.origin() {
			return Err(ConfigError::ForeignRequestTarget { url: url.to_string() });
		}

		Ok(url)
	}

	/// Checks invariants after deserialization or manual construction.
	pub fn validate(&self) -> Result<(), ConfigError> {
		validate_endpoint("base", &self.base_url)?;

		if self.rejection_statuses.is_empty() {
			return Err(ConfigError::EmptyRejectionStatuses);
		}
		if let Some(status) =
			self.rejection_statuses.iter().copied().find(|status| !(400..500).contains(status))
		{
			return Err(ConfigError::InvalidRejectionStatus { status });
		}

		Ok(())
	}

	fn default_refresh_path() -> String {
		"/auth/refresh".into()
	}

	fn default_rejection_statuses() -> Vec<u16> {
		vec![401]
	}
}

/// Builder for [`DispatcherConfig`].
#[derive(Debug)]
pub struct DispatcherConfigBuilder(DispatcherConfig);
impl DispatcherConfigBuilder {
	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.0.refresh_path = path.into();

		self
	}

	/// Replaces the statuses that signal a credential rejection.
	pub fn rejection_statuses<I>(mut self, statuses: I) -> Self
	where
		I: IntoIterator<Item = u16>,
	{
		self.0.rejection_statuses = statuses.into_iter().collect();

		self
	}

	/// Validates and returns the config.
	pub fn build(self) -> Result<DispatcherConfig, ConfigError> {
		self.0.validate()?;

		Ok(self.0)
	}
}

/// Settings for the session terminator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Upper bound on the best-effort logout notification.
	pub logout_timeout: Duration,
	/// Message recorded for the host when a refresh failure ends the session.
	pub expiry_message: String,
}
impl SessionConfig {
	const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::seconds(5);

	/// Checks invariants after deserialization or manual construction.
	pub fn validate(&self) -> Result<(), ConfigError> {
		ensure_positive("logout", self.logout_timeout)
	}
}
impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			logout_timeout: Self::DEFAULT_LOGOUT_TIMEOUT,
			expiry_message: "Session expired. Please login again.".into(),
		}
	}
}

pub(crate) fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	if url.scheme() != "https" {
		Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

fn ensure_positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value.is_positive() { Ok(()) } else { Err(ConfigError::NonPositiveTimeout { field }) }
}

fn normalize_path(path: &str) -> &str {
	path.trim_start_matches('/').trim_end_matches('/')
}
