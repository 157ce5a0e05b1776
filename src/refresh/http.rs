//! Reqwest-backed [`RefreshInvoker`] that talks to a cookie-authenticated refresh endpoint.
//!
//! The refresh credential travels out-of-band as a cookie and the endpoint expects the matching
//! double-submit CSRF token in a header. When the endpoint rotates either cookie through
//! `Set-Cookie`, the invoker adopts the new value for the next exchange.

// crates.io
use reqwest::{
	Response,
	header::{ACCEPT, COOKIE, HeaderMap, HeaderName, SET_COOKIE},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CsrfToken, RefreshSecret},
	config,
	error::ConfigError,
	refresh::{RefreshError, RefreshFuture, RefreshInvoker, RefreshResponse},
};

/// Cookie name the refresh credential is sent under by default.
pub const DEFAULT_REFRESH_COOKIE: &str = "refresh_token_cookie";
/// Cookie name the CSRF token is rotated under by default.
pub const DEFAULT_CSRF_COOKIE: &str = "csrf_refresh_token";
/// Header the CSRF token is echoed in by default.
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Refresh invoker that `POST`s to the refresh endpoint with cookie-carried credentials.
pub struct HttpRefreshInvoker {
	client: ReqwestClient,
	endpoint: Url,
	refresh_cookie: String,
	csrf_cookie: String,
	csrf_header: HeaderName,
	refresh_secret: RwLock<Option<RefreshSecret>>,
	csrf_token: RwLock<Option<CsrfToken>>,
	transport_retries: u8,
}
impl HttpRefreshInvoker {
	/// Returns a builder for the provided refresh endpoint.
	pub fn builder(endpoint: Url) -> HttpRefreshInvokerBuilder {
		HttpRefreshInvokerBuilder::new(endpoint)
	}

	/// Returns the refresh endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Replaces the refresh credential, e.g. after a fresh sign-in.
	pub fn set_refresh_secret(&self, secret: RefreshSecret) {
		*self.refresh_secret.write() = Some(secret);
	}

	/// Replaces the CSRF token echoed to the refresh endpoint.
	pub fn set_csrf_token(&self, token: CsrfToken) {
		*self.csrf_token.write() = Some(token);
	}

	/// Returns the refresh credential the next exchange will present.
	pub fn refresh_secret(&self) -> Option<RefreshSecret> {
		self.refresh_secret.read().clone()
	}

	/// Returns the CSRF token the next exchange will present.
	pub fn csrf_token(&self) -> Option<CsrfToken> {
		self.csrf_token.read().clone()
	}

	async fn send_once(&self) -> Result<Response, ReqwestError> {
		let mut request =
			self.client.post(self.endpoint.clone()).header(ACCEPT, "application/json");

		if let Some(secret) = self.refresh_secret() {
			request = request.header(COOKIE, format!("{}={}", self.refresh_cookie, secret.expose()));
		}
		if let Some(token) = self.csrf_token() {
			request = request.header(self.csrf_header.clone(), token.expose());
		}

		request.send().await
	}

	async fn exchange(&self) -> Result<Credential, RefreshError> {
		let mut attempt = 0_u8;
		let response = loop {
			match self.send_once().await {
				Ok(response) => break response,
				Err(e) if !e.is_builder() && attempt < self.transport_retries => {
					attempt += 1;

					obs_debug!("Refresh transport failed ({e}); retrying attempt {attempt}.");
				},
				Err(e) => return Err(RefreshError::Transport { message: e.to_string() }),
			}
		};
		let status = response.status();

		if !status.is_success() {
			return Err(RefreshError::Rejected { status: status.as_u16() });
		}

		self.adopt_rotated_cookies(response.headers());

		let body = response
			.bytes()
			.await
			.map_err(|e| RefreshError::Transport { message: e.to_string() })?;

		RefreshResponse::parse(&body)
	}

	fn adopt_rotated_cookies(&self, headers: &HeaderMap) {
		for value in headers.get_all(SET_COOKIE) {
			let Some((name, value)) = value.to_str().ok().and_then(parse_set_cookie) else {
				continue;
			};

			if value.is_empty() {
				continue;
			}
			if name == self.refresh_cookie {
				self.set_refresh_secret(RefreshSecret::new(value));
			} else if name == self.csrf_cookie {
				self.set_csrf_token(CsrfToken::new(value));
			}
		}
	}
}
impl RefreshInvoker for HttpRefreshInvoker {
	fn refresh(&self) -> RefreshFuture<'_> {
		Box::pin(self.exchange())
	}
}
impl Debug for HttpRefreshInvoker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpRefreshInvoker")
			.field("endpoint", &self.endpoint.as_str())
			.field("refresh_cookie", &self.refresh_cookie)
			.field("refresh_secret_set", &self.refresh_secret.read().is_some())
			.field("csrf_token_set", &self.csrf_token.read().is_some())
			.field("transport_retries", &self.transport_retries)
			.finish()
	}
}

/// Builder for [`HttpRefreshInvoker`].
#[derive(Debug)]
pub struct HttpRefreshInvokerBuilder {
	endpoint: Url,
	client: Option<ReqwestClient>,
	refresh_cookie: String,
	csrf_cookie: String,
	csrf_header: String,
	refresh_secret: Option<RefreshSecret>,
	csrf_token: Option<CsrfToken>,
	transport_retries: u8,
}
impl HttpRefreshInvokerBuilder {
	fn new(endpoint: Url) -> Self {
		Self {
			endpoint,
			client: None,
			refresh_cookie: DEFAULT_REFRESH_COOKIE.into(),
			csrf_cookie: DEFAULT_CSRF_COOKIE.into(),
			csrf_header: DEFAULT_CSRF_HEADER.into(),
			refresh_secret: None,
			csrf_token: None,
			transport_retries: 1,
		}
	}

	/// Reuses an existing reqwest client.
	pub fn client(mut self, client: ReqwestClient) -> Self {
		self.client = Some(client);

		self
	}

	/// Overrides the cookie name carrying the refresh credential.
	pub fn refresh_cookie(mut self, name: impl Into<String>) -> Self {
		self.refresh_cookie = name.into();

		self
	}

	/// Overrides the cookie name the CSRF token is rotated under.
	pub fn csrf_cookie(mut self, name: impl Into<String>) -> Self {
		self.csrf_cookie = name.into();

		self
	}

	/// Overrides the header the CSRF token is echoed in.
	pub fn csrf_header(mut self, name: impl Into<String>) -> Self {
		self.csrf_header = name.into();

		self
	}

	/// Sets the refresh credential presented on the first exchange.
	pub fn refresh_secret(mut self, secret: RefreshSecret) -> Self {
		self.refresh_secret = Some(secret);

		self
	}

	/// Sets the CSRF token presented on the first exchange.
	pub fn csrf_token(mut self, token: CsrfToken) -> Self {
		self.csrf_token = Some(token);

		self
	}

	/// Number of extra attempts after a network failure (HTTP rejections are never retried).
	pub fn transport_retries(mut self, retries: u8) -> Self {
		self.transport_retries = retries;

		self
	}

	/// Validates the settings and builds the invoker.
	pub fn build(self) -> Result<HttpRefreshInvoker, ConfigError> {
		config::validate_endpoint("refresh", &self.endpoint)?;

		let csrf_header = HeaderName::try_from(self.csrf_header.as_str())
			.map_err(|_| ConfigError::InvalidHeader { header: self.csrf_header.clone() })?;

		if self.refresh_cookie.is_empty() || self.refresh_cookie.contains(['=', ';', ' ']) {
			return Err(ConfigError::InvalidHeader {
				header: format!("cookie {}", self.refresh_cookie),
			});
		}

		let client = match self.client {
			Some(client) => client,
			None => ReqwestClient::builder()
				.redirect(reqwest::redirect::Policy::none())
				.build()
				.map_err(ConfigError::from)?,
		};

		Ok(HttpRefreshInvoker {
			client,
			endpoint: self.endpoint,
			refresh_cookie: self.refresh_cookie,
			csrf_cookie: self.csrf_cookie,
			csrf_header,
			refresh_secret: RwLock::new(self.refresh_secret),
			csrf_token: RwLock::new(self.csrf_token),
			transport_retries: self.transport_retries,
		})
	}
}

fn parse_set_cookie(raw: &str) -> Option<(&str, &str)> {
	let pair = raw.split(';').next()?;
	let (name, value) = pair.split_once('=')?;

	Some((name.trim(), value.trim()))
}
