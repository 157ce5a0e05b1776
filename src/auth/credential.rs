//! Redacted secret wrappers for access credentials and the out-of-band refresh material.

// self
use crate::_prelude::*;

macro_rules! def_secret {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);
		impl $name {
			/// Wraps a new secret string.
			pub fn new(value: impl Into<String>) -> Self {
				Self(value.into())
			}

			/// Returns the inner secret. Callers must avoid logging this string.
			pub fn expose(&self) -> &str {
				&self.0
			}

			/// Returns `true` when the wrapped secret is empty or whitespace.
			pub fn is_blank(&self) -> bool {
				self.0.trim().is_empty()
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				self.expose()
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.debug_tuple($kind).field(&"<redacted>").finish()
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str("<redacted>")
			}
		}
	};
}

def_secret! { Credential, "Opaque short-lived access credential presented as a bearer token.", "Credential" }
def_secret! { RefreshSecret, "Long-lived refresh credential, sent only to the refresh endpoint.", "RefreshSecret" }
def_secret! { CsrfToken, "Double-submit CSRF token echoed back to the refresh endpoint.", "CsrfToken" }

impl Credential {
	/// Formats the `Authorization` header value for this credential.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
