//! Session-identifying profile kept alongside the access credential.

// self
use crate::_prelude::*;

/// Signed-in user details the host application shows while the session is alive.
///
/// The profile is supplied by the host after sign-in; the broker never derives it from the
/// credential itself. It is wiped together with the credential when the session terminates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
	/// Stable user identifier.
	pub id: String,
	/// Primary email address.
	pub email: String,
	/// Display name.
	pub name: String,
	/// Avatar URL, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub image: Option<String>,
}
impl SessionProfile {
	/// Creates a profile without an avatar.
	pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
		Self { id: id.into(), email: email.into(), name: name.into(), image: None }
	}

	/// Attaches an avatar URL.
	pub fn with_image(mut self, image: impl Into<String>) -> Self {
		self.image = Some(image.into());

		self
	}
}
