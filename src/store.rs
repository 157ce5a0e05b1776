//! Storage contract and built-in backends for the current access credential.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Credential};

/// Holder of the session's current access credential.
///
/// Reads never block on I/O so every outbound request can consult the store. Only the
/// refresh coordinator (after a successful refresh or sign-in) and the session terminator
/// (on clear) mutate it; ordinary requests only read.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the current best-known credential, if any.
	fn get(&self) -> Option<Credential>;

	/// Replaces the stored credential; concurrent readers observe the new value immediately.
	fn set(&self, credential: Credential) -> Result<(), StoreError>;

	/// Removes the stored credential.
	fn clear(&self) -> Result<(), StoreError>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
