//! Credential secrets and session-identifying profile data.

pub mod credential;
pub mod profile;

pub use credential::*;
pub use profile::*;
