//! Single-flight access credential refresh for API clients: attach bearer tokens, coalesce
//! concurrent credential rejections into one refresh, replay queued requests, and end the session
//! cleanly when refresh fails.
//!
//! The crate is organized leaf-first:
//!
//! - [`store`] keeps the current access credential ([`store::CredentialStore`]).
//! - [`refresh`] trades the out-of-band refresh credential for a new access credential.
//! - [`coordinator`] serializes refresh attempts and fans the outcome out to every waiter.
//! - [`dispatch`] attaches credentials to outbound calls and retries a rejected call once.
//! - [`session`] terminates the session when refresh fails or the user signs out.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[macro_use]
mod macros;

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod obs;
pub mod refresh;
pub mod session;
pub mod store;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports for integration tests and demos.

	pub use crate::_prelude::*;
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
