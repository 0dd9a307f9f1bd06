//! Authenticated-session core for the HR dashboard client: persisted sessions, singleflight
//! token refresh with FIFO waiters, and bearer request authorization with retry-once recovery.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod authorizer;
pub mod client;
pub mod config;
pub mod error;
pub mod ext;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod session;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{BTreeSet, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
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

pub use client::AuthClient;
pub use config::SessionConfig;
pub use session::{Credentials, Session, SessionProfile, SessionStore};

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
