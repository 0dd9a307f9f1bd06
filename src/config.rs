//! Backend endpoints and refresh timing, validated up front.

// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::_prelude::*;

/// Errors raised while constructing or validating a [`SessionConfig`].
#[derive(Debug, ThisError)]
pub enum SessionConfigError {
	/// Base URL must use HTTPS unless it points at the local machine.
	#[error("The base URL must use HTTPS outside of loopback hosts: {url}.")]
	InsecureBaseUrl {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL cannot carry path segments.
	#[error("The base URL cannot be used as a base: {url}.")]
	OpaqueBaseUrl {
		/// Base URL that failed validation.
		url: String,
	},
	/// Endpoint paths are absolute on the backend.
	#[error("The {endpoint} path must start with `/`: {path}.")]
	InvalidPath {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
	},
	/// Refresh window must not be negative.
	#[error("The refresh window must not be negative.")]
	NegativeRefreshWindow,
	/// Refresh window must be shorter than the fallback token lifetime.
	#[error("The refresh window must be shorter than the fallback token lifetime.")]
	RefreshWindowOutOfRange,
	/// Fallback lifetime must be positive.
	#[error("The fallback token lifetime must be positive.")]
	NonPositiveFallbackLifetime,
	/// JSON config could not be parsed.
	#[error("Session config JSON is invalid at `{}`.", .0.path())]
	Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
}

/// Resolved auth endpoint URLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthEndpoints {
	/// Credential exchange endpoint.
	pub login: Url,
	/// Access token refresh endpoint.
	pub refresh: Url,
	/// Best-effort logout endpoint.
	pub logout: Url,
}

/// Immutable configuration consumed by the session core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
	/// Backend origin (plus optional path prefix).
	pub base_url: Url,
	/// Auth endpoints resolved against `base_url`.
	pub endpoints: AuthEndpoints,
	/// Lead time before expiry at which requests refresh proactively.
	pub refresh_window: Duration,
	/// Lifetime assumed when a refresh response omits `expiresIn`.
	pub fallback_expires_in: Duration,
}
impl SessionConfig {
	/// Default login path.
	pub const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
	/// Default refresh path.
	pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";
	/// Default logout path.
	pub const DEFAULT_LOGOUT_PATH: &str = "/api/auth/logout";
	/// Default fallback token lifetime.
	pub const DEFAULT_FALLBACK_EXPIRES_IN: Duration = Duration::minutes(15);

	/// Creates a new builder for the provided backend URL.
	pub fn builder(base_url: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(base_url)
	}

	/// Parses a JSON config document.
	///
	/// ```json
	/// { "baseUrl": "https://hr.example.com", "refreshWindowMs": 300000 }
	/// ```
	pub fn from_json_str(raw: &str) -> Result<Self, SessionConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let file: ConfigFile =
			serde_path_to_error::deserialize(de).map_err(SessionConfigError::Parse)?;
		let mut builder = Self::builder(file.base_url);

		if let Some(path) = file.login_path {
			builder = builder.login_path(path);
		}
		if let Some(path) = file.refresh_path {
			builder = builder.refresh_path(path);
		}
		if let Some(path) = file.logout_path {
			builder = builder.logout_path(path);
		}
		if let Some(millis) = file.refresh_window_ms {
			builder = builder.refresh_window(Duration::milliseconds(millis));
		}
		if let Some(millis) = file.fallback_expires_in_ms {
			builder = builder.fallback_expires_in(Duration::milliseconds(millis));
		}

		builder.build()
	}

	/// Resolves an API path (e.g. `/api/employees`) against the base URL.
	pub fn resolve(&self, path: &str) -> Url {
		join_path(&self.base_url, path)
	}

	/// `true` for the login and refresh endpoints, which never go through authorization.
	pub fn bypasses_authorization(&self, path: &str) -> bool {
		path == self.endpoints.login.path() || path == self.endpoints.refresh.path()
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
	base_url: Url,
	login_path: Option<String>,
	refresh_path: Option<String>,
	logout_path: Option<String>,
	refresh_window_ms: Option<i64>,
	fallback_expires_in_ms: Option<i64>,
}

/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	/// Backend origin.
	pub base_url: Url,
	/// Login path.
	pub login_path: String,
	/// Refresh path.
	pub refresh_path: String,
	/// Logout path.
	pub logout_path: String,
	/// Proactive refresh window.
	pub refresh_window: Duration,
	/// Lifetime assumed when a refresh response omits `expiresIn`.
	pub fallback_expires_in: Duration,
}
impl SessionConfigBuilder {
	/// Creates a new builder seeded with defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			login_path: SessionConfig::DEFAULT_LOGIN_PATH.into(),
			refresh_path: SessionConfig::DEFAULT_REFRESH_PATH.into(),
			logout_path: SessionConfig::DEFAULT_LOGOUT_PATH.into(),
			refresh_window: crate::SessionStore::DEFAULT_REFRESH_WINDOW,
			fallback_expires_in: SessionConfig::DEFAULT_FALLBACK_EXPIRES_IN,
		}
	}

	/// Overrides the login path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the refresh path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the logout path.
	pub fn logout_path(mut self, path: impl Into<String>) -> Self {
		self.logout_path = path.into();

		self
	}

	/// Overrides the proactive refresh window (defaults to 5 minutes).
	pub fn refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = window;

		self
	}

	/// Overrides the fallback token lifetime (defaults to 15 minutes).
	pub fn fallback_expires_in(mut self, lifetime: Duration) -> Self {
		self.fallback_expires_in = lifetime;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
		validate_base_url(&self.base_url)?;
		validate_path("login", &self.login_path)?;
		validate_path("refresh", &self.refresh_path)?;
		validate_path("logout", &self.logout_path)?;

		if self.refresh_window.is_negative() {
			return Err(SessionConfigError::NegativeRefreshWindow);
		}
		if !self.fallback_expires_in.is_positive() {
			return Err(SessionConfigError::NonPositiveFallbackLifetime);
		}
		if self.refresh_window >= self.fallback_expires_in {
			return Err(SessionConfigError::RefreshWindowOutOfRange);
		}

		let endpoints = AuthEndpoints {
			login: join_path(&self.base_url, &self.login_path),
			refresh: join_path(&self.base_url, &self.refresh_path),
			logout: join_path(&self.base_url, &self.logout_path),
		};

		Ok(SessionConfig {
			base_url: self.base_url,
			endpoints,
			refresh_window: self.refresh_window,
			fallback_expires_in: self.fallback_expires_in,
		})
	}
}

fn validate_base_url(url: &Url) -> Result<(), SessionConfigError> {
	if url.cannot_be_a_base() {
		return Err(SessionConfigError::OpaqueBaseUrl { url: url.to_string() });
	}

	let loopback = match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	};

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(SessionConfigError::InsecureBaseUrl { url: url.to_string() }),
	}
}

fn validate_path(endpoint: &'static str, path: &str) -> Result<(), SessionConfigError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(SessionConfigError::InvalidPath { endpoint, path: path.into() })
	}
}

fn join_path(base: &Url, path: &str) -> Url {
	let mut url = base.clone();
	let prefix = base.path().trim_end_matches('/');
	let (path, query) = match path.split_once('?') {
		Some((path, query)) => (path, Some(query)),
		None => (path, None),
	};

	url.set_path(&format!("{prefix}{path}"));
	url.set_query(query);
	url.set_fragment(None);

	url
}
