//! Session-level error types shared across the store, refresh coordinator, and authorizer.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Persistence-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request-construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Auth endpoint answered with something the client cannot use.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Backend unreachable (DNS, TCP, TLS); surfaced unchanged and never retried.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Credentials were rejected and no refresh path could recover the session.
	#[error("Authentication was rejected: {reason}.")]
	AuthRejected {
		/// Backend- or client-supplied reason string.
		reason: String,
	},
	/// The refresh call failed; the session has been cleared.
	#[error("Token refresh failed: {reason}.")]
	RefreshExhausted {
		/// Summary of the underlying refresh failure.
		reason: String,
	},
	/// The caller was released because the session core was torn down.
	#[error("Request was cancelled while waiting for a token refresh.")]
	Cancelled,
}
impl Error {
	/// Returns `true` when the error left the client without a usable session.
	pub fn is_unauthenticated(&self) -> bool {
		matches!(self, Self::AuthRejected { .. } | Self::RefreshExhausted { .. })
	}

	/// Returns `true` when the backend could not be reached at all.
	pub fn is_network(&self) -> bool {
		matches!(self, Self::Transport(_))
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
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] ::http::Error),
	/// A request URI could not be parsed.
	#[error("Request URI is invalid.")]
	InvalidUri(#[from] ::http::uri::InvalidUri),
	/// A header value could not be encoded.
	#[error("Header value is invalid.")]
	InvalidHeader(#[from] ::http::header::InvalidHeaderValue),
	/// Session config is invalid.
	#[error(transparent)]
	Session(#[from] crate::config::SessionConfigError),
	/// Session could not be assembled from an auth response.
	#[error(transparent)]
	SessionBuild(#[from] crate::session::SessionBuilderError),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Serialize(#[source] serde_json::Error),

	/// Auth response carried an empty access token.
	#[error("Auth endpoint returned an empty access token.")]
	EmptyAccessToken,
	/// Auth response carried a token type other than bearer.
	#[error("Auth endpoint returned unsupported token type `{token_type}`.")]
	UnsupportedTokenType {
		/// Token type reported by the backend.
		token_type: String,
	},
	/// Auth endpoint returned an excessively large `expiresIn`.
	#[error("The expiresIn value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Auth endpoint returned a non-positive duration.
	#[error("The expiresIn value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Unexpected but non-fatal responses from the auth endpoints.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Endpoint returned a status the client does not handle.
	#[error("Auth endpoint `{endpoint}` returned status {status}: {message}.")]
	UnexpectedStatus {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// HTTP status code.
		status: u16,
		/// Body preview or reason phrase.
		message: String,
	},
	/// Endpoint responded with malformed JSON that could not be parsed.
	#[error("Auth endpoint `{endpoint}` returned malformed JSON.")]
	ResponseParse {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure, including the offending field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code.
		status: u16,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
