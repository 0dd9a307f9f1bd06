//! Request signing contracts that put the current access token on outgoing requests.

// crates.io
use ::http::{HeaderValue, header::AUTHORIZATION};
// self
use crate::{_prelude::*, error::ConfigError, http::HttpRequest, session::AccessToken};

/// Describes how to attach an [`AccessToken`] to an outbound request without constraining the
/// HTTP client type.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the request and returns it with authorization attached.
	fn attach_token(&self, request: Request, token: &AccessToken) -> Result<Request, Error>;
}

/// Signs requests with `Authorization: Bearer <token>`, replacing any existing value.
#[derive(Clone, Copy, Debug, Default)]
pub struct BearerSigner;
impl RequestSignerExt<HttpRequest, ConfigError> for BearerSigner {
	fn attach_token(
		&self,
		mut request: HttpRequest,
		token: &AccessToken,
	) -> Result<HttpRequest, ConfigError> {
		let mut value = HeaderValue::try_from(token.bearer())?;

		value.set_sensitive(true);
		request.headers_mut().insert(AUTHORIZATION, value);

		Ok(request)
	}
}
#[cfg(feature = "reqwest")]
impl RequestSignerExt<reqwest::RequestBuilder, std::convert::Infallible> for BearerSigner {
	fn attach_token(
		&self,
		request: reqwest::RequestBuilder,
		token: &AccessToken,
	) -> Result<reqwest::RequestBuilder, std::convert::Infallible> {
		Ok(request.bearer_auth(token.expose()))
	}
}
