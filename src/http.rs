//! Transport primitives shared by the auth API and the request authorizer.
//!
//! The module exposes [`HttpTransport`], the crate's only dependency on an HTTP stack, over
//! plain [`::http`] request/response types so hosts can plug in whatever client they already
//! run. A reqwest-backed implementation ships behind the default `reqwest` feature.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use ::http::{
	HeaderValue, Method, Request, Response,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Outgoing request with a buffered body.
pub type HttpRequest = Request<Vec<u8>>;
/// Incoming response with a buffered body.
pub type HttpResponse = Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

const JSON: HeaderValue = HeaderValue::from_static("application/json");
const PREVIEW_LIMIT: usize = 256;

/// Executes HTTP requests on behalf of the session core.
///
/// Implementations must resolve with `Ok` for every response the backend produced,
/// whatever its status; `Err` is reserved for requests that never got a response
/// (DNS, TCP, TLS, I/O). The authorizer relies on that split to tell a 401 from an
/// unreachable backend.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the response body.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Builds a JSON request with `Content-Type` and `Accept` set.
pub fn json_request<T>(method: Method, url: &Url, body: &T) -> Result<HttpRequest>
where
	T: ?Sized + Serialize,
{
	let payload = serde_json::to_vec(body).map_err(ConfigError::Serialize)?;
	let request = Request::builder()
		.method(method)
		.uri(url.as_str())
		.header(CONTENT_TYPE, JSON)
		.header(ACCEPT, JSON)
		.body(payload)
		.map_err(ConfigError::from)?;

	Ok(request)
}

/// Builds a body-less request that accepts JSON.
pub fn empty_request(method: Method, url: &Url) -> Result<HttpRequest> {
	let request = Request::builder()
		.method(method)
		.uri(url.as_str())
		.header(ACCEPT, JSON)
		.body(Vec::new())
		.map_err(ConfigError::from)?;

	Ok(request)
}

/// Copies method, URI, version, headers, and body so a request can be resubmitted.
pub(crate) fn duplicate(request: &HttpRequest) -> Result<HttpRequest> {
	let mut copy = Request::builder()
		.method(request.method().clone())
		.uri(request.uri().clone())
		.version(request.version())
		.body(request.body().clone())
		.map_err(ConfigError::from)?;

	*copy.headers_mut() = request.headers().clone();

	Ok(copy)
}

/// Lossy, length-capped rendering of a response body for error messages.
pub(crate) fn body_preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	match trimmed.char_indices().nth(PREVIEW_LIMIT) {
		Some((cut, _)) => format!("{}...", &trimmed[..cut]),
		None => trimmed.to_owned(),
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Auth endpoints answer directly; configure any custom [`ReqwestClient`] to disable redirect
/// following so a login response is never replayed against another origin.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that never follows redirects.
	pub fn without_redirects() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let response = client.execute(request.try_into()?).await?;
			let status = response.status();
			let version = response.version();
			let headers = response.headers().to_owned();
			let mut buffered = HttpResponse::new(response.bytes().await?.to_vec());

			*buffered.status_mut() = status;
			*buffered.version_mut() = version;
			*buffered.headers_mut() = headers;

			Ok::<_, TransportError>(buffered)
		})
	}
}
