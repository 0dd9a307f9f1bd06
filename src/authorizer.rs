//! Bearer authorization for outgoing requests with retry-once recovery from 401.

// crates.io
use ::http::{StatusCode, Uri};
// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	error::ConfigError,
	ext::{BearerSigner, Navigator, RequestSignerExt, UnauthenticatedReason},
	http::{self as transport, HttpRequest, HttpResponse, HttpTransport},
	obs::{self, OpKind, OpOutcome, OpSpan},
	refresh::RefreshCoordinator,
	session::AccessToken,
};

/// Sends requests through the transport with the current access token attached.
///
/// The login and refresh endpoints are passed straight through so they can never recurse into
/// the refresh flow, as are requests to any origin other than the configured base URL, which
/// never see the session token. Every other request is signed with the token handed out by the
/// [`RefreshCoordinator`]; a 401 triggers one refresh and one resubmission, never more.
/// Transport failures are returned as they are and leave the session alone.
pub struct RequestAuthorizer<C>
where
	C: ?Sized + HttpTransport,
{
	config: Arc<SessionConfig>,
	http: Arc<C>,
	coordinator: Arc<RefreshCoordinator<C>>,
	navigator: Arc<dyn Navigator>,
	signer: BearerSigner,
}
impl<C> RequestAuthorizer<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates an authorizer sharing the coordinator's transport.
	pub fn new(
		config: Arc<SessionConfig>,
		http: Arc<C>,
		coordinator: Arc<RefreshCoordinator<C>>,
		navigator: Arc<dyn Navigator>,
	) -> Self {
		Self { config, http, coordinator, navigator, signer: BearerSigner }
	}

	/// Coordinator supplying tokens.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator<C>> {
		&self.coordinator
	}

	/// Sends `request`, authorizing it unless it targets the login or refresh endpoint or
	/// another origin.
	///
	/// Relative URIs (`/api/employees`) are resolved against the configured base URL first.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		const KIND: OpKind = OpKind::Authorize;

		let request = absolutize(&self.config, request)?;

		if !same_origin(&self.config.base_url, request.uri())
			|| self.config.bypasses_authorization(request.uri().path())
		{
			return Ok(self.http.send(request).await?);
		}

		let span = OpSpan::new(KIND, "send");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.authorize_and_send(request)).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	async fn authorize_and_send(&self, request: HttpRequest) -> Result<HttpResponse> {
		let Some(token) = self.coordinator.token_for_request().await? else {
			return self.send_unauthenticated(request).await;
		};
		let retry = transport::duplicate(&request)?;
		let response = self.http.send(self.sign(request, &token)?).await?;

		if response.status() != StatusCode::UNAUTHORIZED {
			return Ok(response);
		}

		obs::trace_warning(OpKind::Authorize, "request rejected with 401; refreshing once");

		let fresh = self.coordinator.refresh_after_rejection(&token).await?;

		// The second answer is final, whatever its status.
		Ok(self.http.send(self.sign(retry, &fresh)?).await?)
	}

	async fn send_unauthenticated(&self, request: HttpRequest) -> Result<HttpResponse> {
		let response = self.http.send(request).await?;

		if response.status() != StatusCode::UNAUTHORIZED {
			return Ok(response);
		}

		self.navigator.redirect_to_login(UnauthenticatedReason::Rejected);

		Err(Error::AuthRejected { reason: "request requires a session".into() })
	}

	fn sign(&self, request: HttpRequest, token: &AccessToken) -> Result<HttpRequest> {
		Ok(self.signer.attach_token(request, token)?)
	}
}
impl<C> Debug for RequestAuthorizer<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestAuthorizer")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

fn absolutize(config: &SessionConfig, mut request: HttpRequest) -> Result<HttpRequest> {
	if request.uri().scheme().is_some() {
		return Ok(request);
	}

	let path = request.uri().path_and_query().map_or("/", |path| path.as_str());
	let uri = config.resolve(path).as_str().parse::<Uri>().map_err(ConfigError::from)?;

	*request.uri_mut() = uri;

	Ok(request)
}

fn same_origin(base: &Url, uri: &Uri) -> bool {
	let default_port = |scheme: &str| match scheme {
		"https" => Some(443),
		"http" => Some(80),
		_ => None,
	};
	let (Some(scheme), Some(host)) = (uri.scheme_str(), uri.host()) else {
		return false;
	};

	scheme.eq_ignore_ascii_case(base.scheme())
		&& base.host_str().is_some_and(|base_host| base_host.eq_ignore_ascii_case(host))
		&& uri.port_u16().or_else(|| default_port(scheme)) == base.port_or_known_default()
}
