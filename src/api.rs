//! Wire schemas for the auth endpoints and the typed client that calls them.
//!
//! [`AuthApi`] owns no state beyond the config and the transport. It turns each exchange into a
//! domain value ([`Session`] for login, [`IssuedToken`] for refresh) and maps every failure into
//! the crate error taxonomy: 401/403 become [`Error::AuthRejected`], other non-2xx statuses and
//! malformed JSON become [`TransientError`], unreachable backends stay [`Error::Transport`].

// crates.io
use ::http::{Method, StatusCode};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	error::{ConfigError, TransientError},
	ext::{BearerSigner, RequestSignerExt},
	http::{self as transport, HttpResponse, HttpTransport},
	session::{AccessToken, Credentials, RefreshToken, Session, SessionProfile},
};

const LOGIN: &str = "login";
const REFRESH: &str = "refresh";
const LOGOUT: &str = "logout";

/// `POST /api/auth/login` body.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
	/// Company (tenant) name.
	pub company: &'a str,
	/// Login name within the company.
	pub username: &'a str,
	/// Plain password; only ever serialized into the request body.
	pub password: &'a str,
}
impl<'a> From<&'a Credentials> for LoginRequest<'a> {
	fn from(credentials: &'a Credentials) -> Self {
		Self {
			company: &credentials.company,
			username: &credentials.username,
			password: credentials.password(),
		}
	}
}
impl Debug for LoginRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("company", &self.company)
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Successful login payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
	/// Freshly issued bearer token.
	pub access_token: AccessToken,
	/// Refresh credential; absent for sessions that cannot be extended.
	#[serde(default)]
	pub refresh_token: Option<RefreshToken>,
	/// Token scheme; must be `Bearer` when present.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Roles granted to the user.
	#[serde(default)]
	pub roles: Vec<String>,
	/// Access token lifetime in milliseconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Canonical username, when the backend normalizes it.
	#[serde(default)]
	pub username: Option<String>,
	/// Canonical company name, when the backend normalizes it.
	#[serde(default)]
	pub company: Option<String>,
}

/// `POST /api/auth/refresh` body.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
	/// Refresh credential of the current session.
	pub refresh_token: &'a str,
}
impl Debug for RefreshRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshRequest").field("refresh_token", &"<redacted>").finish()
	}
}

/// Successful refresh payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
	/// Replacement bearer token.
	pub access_token: AccessToken,
	/// Token scheme; must be `Bearer` when present.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Lifetime in milliseconds; the configured fallback applies when omitted.
	#[serde(default)]
	pub expires_in: Option<i64>,
}

/// `POST /api/auth/logout` body.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest<'a> {
	/// Refresh credential to revoke, if the session held one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<&'a str>,
}
impl Debug for LogoutRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LogoutRequest")
			.field("refresh_token", &self.refresh_token.map(|_| "<redacted>"))
			.finish()
	}
}

/// Access token minted by the refresh endpoint, with its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
	/// Replacement bearer token.
	pub access_token: AccessToken,
	/// When the replacement stops being accepted.
	pub expires_at: OffsetDateTime,
}

/// Typed client for the login, refresh, and logout endpoints.
pub struct AuthApi<C>
where
	C: ?Sized + HttpTransport,
{
	config: Arc<SessionConfig>,
	http: Arc<C>,
}
impl<C> AuthApi<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates an API client over the provided transport.
	pub fn new(config: Arc<SessionConfig>, http: Arc<C>) -> Self {
		Self { config, http }
	}

	/// Config the endpoints are resolved from.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Transport used for every call.
	pub fn transport(&self) -> &Arc<C> {
		&self.http
	}

	/// Exchanges credentials for a new [`Session`].
	///
	/// Username and company fall back to the submitted credentials when the backend omits
	/// them.
	pub async fn login(&self, credentials: &Credentials) -> Result<Session> {
		let body = LoginRequest::from(credentials);
		let response: LoginResponse =
			self.exchange(LOGIN, &self.config.endpoints.login, &body).await?;
		let (access_token, expires_at) = issue(
			response.access_token,
			response.token_type.as_deref(),
			response.expires_in,
			OffsetDateTime::now_utc(),
			self.config.fallback_expires_in,
		)?;
		let profile = SessionProfile::new(
			non_blank(response.username).unwrap_or_else(|| credentials.username.clone()),
			non_blank(response.company).unwrap_or_else(|| credentials.company.clone()),
			response.roles,
		);
		let mut builder =
			Session::builder(profile).access_token(access_token.expose()).expires_at(expires_at);

		if let Some(refresh_token) = response.refresh_token.filter(|token| !token.is_blank()) {
			builder = builder.refresh_token(refresh_token.expose());
		}

		Ok(builder.build().map_err(ConfigError::from)?)
	}

	/// Mints a new access token from `refresh_token`.
	pub async fn refresh(&self, refresh_token: &RefreshToken) -> Result<IssuedToken> {
		let body = RefreshRequest { refresh_token: refresh_token.expose() };
		let response: RefreshResponse =
			self.exchange(REFRESH, &self.config.endpoints.refresh, &body).await?;
		let (access_token, expires_at) = issue(
			response.access_token,
			response.token_type.as_deref(),
			response.expires_in,
			OffsetDateTime::now_utc(),
			self.config.fallback_expires_in,
		)?;

		Ok(IssuedToken { access_token, expires_at })
	}

	/// Notifies the backend that the session ended. The response body is ignored.
	///
	/// The request is signed with `access_token` as is; an expired token is not refreshed for
	/// the sake of a logout.
	pub async fn logout(
		&self,
		access_token: Option<&AccessToken>,
		refresh_token: Option<&RefreshToken>,
	) -> Result<()> {
		let body = LogoutRequest { refresh_token: refresh_token.map(RefreshToken::expose) };
		let mut request =
			transport::json_request(Method::POST, &self.config.endpoints.logout, &body)?;

		if let Some(token) = access_token {
			request = BearerSigner.attach_token(request, token)?;
		}

		let response = self.http.send(request).await?;

		check_status(LOGOUT, &response)
	}

	async fn exchange<B, T>(&self, endpoint: &'static str, url: &Url, body: &B) -> Result<T>
	where
		B: ?Sized + Sync + Serialize,
		T: DeserializeOwned,
	{
		let request = transport::json_request(Method::POST, url, body)?;
		let response = self.http.send(request).await?;

		check_status(endpoint, &response)?;

		parse_body(endpoint, &response)
	}
}
impl<C> Clone for AuthApi<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { config: self.config.clone(), http: self.http.clone() }
	}
}
impl<C> Debug for AuthApi<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthApi").field("endpoints", &self.config.endpoints).finish()
	}
}

fn check_status(endpoint: &'static str, response: &HttpResponse) -> Result<()> {
	let status = response.status();

	if status.is_success() {
		return Ok(());
	}

	let message = match transport::body_preview(response.body()) {
		preview if preview.is_empty() =>
			status.canonical_reason().unwrap_or("no reason phrase").to_owned(),
		preview => preview,
	};

	match status {
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::AuthRejected {
			reason: format!("{endpoint} endpoint answered {}", status.as_u16()),
		}),
		_ => Err(TransientError::UnexpectedStatus { endpoint, status: status.as_u16(), message }
			.into()),
	}
}

fn parse_body<T>(endpoint: &'static str, response: &HttpResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(de).map_err(|source| {
		TransientError::ResponseParse { endpoint, source, status: response.status().as_u16() }
			.into()
	})
}

/// Validates an issued token and converts its relative lifetime into an absolute expiry.
fn issue(
	access_token: AccessToken,
	token_type: Option<&str>,
	expires_in: Option<i64>,
	now: OffsetDateTime,
	fallback: Duration,
) -> Result<(AccessToken, OffsetDateTime)> {
	if access_token.is_blank() {
		return Err(ConfigError::EmptyAccessToken.into());
	}
	if let Some(kind) = token_type.filter(|kind| !kind.eq_ignore_ascii_case("bearer")) {
		return Err(ConfigError::UnsupportedTokenType { token_type: kind.to_owned() }.into());
	}

	let lifetime = match expires_in {
		Some(millis) if millis <= 0 => return Err(ConfigError::NonPositiveExpiresIn.into()),
		Some(millis) => Duration::milliseconds(millis),
		None => fallback,
	};
	let expires_at = now.checked_add(lifetime).ok_or(ConfigError::ExpiresInOutOfRange)?;

	Ok((access_token, expires_at))
}

fn non_blank(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.trim().is_empty())
}
