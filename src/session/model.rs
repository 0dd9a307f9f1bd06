//! Session, profile, and credential models plus the session builder.

// self
use crate::{
	_prelude::*,
	session::{AccessToken, RefreshToken},
};

/// Errors produced by [`SessionBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SessionBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// The user object persisted next to the tokens and broadcast to observers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
	/// Login name within the company.
	pub username: String,
	/// Company (tenant) the user signed into.
	pub company: String,
	/// Granted roles, e.g. `ROLE_ADMIN`.
	#[serde(default)]
	pub roles: BTreeSet<String>,
}
impl SessionProfile {
	/// Creates a profile from its parts.
	pub fn new<I, S>(username: impl Into<String>, company: impl Into<String>, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			username: username.into(),
			company: company.into(),
			roles: roles.into_iter().map(Into::into).collect(),
		}
	}

	/// Returns `true` if the profile holds `role`.
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.contains(role)
	}

	/// Returns `true` if the profile holds at least one of `roles`.
	pub fn has_any_role<'a, I>(&self, roles: I) -> bool
	where
		I: IntoIterator<Item = &'a str>,
	{
		roles.into_iter().any(|role| self.has_role(role))
	}
}

/// The authenticated session currently owned by the [`SessionStore`](crate::SessionStore).
///
/// An access token always comes with an expiry; the builder refuses to produce one without
/// the other.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
	/// Who is signed in.
	pub profile: SessionProfile,
	/// Current bearer credential.
	pub access_token: AccessToken,
	/// Credential used to mint new access tokens, when the backend issued one.
	pub refresh_token: Option<RefreshToken>,
	/// When the current access token stops being accepted.
	pub expires_at: OffsetDateTime,
}
impl Session {
	/// Returns a builder for the provided profile.
	pub fn builder(profile: SessionProfile) -> SessionBuilder {
		SessionBuilder::new(profile)
	}

	/// Login name of the session owner.
	pub fn username(&self) -> &str {
		&self.profile.username
	}

	/// Company the session belongs to.
	pub fn company(&self) -> &str {
		&self.profile.company
	}

	/// Roles granted at login.
	pub fn roles(&self) -> &BTreeSet<String> {
		&self.profile.roles
	}

	/// `true` while `instant` is strictly before the expiry.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// `true` once `instant` has entered the `window` that precedes the expiry.
	///
	/// A window reaching past the representable range covers every instant.
	pub fn is_near_expiry_at(&self, window: Duration, instant: OffsetDateTime) -> bool {
		self.expires_at.checked_sub(window).is_none_or(|start| instant > start)
	}

	/// Replaces the access token and its expiry, keeping profile and refresh token.
	pub fn rotate(&mut self, access_token: AccessToken, expires_at: OffsetDateTime) {
		self.access_token = access_token;
		self.expires_at = expires_at;
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("profile", &self.profile)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Session`].
#[derive(Clone, Debug)]
pub struct SessionBuilder {
	profile: SessionProfile,
	access_token: Option<AccessToken>,
	refresh_token: Option<RefreshToken>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl SessionBuilder {
	fn new(profile: SessionProfile) -> Self {
		Self {
			profile,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(AccessToken::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(RefreshToken::new(token));

		self
	}

	/// Sets the instant a relative expiry is measured from (defaults to the current clock).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry measured from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Session`].
	pub fn build(self) -> Result<Session, SessionBuilderError> {
		let access_token = self.access_token.ok_or(SessionBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(SessionBuilderError::MissingExpiry),
		};

		Ok(Session {
			profile: self.profile,
			access_token,
			refresh_token: self.refresh_token,
			expires_at,
		})
	}
}

/// Login credentials. Only used for the login exchange and never persisted.
#[derive(Clone)]
pub struct Credentials {
	/// Company (tenant) name.
	pub company: String,
	/// Login name within the company.
	pub username: String,
	password: String,
}
impl Credentials {
	/// Bundles the three login fields.
	pub fn new(
		company: impl Into<String>,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self { company: company.into(), username: username.into(), password: password.into() }
	}

	/// Returns the raw password. Callers must avoid logging this string.
	pub fn password(&self) -> &str {
		&self.password
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("company", &self.company)
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}
