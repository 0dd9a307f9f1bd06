//! Facade wiring the session store, refresh coordinator, and request authorizer together.

// crates.io
use tokio::sync::watch;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	api::AuthApi,
	authorizer::RequestAuthorizer,
	config::SessionConfig,
	ext::{Navigator, UnauthenticatedReason},
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{self, OpKind, OpOutcome, OpSpan},
	refresh::{RefreshCoordinator, RefreshMetrics},
	session::{Credentials, SessionProfile, SessionStore},
	store::KeyValueStore,
};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestAuthClient = AuthClient<ReqwestHttpClient>;

/// Entry point for hosts: sign in and out, send authorized requests, and inspect the session.
///
/// Construction restores any persisted session, dropping it if it already expired. Login and
/// logout are serialized so a logout can never be undone by a login response that arrives
/// after it.
pub struct AuthClient<C>
where
	C: ?Sized + HttpTransport,
{
	config: Arc<SessionConfig>,
	api: AuthApi<C>,
	store: Arc<SessionStore>,
	coordinator: Arc<RefreshCoordinator<C>>,
	authorizer: RequestAuthorizer<C>,
	navigator: Arc<dyn Navigator>,
	lifecycle: AsyncMutex<()>,
}
impl<C> AuthClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a client over a caller-provided transport.
	pub fn with_http_client(
		config: SessionConfig,
		backend: Arc<dyn KeyValueStore>,
		http_client: impl Into<Arc<C>>,
		navigator: Arc<dyn Navigator>,
	) -> Result<Self> {
		let config = Arc::new(config);
		let http = http_client.into();
		let store = Arc::new(SessionStore::with_refresh_window(backend, config.refresh_window)?);
		let api = AuthApi::new(config.clone(), http.clone());
		let coordinator =
			Arc::new(RefreshCoordinator::new(api.clone(), store.clone(), navigator.clone()));
		let authorizer =
			RequestAuthorizer::new(config.clone(), http, coordinator.clone(), navigator.clone());

		Ok(Self {
			config,
			api,
			store,
			coordinator,
			authorizer,
			navigator,
			lifecycle: AsyncMutex::new(()),
		})
	}

	/// Backend configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Session store backing this client.
	pub fn store(&self) -> &Arc<SessionStore> {
		&self.store
	}

	/// Refresh coordinator backing this client.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator<C>> {
		&self.coordinator
	}

	/// Refresh counters.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	/// Signs in and makes the new session current.
	///
	/// A rejected login leaves any existing session untouched.
	pub async fn login(&self, credentials: &Credentials) -> Result<SessionProfile> {
		const KIND: OpKind = OpKind::Login;

		let span = OpSpan::new(KIND, "login");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _lifecycle = self.lifecycle.lock().await;
				let session = self.api.login(credentials).await?;
				let profile = session.profile.clone();

				self.store.save(session)?;

				Ok(profile)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Signs out: tells the backend on a best-effort basis, clears the session, and redirects.
	///
	/// Only a storage failure while clearing is reported; the backend call may fail freely.
	pub async fn logout(&self) -> Result<()> {
		const KIND: OpKind = OpKind::Logout;

		let span = OpSpan::new(KIND, "logout");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _lifecycle = self.lifecycle.lock().await;

				if let Some(session) = self.store.current() {
					let notified = self
						.api
						.logout(Some(&session.access_token), session.refresh_token.as_ref())
						.await;

					if let Err(e) = notified {
						obs::trace_warning(KIND, &format!("logout call failed: {e}"));
					}
				}

				let cleared = self.store.clear();

				self.navigator.redirect_to_login(UnauthenticatedReason::LoggedOut);

				cleared
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Sends `request` through the authorizer.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		self.authorizer.send(request).await
	}

	/// `true` while a session is held, even one that is due for refresh.
	pub fn is_authenticated(&self) -> bool {
		self.store.has_session()
	}

	/// `true` while the current access token has not expired.
	pub fn is_valid(&self) -> bool {
		self.store.is_valid()
	}

	/// Profile of the signed-in user.
	pub fn current_user(&self) -> Option<SessionProfile> {
		self.store.profile()
	}

	/// Username of the signed-in user.
	pub fn username(&self) -> Option<String> {
		self.store.profile().map(|profile| profile.username)
	}

	/// Roles of the signed-in user; empty when signed out.
	pub fn roles(&self) -> BTreeSet<String> {
		self.store.profile().map(|profile| profile.roles).unwrap_or_default()
	}

	/// `true` if the signed-in user holds `role`.
	pub fn has_role(&self, role: &str) -> bool {
		self.store.profile().is_some_and(|profile| profile.has_role(role))
	}

	/// `true` if the signed-in user holds any of `roles`.
	pub fn has_any_role<'a, I>(&self, roles: I) -> bool
	where
		I: IntoIterator<Item = &'a str>,
	{
		self.store.profile().is_some_and(|profile| profile.has_any_role(roles))
	}

	/// Observes sign-in and sign-out; `None` means signed out.
	pub fn subscribe(&self) -> watch::Receiver<Option<SessionProfile>> {
		self.store.subscribe()
	}

	/// Releases every request waiting on a refresh with [`Error::Cancelled`].
	pub fn shutdown(&self) {
		self.coordinator.shutdown();
	}
}
#[cfg(feature = "reqwest")]
impl AuthClient<ReqwestHttpClient> {
	/// Creates a client with its own reqwest transport that never follows redirects.
	pub fn new(
		config: SessionConfig,
		backend: Arc<dyn KeyValueStore>,
		navigator: Arc<dyn Navigator>,
	) -> Result<Self> {
		Self::with_http_client(config, backend, ReqwestHttpClient::without_redirects()?, navigator)
	}
}
impl<C> Debug for AuthClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthClient")
			.field("config", &self.config)
			.field("store", &self.store)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}
