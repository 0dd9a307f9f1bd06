//! Owner of the current session: persistence, restoration, expiry checks, and change
//! notifications.

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	obs::{self, SessionEvent},
	session::{AccessToken, RefreshToken, Session, SessionProfile},
	store::{KeyValueStore, StoreBatch, StoreError, keys},
};

/// Outcome of reading the persisted keys.
enum Persisted {
	Empty,
	Found(Session),
	Malformed(&'static str),
}

/// Exclusive owner of the current [`Session`].
///
/// Every mutation is written through to the [`KeyValueStore`] as a single [`StoreBatch`] while
/// the in-memory write lock is held, so readers see either the old session or the new one and
/// never a mix. The lock is synchronous and is never held across an `.await`.
pub struct SessionStore {
	backend: Arc<dyn KeyValueStore>,
	current: RwLock<Option<Session>>,
	observers: watch::Sender<Option<SessionProfile>>,
	refresh_window: Duration,
}
impl SessionStore {
	/// Lead time before expiry at which a proactive refresh is due.
	pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::minutes(5);

	/// Opens the store with the default refresh window and restores any persisted session.
	pub fn open(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
		Self::with_refresh_window(backend, Self::DEFAULT_REFRESH_WINDOW)
	}

	/// Opens the store with a custom refresh window and restores any persisted session.
	pub fn with_refresh_window(backend: Arc<dyn KeyValueStore>, window: Duration) -> Result<Self> {
		let (observers, _) = watch::channel(None);
		let store = Self {
			backend,
			current: RwLock::new(None),
			observers,
			refresh_window: if window.is_negative() { Duration::ZERO } else { window },
		};

		store.load()?;

		Ok(store)
	}

	/// Persists `session` and makes it current.
	pub fn save(&self, session: Session) -> Result<()> {
		let batch = Self::session_batch(&session)?;
		let profile = session.profile.clone();
		let mut current = self.current.write();

		self.backend.apply(batch)?;

		*current = Some(session);
		self.observers.send_replace(Some(profile));

		drop(current);

		Self::record(SessionEvent::Saved, "login");

		Ok(())
	}

	/// Rotates the access token of the current session in place.
	///
	/// Returns `Ok(false)` without touching storage when no session exists; callers treat that
	/// as the session having ended while they were waiting.
	pub fn update_access_token(
		&self,
		token: AccessToken,
		expires_at: OffsetDateTime,
	) -> Result<bool> {
		self.rotate_if(|_| true, token, expires_at)
	}

	/// Rotates the access token only while the current session still holds `expected` as its
	/// refresh token.
	///
	/// Returns `Ok(false)` when the session was cleared or replaced since `expected` was read,
	/// so a late refresh response can never overwrite a newer login.
	pub fn compare_and_update_access_token(
		&self,
		expected: &RefreshToken,
		token: AccessToken,
		expires_at: OffsetDateTime,
	) -> Result<bool> {
		self.rotate_if(
			|session| session.refresh_token.as_ref() == Some(expected),
			token,
			expires_at,
		)
	}

	fn rotate_if<F>(
		&self,
		matches: F,
		token: AccessToken,
		expires_at: OffsetDateTime,
	) -> Result<bool>
	where
		F: FnOnce(&Session) -> bool,
	{
		let mut current = self.current.write();
		let Some(session) = current.as_mut().filter(|session| matches(session)) else {
			obs::trace_warning(obs::OpKind::Refresh, "no matching session for token rotation");

			return Ok(false);
		};
		let batch = StoreBatch::new()
			.set(keys::ACCESS_TOKEN, token.expose())
			.set(keys::EXPIRES_AT, encode_instant(expires_at));

		self.backend.apply(batch)?;
		session.rotate(token, expires_at);

		drop(current);

		Self::record(SessionEvent::Refreshed, "access token rotated");

		Ok(true)
	}

	/// Restores the persisted session using the current clock.
	pub fn load(&self) -> Result<Option<Session>> {
		self.load_at(OffsetDateTime::now_utc())
	}

	/// Restores the persisted session as of `now`.
	///
	/// Expired or malformed state is cleared and reported as no session.
	pub fn load_at(&self, now: OffsetDateTime) -> Result<Option<Session>> {
		match self.read_persisted()? {
			Persisted::Empty => {
				let mut current = self.current.write();

				*current = None;
				self.observers.send_replace(None);

				Ok(None)
			},
			Persisted::Malformed(detail) => {
				Self::record(SessionEvent::Malformed, detail);
				self.clear()?;

				Ok(None)
			},
			Persisted::Found(session) if !session.is_valid_at(now) => {
				Self::record(SessionEvent::Expired, "persisted session already expired");
				self.clear()?;

				Ok(None)
			},
			Persisted::Found(session) => {
				let profile = session.profile.clone();
				let mut current = self.current.write();

				*current = Some(session.clone());
				self.observers.send_replace(Some(profile));

				drop(current);

				Self::record(SessionEvent::Restored, "persisted session restored");

				Ok(Some(session))
			},
		}
	}

	/// Removes every persisted field and resets the current session.
	///
	/// The in-memory session is dropped even if the backend fails; the backend error is still
	/// returned.
	pub fn clear(&self) -> Result<()> {
		self.clear_where(|_| true).map(|_| ())
	}

	/// Clears the session only while it still holds `expected` as its refresh token.
	///
	/// Returns `Ok(false)` without touching storage when the session was cleared or replaced
	/// since `expected` was read, so a late refresh failure never ends a newer login.
	pub fn clear_if(&self, expected: &RefreshToken) -> Result<bool> {
		self.clear_where(|current| {
			current.is_some_and(|session| session.refresh_token.as_ref() == Some(expected))
		})
	}

	fn clear_where<F>(&self, matches: F) -> Result<bool>
	where
		F: FnOnce(Option<&Session>) -> bool,
	{
		let mut current = self.current.write();

		if !matches(current.as_ref()) {
			obs::trace_warning(obs::OpKind::Refresh, "no matching session to clear");

			return Ok(false);
		}

		let batch = keys::ALL.into_iter().fold(StoreBatch::new(), StoreBatch::remove);
		let persisted = self.backend.apply(batch);

		*current = None;
		self.observers.send_replace(None);

		drop(current);

		Self::record(SessionEvent::Cleared, "session cleared");

		persisted.map(|_| true).map_err(Error::from)
	}

	/// `true` iff a token exists and has not expired.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// [`is_valid`](Self::is_valid) evaluated at `now`.
	pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		self.current.read().as_ref().is_some_and(|session| session.is_valid_at(now))
	}

	/// `true` iff a token exists and `now` is past `expires_at - window`.
	pub fn near_expiry(&self, window: Duration) -> bool {
		self.near_expiry_at(window, OffsetDateTime::now_utc())
	}

	/// [`near_expiry`](Self::near_expiry) evaluated at `now`.
	pub fn near_expiry_at(&self, window: Duration, now: OffsetDateTime) -> bool {
		self.current.read().as_ref().is_some_and(|session| session.is_near_expiry_at(window, now))
	}

	/// [`near_expiry`](Self::near_expiry) with the configured refresh window.
	pub fn should_refresh(&self) -> bool {
		self.near_expiry(self.refresh_window)
	}

	/// Configured refresh window.
	pub fn refresh_window(&self) -> Duration {
		self.refresh_window
	}

	/// `true` while a session (token + profile) is held.
	pub fn has_session(&self) -> bool {
		self.current.read().is_some()
	}

	/// Snapshot of the current session.
	pub fn current(&self) -> Option<Session> {
		self.current.read().clone()
	}

	/// Profile of the current session.
	pub fn profile(&self) -> Option<SessionProfile> {
		self.current.read().as_ref().map(|session| session.profile.clone())
	}

	/// Current access token.
	pub fn access_token(&self) -> Option<AccessToken> {
		self.current.read().as_ref().map(|session| session.access_token.clone())
	}

	/// Current refresh token.
	pub fn refresh_token(&self) -> Option<RefreshToken> {
		self.current.read().as_ref().and_then(|session| session.refresh_token.clone())
	}

	/// Subscribes to profile changes; `None` means signed out.
	pub fn subscribe(&self) -> watch::Receiver<Option<SessionProfile>> {
		self.observers.subscribe()
	}

	fn read_persisted(&self) -> Result<Persisted, StoreError> {
		let token = self.backend.get(keys::ACCESS_TOKEN)?.filter(|token| !token.trim().is_empty());
		let refresh = self.backend.get(keys::REFRESH_TOKEN)?;
		let expires = self.backend.get(keys::EXPIRES_AT)?;
		let user = self.backend.get(keys::USER)?;
		let Some(token) = token else {
			if refresh.is_some() || expires.is_some() || user.is_some() {
				return Ok(Persisted::Malformed("session fields present without an access token"));
			}

			return Ok(Persisted::Empty);
		};
		let Some(expires) = expires else {
			return Ok(Persisted::Malformed("access token present without an expiry"));
		};
		let Some(expires_at) = decode_instant(&expires) else {
			return Ok(Persisted::Malformed("expiry is not a millisecond timestamp"));
		};
		let Some(user) = user else {
			return Ok(Persisted::Malformed("access token present without a user profile"));
		};
		let Ok(profile) = serde_json::from_str::<SessionProfile>(&user) else {
			return Ok(Persisted::Malformed("user profile is not valid JSON"));
		};

		Ok(Persisted::Found(Session {
			profile,
			access_token: AccessToken::new(token),
			refresh_token: refresh.filter(|value| !value.trim().is_empty()).map(RefreshToken::new),
			expires_at,
		}))
	}

	fn session_batch(session: &Session) -> Result<StoreBatch, StoreError> {
		let user = serde_json::to_string(&session.profile).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to encode user profile: {e}") }
		})?;
		let batch = StoreBatch::new()
			.set(keys::ACCESS_TOKEN, session.access_token.expose())
			.set(keys::EXPIRES_AT, encode_instant(session.expires_at))
			.set(keys::USER, user);

		Ok(match &session.refresh_token {
			Some(refresh) => batch.set(keys::REFRESH_TOKEN, refresh.expose()),
			None => batch.remove(keys::REFRESH_TOKEN),
		})
	}

	fn record(event: SessionEvent, detail: &str) {
		obs::trace_session_event(event, detail);
		obs::record_session_event(event);
	}
}
impl Debug for SessionStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionStore")
			.field("current", &*self.current.read())
			.field("refresh_window", &self.refresh_window)
			.finish()
	}
}

/// Unix epoch milliseconds, the persisted expiry format.
pub(crate) fn encode_instant(instant: OffsetDateTime) -> String {
	(instant.unix_timestamp_nanos() / 1_000_000).to_string()
}

pub(crate) fn decode_instant(raw: &str) -> Option<OffsetDateTime> {
	let millis = raw.trim().parse::<i64>().ok()?;

	OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}
