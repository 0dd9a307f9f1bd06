//! Singleflight access token refresh with FIFO waiters and cancellation.
//!
//! [`RefreshCoordinator`] is either idle or refreshing. The first caller that needs a new token
//! becomes the leader and performs the single `POST /api/auth/refresh`; every caller arriving
//! while that call is outstanding is parked as a waiter and resumed, in arrival order, with the
//! leader's outcome. Success rotates the token through the [`SessionStore`]; failure clears the
//! session and redirects through the [`Navigator`]. Either way the coordinator returns to idle.
//!
//! Waiters are one-shot channels, so a leader whose future is dropped mid-call releases them
//! with [`Error::Cancelled`] instead of leaving them pending.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::mem;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	api::AuthApi,
	ext::{Navigator, UnauthenticatedReason},
	http::HttpTransport,
	obs::{self, OpKind, OpOutcome, OpSpan},
	session::{AccessToken, RefreshToken, SessionStore},
};

type Settled = Result<AccessToken, RefreshFailure>;
type Waiter = oneshot::Sender<Settled>;

/// Outcome shared with every waiter of a failed refresh.
#[derive(Clone, Debug)]
enum RefreshFailure {
	Rejected(String),
	Exhausted(String),
	Cancelled,
}
impl From<RefreshFailure> for Error {
	fn from(failure: RefreshFailure) -> Self {
		match failure {
			RefreshFailure::Rejected(reason) => Error::AuthRejected { reason },
			RefreshFailure::Exhausted(reason) => Error::RefreshExhausted { reason },
			RefreshFailure::Cancelled => Error::Cancelled,
		}
	}
}

enum Ticket {
	Lead,
	Wait(oneshot::Receiver<Settled>),
}

#[derive(Debug, Default)]
struct RefreshState {
	in_flight: bool,
	closed: bool,
	waiters: VecDeque<Waiter>,
}
impl RefreshState {
	fn join(&mut self, metrics: &RefreshMetrics) -> Result<Ticket> {
		if self.closed {
			return Err(Error::Cancelled);
		}
		if self.in_flight {
			let (sender, receiver) = oneshot::channel();

			self.waiters.push_back(sender);
			metrics.record_coalesced();

			return Ok(Ticket::Wait(receiver));
		}

		self.in_flight = true;

		Ok(Ticket::Lead)
	}

	fn release(&mut self) -> VecDeque<Waiter> {
		self.in_flight = false;

		mem::take(&mut self.waiters)
	}
}

/// Returns the coordinator to idle when the leader finishes or is dropped.
struct LeaderGuard<'a> {
	state: &'a Mutex<RefreshState>,
	armed: bool,
}
impl LeaderGuard<'_> {
	fn settle(mut self, settled: &Settled) {
		self.armed = false;

		let waiters = self.state.lock().release();

		for waiter in waiters {
			let _ = waiter.send(settled.clone());
		}
	}
}
impl Drop for LeaderGuard<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let waiters = self.state.lock().release();

		for waiter in waiters {
			let _ = waiter.send(Err(RefreshFailure::Cancelled));
		}
	}
}

/// Guarantees at most one outstanding refresh call and serves queued callers in order.
pub struct RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	api: AuthApi<C>,
	store: Arc<SessionStore>,
	navigator: Arc<dyn Navigator>,
	metrics: Arc<RefreshMetrics>,
	state: Mutex<RefreshState>,
}
impl<C> RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates an idle coordinator.
	pub fn new(api: AuthApi<C>, store: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
		Self { api, store, navigator, metrics: Default::default(), state: Default::default() }
	}

	/// Session store the coordinator rotates tokens in.
	pub fn store(&self) -> &Arc<SessionStore> {
		&self.store
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// `true` while a refresh call is outstanding.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().in_flight
	}

	/// `true` once [`shutdown`](Self::shutdown) ran.
	pub fn is_shut_down(&self) -> bool {
		self.state.lock().closed
	}

	/// Number of callers parked behind the current refresh.
	pub fn waiting(&self) -> usize {
		self.state.lock().waiters.len()
	}

	/// Returns the token an outgoing request should carry.
	///
	/// `Ok(None)` when signed out. The current token is returned without suspending unless it
	/// is inside the refresh window or a refresh is already outstanding; then the caller waits
	/// for (or leads) the refresh and receives the rotated token.
	pub async fn token_for_request(&self) -> Result<Option<AccessToken>> {
		let ticket = {
			let mut state = self.state.lock();

			if !state.in_flight {
				let Some(session) = self.store.current() else {
					return Ok(None);
				};
				let now = OffsetDateTime::now_utc();

				if !session.is_near_expiry_at(self.store.refresh_window(), now) {
					return Ok(Some(session.access_token));
				}
			}

			state.join(&self.metrics)?
		};

		self.redeem(ticket).await.map(Some)
	}

	/// Refreshes the access token, joining an outstanding refresh when there is one.
	pub async fn refresh(&self) -> Result<AccessToken> {
		let ticket = self.state.lock().join(&self.metrics)?;

		self.redeem(ticket).await
	}

	/// Recovers from a 401 answered to a request that carried `stale`.
	///
	/// When the store already holds a different, still-valid token (another caller refreshed in
	/// the meantime) that token is returned without a network call.
	pub async fn refresh_after_rejection(&self, stale: &AccessToken) -> Result<AccessToken> {
		let ticket = {
			let mut state = self.state.lock();

			if !state.in_flight {
				let now = OffsetDateTime::now_utc();
				let fresher = self
					.store
					.current()
					.filter(|session| session.access_token != *stale && session.is_valid_at(now));

				if let Some(session) = fresher {
					return Ok(session.access_token);
				}
			}

			state.join(&self.metrics)?
		};

		self.redeem(ticket).await
	}

	/// Releases every waiter with [`Error::Cancelled`] and refuses later refreshes.
	///
	/// A refresh that is already on the wire still completes and updates the store.
	pub fn shutdown(&self) {
		let waiters = {
			let mut state = self.state.lock();

			state.closed = true;

			mem::take(&mut state.waiters)
		};

		for waiter in waiters {
			let _ = waiter.send(Err(RefreshFailure::Cancelled));
		}
	}

	async fn redeem(&self, ticket: Ticket) -> Result<AccessToken> {
		match ticket {
			Ticket::Lead => self.lead().await,
			Ticket::Wait(receiver) => match receiver.await {
				Ok(settled) => settled.map_err(Error::from),
				Err(_) => Err(Error::Cancelled),
			},
		}
	}

	async fn lead(&self) -> Result<AccessToken> {
		const KIND: OpKind = OpKind::Refresh;

		let guard = LeaderGuard { state: &self.state, armed: true };
		let span = OpSpan::new(KIND, "lead");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let settled = span.instrument(self.run()).await;

		match &settled {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_op_outcome(KIND, OpOutcome::Success);
			},
			Err(_) => {
				self.metrics.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);
			},
		}

		guard.settle(&settled);

		settled.map_err(Error::from)
	}

	async fn run(&self) -> Settled {
		let Some(refresh_token) = self.store.refresh_token() else {
			self.end_session(UnauthenticatedReason::Rejected, "no refresh token", None);

			return Err(RefreshFailure::Rejected("no refresh token is available".into()));
		};
		let issued = match self.api.refresh(&refresh_token).await {
			Ok(issued) => issued,
			Err(e) => {
				let reason = summarize(&e);

				self.end_session(
					UnauthenticatedReason::RefreshFailed,
					&reason,
					Some(&refresh_token),
				);

				return Err(RefreshFailure::Exhausted(reason));
			},
		};

		match self.store.compare_and_update_access_token(
			&refresh_token,
			issued.access_token.clone(),
			issued.expires_at,
		) {
			Ok(true) => Ok(issued.access_token),
			Ok(false) =>
				Err(RefreshFailure::Rejected("the session ended while refreshing".into())),
			Err(e) => {
				let reason = summarize(&e);

				self.end_session(
					UnauthenticatedReason::RefreshFailed,
					&reason,
					Some(&refresh_token),
				);

				Err(RefreshFailure::Exhausted(reason))
			},
		}
	}

	/// Clears the session the refresh was started for and redirects.
	///
	/// With `sent` set, a session that no longer holds that refresh token (a newer login) is
	/// left alone and no redirect happens; the caller still reports the failure.
	fn end_session(
		&self,
		reason: UnauthenticatedReason,
		detail: &str,
		sent: Option<&RefreshToken>,
	) {
		obs::trace_warning(OpKind::Refresh, detail);

		let cleared = match sent {
			Some(token) => self.store.clear_if(token),
			None => self.store.clear().map(|_| true),
		};

		match cleared {
			Ok(false) => {
				obs::trace_warning(OpKind::Refresh, "session replaced while refreshing; kept");

				return;
			},
			Ok(true) => (),
			// The in-memory session is gone even when the backend fails.
			Err(e) => obs::trace_warning(OpKind::Refresh, &summarize(&e)),
		}

		self.navigator.redirect_to_login(reason);
	}
}
impl<C> Debug for RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("in_flight", &state.in_flight)
			.field("closed", &state.closed)
			.field("waiters", &state.waiters.len())
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn summarize(e: &Error) -> String {
	e.to_string().trim_end_matches('.').to_owned()
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use ::http::StatusCode;
	use tokio::sync::Semaphore;
	// self
	use super::*;
	use crate::{
		config::SessionConfig,
		error::TransportError,
		http::{HttpRequest, HttpResponse, TransportFuture},
		session::{Session, SessionProfile},
		store::MemoryStore,
	};

	enum Reply {
		Token(&'static str),
		Status(StatusCode),
		Unreachable,
	}

	struct Scripted {
		calls: AtomicUsize,
		gate: Semaphore,
		reply: Reply,
	}
	impl Scripted {
		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		fn open(&self) {
			self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
		}
	}
	impl HttpTransport for Scripted {
		fn send(&self, _: HttpRequest) -> TransportFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				let _permit = self.gate.acquire().await.map_err(TransportError::network)?;
				let (status, body) = match self.reply {
					Reply::Token(token) => (
						StatusCode::OK,
						format!(
							r#"{{"accessToken":"{token}","tokenType":"Bearer","expiresIn":3600000}}"#
						),
					),
					Reply::Status(status) => (status, String::new()),
					Reply::Unreachable =>
						return Err(TransportError::Io(std::io::Error::other("unreachable"))),
				};
				let mut response = HttpResponse::new(body.into_bytes());

				*response.status_mut() = status;

				Ok(response)
			})
		}
	}

	struct Fixture {
		coordinator: Arc<RefreshCoordinator<Scripted>>,
		transport: Arc<Scripted>,
		redirects: Arc<Mutex<Vec<UnauthenticatedReason>>>,
	}
	impl Fixture {
		fn new(reply: Reply, refresh_token: Option<&str>, lifetime: Duration) -> Self {
			let config = SessionConfig::builder(
				Url::parse("https://hr.example.com").expect("Failed to parse base URL."),
			)
			.build()
			.expect("Default config should validate.");
			let transport =
				Arc::new(Scripted { calls: AtomicUsize::new(0), gate: Semaphore::new(0), reply });
			let store = Arc::new(
				SessionStore::open(Arc::new(MemoryStore::default()))
					.expect("Memory-backed store should open."),
			);
			let mut builder = Session::builder(SessionProfile::new("bob", "Acme", ["ROLE_HR"]))
				.access_token("A1")
				.expires_in(lifetime);

			if let Some(token) = refresh_token {
				builder = builder.refresh_token(token);
			}

			store.save(builder.build().expect("Session fixture should build.")).expect("Save.");

			let redirects = Arc::new(Mutex::new(Vec::new()));
			let navigator: Arc<dyn Navigator> = {
				let redirects = redirects.clone();

				Arc::new(move |reason: UnauthenticatedReason| redirects.lock().push(reason))
			};
			let api = AuthApi::new(Arc::new(config), transport.clone());
			let coordinator = Arc::new(RefreshCoordinator::new(api, store, navigator));

			Self { coordinator, transport, redirects }
		}

		fn spawn_requests(&self, n: usize) -> Vec<tokio::task::JoinHandle<Result<AccessToken>>> {
			(0..n)
				.map(|_| {
					let coordinator = self.coordinator.clone();

					tokio::spawn(async move {
						coordinator.token_for_request().await.map(|token| {
							token.expect("A signed-in store should always yield a token.")
						})
					})
				})
				.collect()
		}
	}

	async fn settle_until(mut condition: impl FnMut() -> bool) {
		for _ in 0..400 {
			if condition() {
				return;
			}

			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		}

		panic!("Condition was not reached in time.");
	}

	#[tokio::test]
	async fn fresh_tokens_skip_the_network() {
		let fx = Fixture::new(Reply::Token("A2"), Some("R1"), Duration::hours(1));
		let token = fx.coordinator.token_for_request().await.expect("Fresh tokens are reused.");

		assert_eq!(token.as_ref().map(AccessToken::expose), Some("A1"));
		assert_eq!(fx.transport.calls(), 0);

		fx.coordinator.store().clear().expect("Clearing should succeed.");

		assert!(
			fx.coordinator.token_for_request().await.expect("Signed out is not an error.").is_none()
		);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_refresh() {
		let fx = Fixture::new(Reply::Token("A2"), Some("R1"), Duration::milliseconds(120_000));
		let tasks = fx.spawn_requests(5);

		settle_until(|| fx.coordinator.waiting() == 4).await;

		assert!(fx.coordinator.is_refreshing());

		fx.transport.open();

		for task in tasks {
			let token =
				task.await.expect("Task should not panic.").expect("Refresh should succeed.");

			assert_eq!(token.expose(), "A2");
		}

		let store = fx.coordinator.store();

		assert_eq!(fx.transport.calls(), 1);
		assert!(!fx.coordinator.is_refreshing());
		assert_eq!(fx.coordinator.metrics().attempts(), 1);
		assert_eq!(fx.coordinator.metrics().coalesced(), 4);
		assert_eq!(store.access_token().as_ref().map(AccessToken::expose), Some("A2"));
		assert_eq!(store.refresh_token().map(|token| token.expose().to_owned()), Some("R1".into()));
		assert!(!store.should_refresh());
	}

	#[tokio::test]
	async fn failed_refresh_clears_and_fails_every_waiter() {
		let fx = Fixture::new(Reply::Unreachable, Some("R1"), Duration::milliseconds(120_000));
		let tasks = fx.spawn_requests(3);

		settle_until(|| fx.coordinator.waiting() == 2).await;
		fx.transport.open();

		for task in tasks {
			let err = task.await.expect("Task should not panic.").expect_err("Refresh must fail.");

			assert!(matches!(err, Error::RefreshExhausted { .. }), "Unexpected error: {err:?}.");
		}

		assert_eq!(fx.transport.calls(), 1);
		assert!(!fx.coordinator.store().has_session());
		assert_eq!(*fx.redirects.lock(), vec![UnauthenticatedReason::RefreshFailed]);
		assert_eq!(fx.coordinator.metrics().failures(), 1);
		assert!(!fx.coordinator.is_refreshing());
	}

	#[tokio::test]
	async fn rejected_refresh_is_exhausted_too() {
		let fx = Fixture::new(
			Reply::Status(StatusCode::UNAUTHORIZED),
			Some("R1"),
			Duration::milliseconds(120_000),
		);

		fx.transport.open();

		let err = fx.coordinator.refresh().await.expect_err("401 from refresh must fail.");

		assert!(err.is_unauthenticated());
		assert!(!fx.coordinator.store().has_session());
	}

	#[tokio::test]
	async fn missing_refresh_token_fails_without_a_call() {
		let fx = Fixture::new(Reply::Token("A2"), None, Duration::milliseconds(120_000));
		let err = fx.coordinator.refresh().await.expect_err("Refresh needs a refresh token.");

		assert!(matches!(err, Error::AuthRejected { .. }));
		assert_eq!(fx.transport.calls(), 0);
		assert!(!fx.coordinator.store().has_session());
		assert_eq!(*fx.redirects.lock(), vec![UnauthenticatedReason::Rejected]);
	}

	#[tokio::test]
	async fn shutdown_releases_waiters_and_refuses_new_refreshes() {
		let fx = Fixture::new(Reply::Token("A2"), Some("R1"), Duration::milliseconds(120_000));
		let tasks = fx.spawn_requests(3);

		settle_until(|| fx.coordinator.waiting() == 2).await;
		fx.coordinator.shutdown();
		fx.transport.open();

		let mut rotated = 0;
		let mut cancelled = 0;

		for task in tasks {
			match task.await.expect("Task should not panic.") {
				Ok(token) if token.expose() == "A2" => rotated += 1,
				Err(Error::Cancelled) => cancelled += 1,
				other => panic!("Unexpected outcome: {other:?}."),
			}
		}

		assert_eq!((rotated, cancelled), (1, 2));
		assert!(fx.coordinator.is_shut_down());
		assert!(matches!(fx.coordinator.refresh().await, Err(Error::Cancelled)));
	}

	#[tokio::test]
	async fn dropped_leader_releases_waiters() {
		let fx = Fixture::new(Reply::Token("A2"), Some("R1"), Duration::milliseconds(120_000));
		let leader = {
			let coordinator = fx.coordinator.clone();

			tokio::spawn(async move { coordinator.refresh().await })
		};

		settle_until(|| fx.coordinator.is_refreshing()).await;

		let waiters = fx.spawn_requests(2);

		settle_until(|| fx.coordinator.waiting() == 2).await;
		leader.abort();

		for task in waiters {
			let outcome = task.await.expect("Task should not panic.");

			assert!(matches!(outcome, Err(Error::Cancelled)), "Unexpected outcome: {outcome:?}.");
		}

		assert!(!fx.coordinator.is_refreshing());

		fx.transport.open();

		let token = fx.coordinator.refresh().await.expect("The coordinator should be reusable.");

		assert_eq!(token.expose(), "A2");
		assert_eq!(fx.transport.calls(), 2);
	}

	#[tokio::test]
	async fn late_failure_keeps_a_newer_login() {
		let fx = Fixture::new(Reply::Unreachable, Some("R1"), Duration::milliseconds(120_000));
		let leader = {
			let coordinator = fx.coordinator.clone();

			tokio::spawn(async move { coordinator.refresh().await })
		};

		settle_until(|| fx.transport.calls() == 1).await;

		let newer = Session::builder(SessionProfile::new("alice", "Acme", ["ROLE_ADMIN"]))
			.access_token("B1")
			.refresh_token("R2")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Session fixture should build.");

		fx.coordinator.store().save(newer).expect("A newer login should save.");
		fx.transport.open();

		let err = leader
			.await
			.expect("Task should not panic.")
			.expect_err("The stale refresh still fails for its callers.");

		assert!(matches!(err, Error::RefreshExhausted { .. }), "Unexpected error: {err:?}.");

		let store = fx.coordinator.store();

		assert_eq!(store.access_token().as_ref().map(AccessToken::expose), Some("B1"));
		assert_eq!(store.profile().map(|profile| profile.username), Some("alice".into()));
		assert!(fx.redirects.lock().is_empty());
		assert!(!fx.coordinator.is_refreshing());
	}

	#[tokio::test]
	async fn rejection_recovery_reuses_a_newer_token() {
		let fx = Fixture::new(Reply::Token("A2"), Some("R1"), Duration::hours(1));

		fx.transport.open();

		let token = fx
			.coordinator
			.refresh_after_rejection(&AccessToken::new("A0"))
			.await
			.expect("A newer stored token should be reused.");

		assert_eq!(token.expose(), "A1");
		assert_eq!(fx.transport.calls(), 0);

		let token = fx
			.coordinator
			.refresh_after_rejection(&AccessToken::new("A1"))
			.await
			.expect("A rejected current token should be refreshed.");

		assert_eq!(token.expose(), "A2");
		assert_eq!(fx.transport.calls(), 1);
	}
}
