//! Shared fixtures for the reqwest-backed integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::MockServer;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use hrdesk_session::{
	Session, SessionConfig, SessionProfile, SessionStore,
	client::ReqwestAuthClient,
	ext::{Navigator, UnauthenticatedReason},
	http::HttpRequest,
	http_types::{Method, Request},
	store::{KeyValueStore, MemoryStore},
	url::Url,
};

/// Redirect reasons recorded by the test navigator.
pub type Redirects = Arc<Mutex<Vec<UnauthenticatedReason>>>;

/// Client under test plus the handles needed to inspect it.
pub struct Harness {
	pub client: Arc<ReqwestAuthClient>,
	pub backend: MemoryStore,
	pub redirects: Redirects,
}

pub fn config_for(base_url: &str) -> SessionConfig {
	SessionConfig::builder(Url::parse(base_url).expect("Test base URL should parse."))
		.build()
		.expect("Test config should validate.")
}

pub fn harness(server: &MockServer) -> Harness {
	harness_with(config_for(&server.base_url()), MemoryStore::default())
}

pub fn harness_with(config: SessionConfig, backend: MemoryStore) -> Harness {
	let redirects = Redirects::default();
	let navigator: Arc<dyn Navigator> = {
		let redirects = redirects.clone();

		Arc::new(move |reason: UnauthenticatedReason| redirects.lock().push(reason))
	};
	let persisted: Arc<dyn KeyValueStore> = Arc::new(backend.clone());
	let client = ReqwestAuthClient::new(config, persisted, navigator)
		.expect("Reqwest-backed client should build.");

	Harness { client: Arc::new(client), backend, redirects }
}

/// Persists a `bob@Acme` session the way a previous run would have left it.
pub fn seed_session(
	backend: &MemoryStore,
	access: &str,
	refresh: Option<&str>,
	lifetime: Duration,
) {
	let store = SessionStore::open(Arc::new(backend.clone())).expect("Seed store should open.");
	let mut builder = Session::builder(SessionProfile::new("bob", "Acme", ["ROLE_HR"]))
		.access_token(access)
		.expires_at(OffsetDateTime::now_utc() + lifetime);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	store.save(builder.build().expect("Seed session should build.")).expect("Seed should save.");
}

pub fn get(url: impl AsRef<str>) -> HttpRequest {
	Request::builder()
		.method(Method::GET)
		.uri(url.as_ref())
		.body(Vec::new())
		.expect("Test request should build.")
}

pub fn post(url: impl AsRef<str>, body: &str) -> HttpRequest {
	Request::builder()
		.method(Method::POST)
		.uri(url.as_ref())
		.header("content-type", "application/json")
		.body(body.as_bytes().to_vec())
		.expect("Test request should build.")
}

/// Polls `condition` until it holds, failing the test after roughly two seconds.
pub async fn settle_until(mut condition: impl FnMut() -> bool) {
	for _ in 0..400 {
		if condition() {
			return;
		}

		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
	}

	panic!("Condition was not reached in time.");
}
