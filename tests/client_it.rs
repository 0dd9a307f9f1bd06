#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use common::*;
use hrdesk_session::{
	Credentials,
	client::ReqwestAuthClient,
	error::Error,
	ext::{NoopNavigator, UnauthenticatedReason},
	store::{FileStore, KeyValueStore, MemoryStore, StoreBatch, keys},
};

fn credentials() -> Credentials {
	Credentials::new("Acme", "bob", "pw")
}

#[tokio::test]
async fn login_persists_a_valid_session() {
	let server = MockServer::start_async().await;
	let h = harness(&server);
	let mut profiles = h.client.subscribe();
	let login = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/auth/login")
				.json_body(json!({ "company": "Acme", "username": "bob", "password": "pw" }));
			then.status(200).json_body(json!({
				"accessToken": "A1",
				"refreshToken": "R1",
				"tokenType": "Bearer",
				"roles": ["ROLE_HR", "ROLE_EMPLOYEE"],
				"expiresIn": 3_600_000,
			}));
		})
		.await;
	let before = OffsetDateTime::now_utc();
	let profile = h.client.login(&credentials()).await.expect("Login should succeed.");
	let after = OffsetDateTime::now_utc();

	login.assert_async().await;

	assert_eq!(profile.username, "bob");
	assert_eq!(profile.company, "Acme");
	assert!(h.client.is_authenticated());
	assert!(h.client.is_valid());
	assert!(!h.client.store().should_refresh());

	let session = h.client.store().current().expect("Login should make a session current.");

	assert!(session.expires_at >= before + Duration::milliseconds(3_600_000));
	assert!(session.expires_at <= after + Duration::milliseconds(3_600_000));
	assert_eq!(session.refresh_token.as_ref().map(|token| token.expose()), Some("R1"));

	let snapshot = h.backend.snapshot();

	assert_eq!(snapshot.get(keys::ACCESS_TOKEN).map(String::as_str), Some("A1"));
	assert_eq!(snapshot.get(keys::REFRESH_TOKEN).map(String::as_str), Some("R1"));
	assert!(snapshot.contains_key(keys::EXPIRES_AT));
	assert!(snapshot.contains_key(keys::USER));

	assert!(profiles.has_changed().expect("The session observable should stay open."));
	assert_eq!(
		profiles.borrow_and_update().as_ref().map(|profile| profile.username.clone()),
		Some("bob".into()),
	);
	assert_eq!(h.client.username().as_deref(), Some("bob"));
	assert!(h.client.has_role("ROLE_HR"));
	assert!(h.client.has_any_role(["ROLE_ADMIN", "ROLE_EMPLOYEE"]));
	assert!(!h.client.has_role("ROLE_ADMIN"));
	assert_eq!(h.client.roles().len(), 2);
}

#[tokio::test]
async fn backend_identity_wins_over_submitted_credentials() {
	let server = MockServer::start_async().await;
	let h = harness(&server);
	let _login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200).json_body(json!({
				"accessToken": "A1",
				"refreshToken": "R1",
				"tokenType": "Bearer",
				"roles": [],
				"expiresIn": 3_600_000,
				"username": "bob.smith",
				"company": "Acme Corp",
			}));
		})
		.await;
	let profile = h.client.login(&credentials()).await.expect("Login should succeed.");

	assert_eq!(profile.username, "bob.smith");
	assert_eq!(profile.company, "Acme Corp");
	assert!(h.client.roles().is_empty());
}

#[tokio::test]
async fn rejected_login_leaves_state_untouched() {
	let server = MockServer::start_async().await;
	let backend = MemoryStore::default();

	seed_session(&backend, "A0", Some("R0"), Duration::hours(1));

	let h = harness_with(config_for(&server.base_url()), backend);
	let _login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(401).body("Bad credentials");
		})
		.await;
	let err = h.client.login(&credentials()).await.expect_err("A 401 login must fail.");

	assert!(matches!(err, Error::AuthRejected { .. }), "Unexpected error: {err:?}.");
	assert_eq!(
		h.client.store().access_token().map(|token| token.expose().to_owned()),
		Some("A0".into()),
	);
	assert!(h.redirects.lock().is_empty());
}

#[tokio::test]
async fn login_rejects_non_bearer_tokens() {
	let server = MockServer::start_async().await;
	let h = harness(&server);
	let _login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200).json_body(json!({
				"accessToken": "A1",
				"tokenType": "MAC",
				"expiresIn": 3_600_000,
			}));
		})
		.await;
	let err = h.client.login(&credentials()).await.expect_err("MAC tokens are unsupported.");

	assert!(matches!(err, Error::Config(_)), "Unexpected error: {err:?}.");
	assert!(!h.client.is_authenticated());
}

#[tokio::test]
async fn logout_clears_even_when_the_backend_fails() {
	let server = MockServer::start_async().await;
	let backend = MemoryStore::default();

	seed_session(&backend, "A1", Some("R1"), Duration::hours(1));

	let h = harness_with(config_for(&server.base_url()), backend);
	let logout = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/auth/logout")
				.header("authorization", "Bearer A1")
				.json_body(json!({ "refreshToken": "R1" }));
			then.status(500);
		})
		.await;

	h.client.logout().await.expect("Logout should succeed despite the backend failure.");

	logout.assert_async().await;

	assert!(!h.client.is_authenticated());
	assert!(h.client.current_user().is_none());
	assert!(h.backend.is_empty());
	assert_eq!(*h.redirects.lock(), vec![UnauthenticatedReason::LoggedOut]);
}

#[tokio::test]
async fn logout_while_signed_out_skips_the_backend() {
	let server = MockServer::start_async().await;
	let h = harness(&server);
	let logout = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/logout");
			then.status(204);
		})
		.await;

	h.client.logout().await.expect("Logout should succeed without a session.");

	logout.assert_calls_async(0).await;

	assert_eq!(*h.redirects.lock(), vec![UnauthenticatedReason::LoggedOut]);
}

#[tokio::test]
async fn expired_and_malformed_state_is_dropped_on_startup() {
	let expired = MemoryStore::default();

	expired
		.apply(
			StoreBatch::new()
				.set(keys::ACCESS_TOKEN, "A1")
				.set(keys::REFRESH_TOKEN, "R1")
				.set(keys::EXPIRES_AT, "1000")
				.set(keys::USER, r#"{"username":"bob","company":"Acme","roles":[]}"#),
		)
		.expect("Raw seed should apply.");

	let h = harness_with(config_for("http://127.0.0.1:1"), expired);

	assert!(!h.client.is_authenticated());
	assert!(h.backend.is_empty());

	let malformed = MemoryStore::default();

	malformed
		.apply(StoreBatch::new().set(keys::ACCESS_TOKEN, "A1").set(keys::USER, "{not json"))
		.expect("Raw seed should apply.");

	let h = harness_with(config_for("http://127.0.0.1:1"), malformed);

	assert!(!h.client.is_authenticated());
	assert!(h.backend.is_empty());
}

#[tokio::test]
async fn file_backed_sessions_survive_a_restart() {
	let server = MockServer::start_async().await;
	let _login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200).json_body(json!({
				"accessToken": "A1",
				"refreshToken": "R1",
				"tokenType": "Bearer",
				"roles": ["ROLE_HR"],
				"expiresIn": 3_600_000,
			}));
		})
		.await;
	let path = std::env::temp_dir().join(format!(
		"hrdesk-session-{}-{}.json",
		std::process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos()
	));
	let open = || -> ReqwestAuthClient {
		let backend: Arc<dyn KeyValueStore> =
			Arc::new(FileStore::open(&path).expect("File store should open."));

		ReqwestAuthClient::new(config_for(&server.base_url()), backend, Arc::new(NoopNavigator))
			.expect("Client should build.")
	};
	let first = open();

	first.login(&credentials()).await.expect("Login should succeed.");

	drop(first);

	let second = open();

	assert!(second.is_authenticated());
	assert_eq!(second.username().as_deref(), Some("bob"));
	assert!(second.has_role("ROLE_HR"));

	second.logout().await.expect("Logout should succeed.");

	assert!(!open().is_authenticated());

	let _ = std::fs::remove_file(&path);
}
