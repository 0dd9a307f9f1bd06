//! Demonstrates signing in against a mock HR backend, sending an authorized request that
//! survives an expired token, and signing out again.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
// self
use hrdesk_session::{
	Credentials, SessionConfig,
	client::ReqwestAuthClient,
	ext::{Navigator, UnauthenticatedReason},
	http::empty_request,
	http_types::Method,
	store::{KeyValueStore, MemoryStore},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200).json_body(json!({
				"accessToken": "demo-access",
				"refreshToken": "demo-refresh",
				"tokenType": "Bearer",
				"roles": ["ROLE_HR"],
				"expiresIn": 900_000,
			}));
		})
		.await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/employees").header("authorization", "Bearer demo-access");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh").json_body(json!({
				"refreshToken": "demo-refresh"
			}));
			then.status(200).json_body(json!({ "accessToken": "demo-access-2", "expiresIn": 900_000 }));
		})
		.await;
	let employees = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/employees").header("authorization", "Bearer demo-access-2");
			then.status(200).json_body(json!([{ "id": 7, "name": "Ada" }]));
		})
		.await;
	let logout = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/logout");
			then.status(204);
		})
		.await;
	let config = SessionConfig::builder(Url::parse(&server.base_url())?).build()?;
	let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
	let navigator: Arc<dyn Navigator> = Arc::new(|reason: UnauthenticatedReason| {
		println!("Redirecting to the login screen ({reason}).");
	});
	let client = ReqwestAuthClient::new(config, backend, navigator)?;
	let profile = client.login(&Credentials::new("Acme", "ada", "correct horse")).await?;

	println!("Signed in as {}@{} with roles {:?}.", profile.username, profile.company, profile.roles);

	let url = client.config().resolve("/api/employees");
	let response = client.send(empty_request(Method::GET, &url)?).await?;

	println!(
		"Employees ({}): {}.",
		response.status(),
		String::from_utf8_lossy(response.body())
	);
	println!("Refresh attempts so far: {}.", client.refresh_metrics().attempts());

	client.logout().await?;

	login.assert_async().await;
	stale.assert_async().await;
	refresh.assert_async().await;
	employees.assert_async().await;
	logout.assert_async().await;

	Ok(())
}
