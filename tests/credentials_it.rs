#![cfg(feature = "test")]

// std
use std::time::{Duration as StdDuration, Instant};
// crates.io
use httpmock::prelude::*;
// self
use firechannel::{
	_preludet::*,
	credentials::{self, Credentials, KeySource},
	error::{ConfigError, TransportError},
	http::Timeouts,
};

fn token_uri(server: &MockServer) -> Url {
	Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully.")
}

#[tokio::test]
async fn service_accounts_exchange_jwt_bearer_assertions() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer")
				.body_includes("assertion=");
			then.status(200).json_body(token_body("sa-token", 3600));
		})
		.await;
	let credentials = fixture_credentials_at(token_uri(&server));

	assert!(!credentials.valid());

	let token = credentials.ensure_fresh().await.expect("Token exchange should succeed.");

	assert_eq!(token.expose(), "sa-token");
	assert!(credentials.valid());
	assert!(!format!("{credentials:?}").contains("sa-token"));

	mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_hit_the_token_endpoint_once() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.json_body(token_body("shared-token", 3600))
				.delay(StdDuration::from_millis(100));
		})
		.await;
	let credentials = Arc::new(fixture_credentials_at(token_uri(&server)));
	let handles = (0..8)
		.map(|_| {
			let credentials = credentials.clone();

			tokio::spawn(async move { credentials.ensure_fresh().await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let token = handle
			.await
			.expect("Refresh task should not panic.")
			.expect("Concurrent refresh should succeed.");

		assert_eq!(token.expose(), "shared-token");
	}

	mock.assert_calls_async(1).await;

	assert_eq!(credentials.metrics().attempts(), 1);
	assert_eq!(credentials.metrics().successes(), 1);
}

#[tokio::test]
async fn rejected_refreshes_leave_the_cache_untouched() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400).body("{\"error\":\"invalid_grant\"}");
		})
		.await;

	let credentials = fixture_credentials_at(token_uri(&server));
	let err = credentials.ensure_fresh().await.expect_err("invalid_grant should fail.");

	assert!(matches!(err, Error::BadRequest { status: 400, ref body } if body.contains("invalid_grant")));
	assert!(credentials.cached_token().is_none());
	assert_eq!(credentials.metrics().failures(), 1);
}

#[tokio::test]
async fn hung_token_endpoints_time_out_and_release_the_guard() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.json_body(token_body("late-token", 3600))
				.delay(StdDuration::from_secs(3));
		})
		.await;
	let credentials = fixture_credentials_at(token_uri(&server))
		.with_timeouts(Timeouts::new(StdDuration::from_millis(100), StdDuration::from_millis(100)))
		.expect("Credential session should build.");
	let started = Instant::now();

	for _ in 0..2 {
		let err = credentials.ensure_fresh().await.expect_err("A hung endpoint should time out.");

		assert!(matches!(err, Error::Transport(TransportError::Timeout { .. })), "{err:?}");
	}

	assert!(started.elapsed() < StdDuration::from_secs(3));
	assert!(credentials.cached_token().is_none());
	assert_eq!(credentials.metrics().failures(), 2);

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn malformed_token_responses_are_decode_errors() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).json_body(serde_json::json!({ "access_token": "x" }));
		})
		.await;

	let credentials = fixture_credentials_at(token_uri(&server));
	let err = credentials.ensure_fresh().await.expect_err("Missing expiry should fail.");

	assert!(matches!(err, Error::Decode(_)));
}

#[tokio::test]
async fn key_file_sources_fail_eagerly() {
	let err = credentials::get_credentials(KeySource::KeyFile(fixture_path("missing.json")))
		.await
		.expect_err("Missing key file should fail.");

	assert!(matches!(err, Error::Config(ConfigError::KeyFile { .. })));
	assert!(!err.is_recoverable());

	let err = credentials::get_credentials(KeySource::KeyFile(fixture_path("authorized_user.json")))
		.await
		.expect_err("User credentials cannot sign.");

	assert!(matches!(err, Error::Config(ConfigError::SigningUnsupported { .. })));

	let credentials: Credentials =
		credentials::get_credentials(KeySource::KeyFile(fixture_path("service_account.json")))
			.await
			.expect("Service account key file should load.");

	assert_eq!(credentials.signer_identity(), FIXTURE_SIGNER);
}
