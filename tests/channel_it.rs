#![cfg(feature = "test")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use firechannel::{
	_preludet::*,
	channel::{self, ChannelError, ChannelId, Channels, DEFAULT_DURATION_MINUTES},
	rest::{ClientConfig, RestClient},
	token,
};

async fn channels_for(server: &MockServer) -> Channels {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).json_body(token_body("db-token", 3600));
		})
		.await;

	let token_uri =
		Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully.");
	let base = Url::parse(&server.url("/db/")).expect("Mock database URL should parse.");
	let config = ClientConfig::with_base_url(base).expect("Mock database URL should be a root.");
	let client = RestClient::new(Arc::new(fixture_credentials_at(token_uri)), config);

	Channels::new(Arc::new(client))
}

fn now_millis() -> i64 {
	(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[tokio::test]
async fn create_channel_clears_stale_data_and_mints_a_token() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;
	let delete = server
		.mock_async(|when, then| {
			when.method(DELETE)
				.path("/db/firechannels/player-1.json")
				.header("authorization", "Bearer db-token");
			then.status(200).body("null");
		})
		.await;
	let id = ChannelId::new("player-1").expect("Client id should be valid.");
	let open = channels
		.create_channel(Some(id.clone()), DEFAULT_DURATION_MINUTES)
		.await
		.expect("Channel should open.");

	delete.assert_async().await;

	assert_eq!(open.id, id);

	let claims = token::decode_token(channels.client().credentials(), &open.token, true)
		.await
		.expect("Channel token should verify.");

	assert_eq!(claims["uid"], "player-1");
	assert_eq!(claims["iss"], FIXTURE_SIGNER);
	assert_eq!(
		claims["exp"].as_i64().expect("exp should be an integer.")
			- claims["iat"].as_i64().expect("iat should be an integer."),
		i64::from(DEFAULT_DURATION_MINUTES) * 60
	);
	assert_eq!(channels.decode_client_id(&open.token).expect("uid should decode."), id);
}

#[tokio::test]
async fn anonymous_channels_get_generated_ids() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;
	let delete = server
		.mock_async(|when, then| {
			when.method(DELETE);
			then.status(200).body("null");
		})
		.await;
	let open = channels.create_channel(None, 5).await.expect("Anonymous channel should open.");

	delete.assert_async().await;

	assert_eq!(open.id.as_str().len(), 32);
	assert_eq!(channel::decode_client_id(&open.token).expect("uid should decode."), open.id);
}

#[tokio::test]
async fn out_of_range_durations_send_nothing() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;
	let any = server
		.mock_async(|when, then| {
			when.method(DELETE);
			then.status(200);
		})
		.await;

	for minutes in [0, 1_441] {
		let err = channels
			.create_channel(Some(ChannelId::new("x").expect("Client id should be valid.")), minutes)
			.await
			.expect_err("Duration should be rejected.");

		assert!(matches!(err, Error::Channel(ChannelError::InvalidDuration { minutes: m }) if m == minutes));
	}

	any.assert_calls_async(0).await;
}

#[tokio::test]
async fn send_message_patches_message_and_timestamp() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;
	let patch = server
		.mock_async(|when, then| {
			when.method(PATCH)
				.path("/db/firechannels/room_7.json")
				.body_includes("\"message\":\"{\\\"kind\\\":\\\"ping\\\"}\"")
				.body_includes("\"timestamp\":");
			then.status(200).json_body(json!({ "message": "ignored" }));
		})
		.await;

	channels
		.send_message("room_7", r#"{"kind":"ping"}"#)
		.await
		.expect("Message should be sent.");

	patch.assert_async().await;
}

#[tokio::test]
async fn tokens_address_their_channel() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;

	server
		.mock_async(|when, then| {
			when.method(DELETE).path("/db/firechannels/by-token.json");
			then.status(200).body("null");
		})
		.await;

	let patch = server
		.mock_async(|when, then| {
			when.method(PATCH).path("/db/firechannels/by-token.json");
			then.status(200).body("{}");
		})
		.await;
	let open = channels
		.create_channel(Some(ChannelId::new("by-token").expect("Client id should be valid.")), 10)
		.await
		.expect("Channel should open.");

	channels.send_message(&open.token, "hello").await.expect("Message should be sent.");
	channels.delete_channel(&open.token).await.expect("Channel should be deleted.");

	patch.assert_async().await;
}

#[tokio::test]
async fn invalid_targets_never_reach_the_server() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;
	let any = server
		.mock_async(|when, then| {
			when.path_includes("firechannels");
			then.status(200);
		})
		.await;
	let err = channels.send_message("no spaces", "hi").await.expect_err("Id should be rejected.");

	assert!(matches!(err, Error::Channel(ChannelError::InvalidClientId { .. })));

	let err = channels.delete_channel("a".repeat(65).as_str()).await.expect_err("Too long.");

	assert!(matches!(err, Error::Channel(ChannelError::InvalidClientId { .. })));

	any.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_channels_are_found_by_age() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;
	let now = now_millis();

	server
		.mock_async(|when, then| {
			when.method(GET).path("/db/firechannels.json");
			then.status(200).json_body(json!({
				"active": { "message": "m", "timestamp": now },
				"idle": { "message": "m", "timestamp": now - 2 * 3_600_000 },
				"half-written": { "message": "m" },
			}));
		})
		.await;

	let mut expired = channels
		.find_expired_channels(Duration::hours(1))
		.await
		.expect("Expired channels should be listed.");

	expired.sort();

	assert_eq!(expired, ["half-written", "idle"]);
}

#[tokio::test]
async fn an_empty_tree_has_no_expired_channels() {
	let server = MockServer::start_async().await;
	let channels = channels_for(&server).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/db/firechannels.json");
			then.status(200).body("null");
		})
		.await;

	assert!(
		channels
			.find_expired_channels(Duration::minutes(1))
			.await
			.expect("Empty tree should be fine.")
			.is_empty()
	);
}
