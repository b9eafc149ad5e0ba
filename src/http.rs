//! Transport primitives shared by the REST client and the credential sources.
//!
//! Every outbound request in the crate goes through a [`ReqwestClient`] built by
//! [`build_session`], and every response is funneled through [`read_json`] or
//! [`read_optional_json`] so statuses are classified into the same [`Error`] taxonomy
//! regardless of which service answered.

// std
use std::time::Duration as StdDuration;
// crates.io
use reqwest::Response;
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, error::ConfigError};

/// Connect and read deadlines applied to every pooled session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
	/// Deadline for establishing the TCP/TLS connection.
	pub connect: StdDuration,
	/// Longest wait for any single read once connected; a response that keeps streaming is
	/// never cut off by it.
	pub read: StdDuration,
}
impl Timeouts {
	/// Default connect deadline.
	pub const DEFAULT_CONNECT: StdDuration = StdDuration::from_millis(3_050);
	/// Default read deadline.
	pub const DEFAULT_READ: StdDuration = StdDuration::from_secs(15);

	/// Creates a deadline pair.
	pub fn new(connect: StdDuration, read: StdDuration) -> Self {
		Self { connect, read }
	}
}
impl Default for Timeouts {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CONNECT, Self::DEFAULT_READ)
	}
}

/// Builds a keep-alive HTTP session honoring `timeouts`.
///
/// Redirects are disabled: the database and token endpoints answer directly, and a
/// redirect would strip the bearer header anyway.
pub fn build_session(timeouts: Timeouts) -> Result<ReqwestClient> {
	ReqwestClient::builder()
		.connect_timeout(timeouts.connect)
		.read_timeout(timeouts.read)
		.redirect(reqwest::redirect::Policy::none())
		.build()
		.map_err(|e| ConfigError::http_client_build(e).into())
}

/// Classifies `response` and decodes its body as `T`.
pub(crate) async fn read_json<T>(response: Response) -> Result<T>
where
	T: DeserializeOwned,
{
	let body = read_body(response).await?;

	parse_json(&body)
}

/// Classifies `response`, returning `None` for an empty body or a JSON `null`.
pub(crate) async fn read_optional_json(response: Response) -> Result<Option<Value>> {
	let body = read_body(response).await?;

	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(None);
	}

	match parse_json(&body)? {
		Value::Null => Ok(None),
		value => Ok(Some(value)),
	}
}

/// Ensures `url` ends with `/` so relative joins append instead of replacing the last segment.
pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}

pub(crate) fn parse_json<T>(bytes: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	Ok(serde_path_to_error::deserialize(&mut deserializer)?)
}

async fn read_body(response: Response) -> Result<Vec<u8>> {
	let status = response.status().as_u16();
	let body = response.bytes().await?;

	match Error::from_status(status, String::from_utf8_lossy(&body)) {
		Some(err) => Err(err),
		None => Ok(body.to_vec()),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::error::TransportError;

	#[test]
	fn default_timeouts_match_the_connect_read_pair() {
		let timeouts = Timeouts::default();

		assert_eq!(timeouts.connect, StdDuration::from_millis(3_050));
		assert_eq!(timeouts.read, StdDuration::from_secs(15));
		assert!(build_session(timeouts).is_ok());
	}

	#[test]
	fn trailing_slash_is_appended_once() {
		let bare = Url::parse("http://127.0.0.1:8080/tree").expect("URL should parse.");
		let slashed = with_trailing_slash(bare);

		assert_eq!(slashed.as_str(), "http://127.0.0.1:8080/tree/");
		assert_eq!(with_trailing_slash(slashed.clone()), slashed);
	}

	#[test]
	fn parse_json_reports_the_failing_path() {
		#[derive(Debug, Deserialize)]
		struct Payload {
			#[allow(dead_code)]
			expires_in: i64,
		}

		let err = parse_json::<Payload>(b"{\"expires_in\":\"soon\"}")
			.expect_err("A string expiry should be rejected.");

		match err {
			Error::Decode(inner) => assert_eq!(inner.path().to_string(), "expires_in"),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[tokio::test]
	async fn read_deadline_is_independent_of_the_connect_deadline() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(GET);
				then.status(200).body("{}").delay(StdDuration::from_secs(1));
			})
			.await;

		let session =
			build_session(Timeouts::new(StdDuration::from_secs(5), StdDuration::from_millis(100)))
				.expect("Session should build.");
		let err = session
			.get(server.url("/slow.json"))
			.send()
			.await
			.map_err(Error::from)
			.expect_err("A stalled read should time out despite the generous connect deadline.");

		assert!(matches!(err, Error::Transport(TransportError::Timeout { .. })), "{err:?}");
	}
}
