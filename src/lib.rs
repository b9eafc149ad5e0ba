//! Channel-style client notifications on top of a realtime JSON database: signed channel
//! tokens, self-refreshing service credentials, and a REST client that retries through
//! authorization failures.
//!
//! The pieces, leaves first:
//!
//! - [`credentials`] resolves a signing identity and caches its bearer token.
//! - [`token`] mints and verifies the compact signed tokens handed to channel clients.
//! - [`pool`] keeps one HTTP session per thread.
//! - [`rest`] sends bearer-authenticated JSON requests and classifies the outcome.
//! - [`channel`] opens, feeds, and reclaims channels stored in the tree.
//! - [`error`] is the taxonomy every fallible operation reports through.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod channel;
pub mod credentials;
pub mod error;
pub mod http;
pub mod obs;
pub mod pool;
pub mod rest;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Fixture helpers for tests; enabled via `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		path::PathBuf,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// self
	use crate::{
		auth::{AccessToken, ScopeSet},
		credentials::{Credentials, IdentityFuture, ServiceAccount, SigningIdentity},
	};

	/// Signer identity of the primary fixture key.
	pub const FIXTURE_SIGNER: &str = "channels@firechannel-test.iam.gserviceaccount.com";
	/// `private_key_id` of the primary fixture key.
	pub const FIXTURE_KEY_ID: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f0a9b8c7d6";
	/// Primary fixture service account key file.
	pub const FIXTURE_KEY: &str = include_str!("../tests/fixtures/service_account.json");
	/// Second fixture key, used to produce signatures the primary key must reject.
	pub const OTHER_FIXTURE_KEY: &str = include_str!("../tests/fixtures/service_account_other.json");

	/// Absolute path of a file under `tests/fixtures`.
	pub fn fixture_path(name: &str) -> PathBuf {
		PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
	}

	/// Credentials for the primary fixture key with its default token endpoint.
	pub fn fixture_credentials() -> Credentials {
		Credentials::new(
			ServiceAccount::from_json(FIXTURE_KEY).expect("Fixture key should parse successfully."),
		)
	}

	/// Credentials for the primary fixture key exchanging assertions at `token_uri`.
	pub fn fixture_credentials_at(token_uri: Url) -> Credentials {
		Credentials::new(
			ServiceAccount::from_json(FIXTURE_KEY)
				.expect("Fixture key should parse successfully.")
				.with_token_uri(token_uri),
		)
	}

	/// Credentials for the second fixture key.
	pub fn other_fixture_credentials() -> Credentials {
		Credentials::new(
			ServiceAccount::from_json(OTHER_FIXTURE_KEY)
				.expect("Other fixture key should parse successfully."),
		)
	}

	/// In-process identity handing out `token-0`, `token-1`, ... and "signing" by reversing the
	/// payload.
	#[derive(Debug)]
	pub struct SequencedIdentity {
		fetches: AtomicUsize,
		lifetime: i64,
	}
	impl SequencedIdentity {
		/// Identity whose tokens live for `lifetime` seconds.
		pub fn new(lifetime: i64) -> Self {
			Self { fetches: AtomicUsize::new(0), lifetime }
		}
	}
	impl SigningIdentity for SequencedIdentity {
		fn kind(&self) -> &'static str {
			"sequenced"
		}

		fn signer_identity(&self) -> &str {
			"sequenced@example.com"
		}

		fn sign<'a>(
			&'a self,
			_http: &'a ReqwestClient,
			payload: &'a [u8],
		) -> IdentityFuture<'a, Vec<u8>> {
			Box::pin(async move { Ok(payload.iter().rev().copied().collect()) })
		}

		fn fetch_token<'a>(
			&'a self,
			_http: &'a ReqwestClient,
			_scopes: &'a ScopeSet,
		) -> IdentityFuture<'a, AccessToken> {
			Box::pin(async move {
				let n = self.fetches.fetch_add(1, Ordering::SeqCst);

				Ok(AccessToken::issued(format!("token-{n}"), OffsetDateTime::now_utc(), self.lifetime))
			})
		}
	}

	/// Token endpoint response body granting `token` for `expires_in` seconds.
	pub fn token_body(token: &str, expires_in: i64) -> Value {
		serde_json::json!({
			"access_token": token,
			"expires_in": expires_in,
			"token_type": "Bearer",
		})
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::RwLock;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
