//! Bearer access tokens cached by [`Credentials`](crate::credentials::Credentials).

// self
use crate::_prelude::*;

/// Tokens are treated as stale this long before their real expiry.
pub const EXPIRY_SKEW: Duration = Duration::seconds(30);

/// Short-lived bearer token paired with its expiry instant.
///
/// The pair is written as one value so readers never observe a token from one refresh with
/// the expiry of another.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	secret: String,
	/// Absolute expiry reported by the issuer.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Pairs a token value with its absolute expiry.
	pub fn new(secret: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { secret: secret.into(), expires_at }
	}

	/// Builds a token that expires `expires_in` seconds after `issued_at`.
	pub fn issued(secret: impl Into<String>, issued_at: OffsetDateTime, expires_in: i64) -> Self {
		Self::new(secret, issued_at + Duration::seconds(expires_in))
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.secret
	}

	/// Returns `true` while the token is usable at `instant`, honoring [`EXPIRY_SKEW`].
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant + EXPIRY_SKEW < self.expires_at
	}

	/// Convenience helper that checks validity against the current UTC instant.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Token payload shared by OAuth token endpoints and the metadata server.
#[derive(Clone, Deserialize)]
pub(crate) struct TokenResponse {
	pub(crate) access_token: String,
	pub(crate) expires_in: i64,
}
impl TokenResponse {
	pub(crate) fn into_access_token(self, issued_at: OffsetDateTime) -> AccessToken {
		AccessToken::issued(self.access_token, issued_at, self.expires_in)
	}
}
