//! Service account identity backed by explicit key material.

// std
use std::{fs, path::Path};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet, TokenResponse},
	credentials::{IdentityFuture, SigningIdentity},
	error::ConfigError,
	http,
};

/// Default OAuth token endpoint for service accounts.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Lifetime requested for the JWT-bearer assertion.
pub const ASSERTION_LIFETIME: Duration = Duration::hours(1);

const SERVICE_ACCOUNT_KIND: &str = "service_account";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Parsed service account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
	/// Key file type; only `service_account` keys can sign.
	#[serde(rename = "type")]
	pub kind: String,
	/// Service account email, used as issuer and signer identity.
	pub client_email: String,
	/// PEM-encoded RSA private key.
	pub private_key: String,
	/// Identifier of the private key, forwarded as the assertion `kid`.
	#[serde(default)]
	pub private_key_id: Option<String>,
	/// Project the account belongs to.
	#[serde(default)]
	pub project_id: Option<String>,
	/// OAuth token endpoint.
	#[serde(default = "default_token_uri")]
	pub token_uri: String,
}
impl ServiceAccountKey {
	/// Parses key file JSON, rejecting credential types that cannot sign.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		#[derive(Deserialize)]
		struct KeyKind {
			#[serde(rename = "type")]
			kind: String,
		}

		let kind = serde_json::from_str::<KeyKind>(raw)
			.map_err(|e| ConfigError::key_file("<inline>", e))?
			.kind;

		if kind != SERVICE_ACCOUNT_KIND {
			return Err(ConfigError::SigningUnsupported { kind });
		}

		let mut deserializer = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| ConfigError::key_file("<inline>", e))
	}

	/// Reads and parses a key file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = fs::read_to_string(path).map_err(|e| ConfigError::key_file(path, e))?;

		Self::from_json(&raw).map_err(|e| match e {
			ConfigError::KeyFile { source, .. } =>
				ConfigError::KeyFile { path: path.to_path_buf(), source },
			other => other,
		})
	}
}
impl Debug for ServiceAccountKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountKey")
			.field("kind", &self.kind)
			.field("client_email", &self.client_email)
			.field("private_key", &"<redacted>")
			.field("private_key_id", &self.private_key_id)
			.field("project_id", &self.project_id)
			.field("token_uri", &self.token_uri)
			.finish()
	}
}

/// Service account that signs locally with its RSA key and exchanges JWT-bearer assertions
/// for access tokens.
#[derive(Clone)]
pub struct ServiceAccount {
	email: String,
	key_id: Option<String>,
	project_id: Option<String>,
	token_uri: Url,
	encoding_key: EncodingKey,
}
impl ServiceAccount {
	/// Validates `key` and prepares its signing key.
	pub fn new(key: ServiceAccountKey) -> Result<Self, ConfigError> {
		let encoding_key =
			EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(ConfigError::InvalidKey)?;
		let token_uri = Url::parse(&key.token_uri).map_err(|source| {
			ConfigError::InvalidEndpoint { url: key.token_uri.clone(), source: Some(source) }
		})?;

		Ok(Self {
			email: key.client_email,
			key_id: key.private_key_id,
			project_id: key.project_id,
			token_uri,
			encoding_key,
		})
	}

	/// Loads a service account from a key file on disk.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		Self::new(ServiceAccountKey::from_file(path)?)
	}

	/// Loads a service account from key file JSON.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		Self::new(ServiceAccountKey::from_json(raw)?)
	}

	/// Overrides the token endpoint named by the key file.
	pub fn with_token_uri(mut self, token_uri: Url) -> Self {
		self.token_uri = token_uri;

		self
	}

	/// Project named by the key file, if any.
	pub fn project_id(&self) -> Option<&str> {
		self.project_id.as_deref()
	}

	/// Token endpoint assertions are exchanged at.
	pub fn token_uri(&self) -> &Url {
		&self.token_uri
	}

	fn sign_now(&self, payload: &[u8]) -> Result<Vec<u8>> {
		let encoded = jsonwebtoken::crypto::sign(payload, &self.encoding_key, Algorithm::RS256)
			.map_err(ConfigError::InvalidKey)?;

		// `crypto::sign` hands back base64url without padding.
		URL_SAFE_NO_PAD
			.decode(encoded)
			.map_err(|e| ConfigError::InvalidKey(e.into()).into())
	}

	fn assertion(&self, scopes: &ScopeSet, now: OffsetDateTime) -> Result<String> {
		#[derive(Serialize)]
		struct AssertionClaims<'a> {
			iss: &'a str,
			scope: String,
			aud: &'a str,
			iat: i64,
			exp: i64,
		}

		let mut header = Header::new(Algorithm::RS256);

		header.kid = self.key_id.clone();

		let claims = AssertionClaims {
			iss: &self.email,
			scope: scopes.joined(' '),
			aud: self.token_uri.as_str(),
			iat: now.unix_timestamp(),
			exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
		};

		jsonwebtoken::encode(&header, &claims, &self.encoding_key)
			.map_err(|e| ConfigError::InvalidKey(e).into())
	}
}
impl SigningIdentity for ServiceAccount {
	fn kind(&self) -> &'static str {
		SERVICE_ACCOUNT_KIND
	}

	fn signer_identity(&self) -> &str {
		&self.email
	}

	fn sign<'a>(
		&'a self,
		_http: &'a ReqwestClient,
		payload: &'a [u8],
	) -> IdentityFuture<'a, Vec<u8>> {
		Box::pin(async move { self.sign_now(payload) })
	}

	fn fetch_token<'a>(
		&'a self,
		http: &'a ReqwestClient,
		scopes: &'a ScopeSet,
	) -> IdentityFuture<'a, AccessToken> {
		Box::pin(async move {
			let issued_at = OffsetDateTime::now_utc();
			let assertion = self.assertion(scopes, issued_at)?;
			let response = http
				.post(self.token_uri.clone())
				.form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
				.send()
				.await?;
			let token: TokenResponse = http::read_json(response).await?;

			Ok(token.into_access_token(issued_at))
		})
	}
}
impl Debug for ServiceAccount {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccount")
			.field("email", &self.email)
			.field("key_id", &self.key_id)
			.field("token_uri", &self.token_uri.as_str())
			.finish()
	}
}

fn default_token_uri() -> String {
	GOOGLE_TOKEN_URI.into()
}
