//! Platform default identity served by the instance metadata server.

// std
use std::time::Duration as StdDuration;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserializer;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet, TokenResponse},
	credentials::{IdentityFuture, SigningIdentity},
	error::ConfigError,
	http,
};

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
const DEFAULT_ACCOUNT: &str = "computeMetadata/v1/instance/service-accounts/default/";
const DISCOVERY_TIMEOUT: StdDuration = StdDuration::from_secs(2);

/// Endpoints the platform identity talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformEndpoints {
	/// Root of the instance metadata server.
	pub metadata: Url,
	/// Root of the IAM Credentials API used for remote signing.
	pub iam: Url,
}
impl PlatformEndpoints {
	/// Public metadata server root.
	pub const METADATA_ROOT: &str = "http://metadata.google.internal/";
	/// Public IAM Credentials API root.
	pub const IAM_ROOT: &str = "https://iamcredentials.googleapis.com/";

	/// Creates an endpoint pair, normalizing both roots to end with `/`.
	pub fn new(metadata: Url, iam: Url) -> Self {
		Self { metadata: http::with_trailing_slash(metadata), iam: http::with_trailing_slash(iam) }
	}

	#[cfg(test)]
	pub(crate) fn unreachable() -> Self {
		let closed = Url::parse("http://127.0.0.1:9/").expect("Closed-port URL should parse.");

		Self::new(closed.clone(), closed)
	}

	fn account_url(&self, leaf: &str) -> Result<Url> {
		join(&self.metadata, &format!("{DEFAULT_ACCOUNT}{leaf}"))
	}

	fn sign_blob_url(&self, email: &str) -> Result<Url> {
		join(&self.iam, &format!("v1/projects/-/serviceAccounts/{email}:signBlob"))
	}
}
impl Default for PlatformEndpoints {
	fn default() -> Self {
		Self {
			metadata: Url::parse(Self::METADATA_ROOT).expect("Metadata root should be a valid URL."),
			iam: Url::parse(Self::IAM_ROOT).expect("IAM root should be a valid URL."),
		}
	}
}

/// Default service account of the machine the process runs on.
///
/// Tokens come from the metadata server; signatures come from the IAM Credentials
/// `signBlob` call, authorized with a metadata token that is reused until it expires.
#[derive(Debug)]
pub struct MetadataIdentity {
	endpoints: PlatformEndpoints,
	email: String,
	signing_token: RwLock<Option<AccessToken>>,
}
impl MetadataIdentity {
	/// Asks the metadata server which account this machine runs as.
	///
	/// Any failure (unreachable server, non-2xx answer, empty email) means no platform identity
	/// exists and yields [`ConfigError::NoAmbientIdentity`].
	pub async fn discover(http: &ReqwestClient, endpoints: PlatformEndpoints) -> Result<Self> {
		let url = endpoints.account_url("email")?;
		let email = async {
			let response = http
				.get(url)
				.header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
				.timeout(DISCOVERY_TIMEOUT)
				.send()
				.await
				.ok()?;

			if !response.status().is_success() {
				return None;
			}

			let email = response.text().await.ok()?.trim().to_owned();

			(!email.is_empty()).then_some(email)
		}
		.await
		.ok_or(ConfigError::NoAmbientIdentity)?;

		Ok(Self::with_email(endpoints, email))
	}

	/// Builds an identity for a known account without asking the metadata server.
	pub fn with_email(endpoints: PlatformEndpoints, email: impl Into<String>) -> Self {
		Self { endpoints, email: email.into(), signing_token: RwLock::new(None) }
	}

	async fn signing_token(&self, http: &ReqwestClient) -> Result<AccessToken> {
		let cached = self.signing_token.read().as_ref().filter(|token| token.is_valid()).cloned();

		if let Some(token) = cached {
			return Ok(token);
		}

		let token = self.metadata_token(http, None).await?;

		*self.signing_token.write() = Some(token.clone());

		Ok(token)
	}

	async fn metadata_token(
		&self,
		http: &ReqwestClient,
		scopes: Option<&ScopeSet>,
	) -> Result<AccessToken> {
		let mut url = self.endpoints.account_url("token")?;

		if let Some(scopes) = scopes.filter(|scopes| !scopes.is_empty()) {
			url.query_pairs_mut().append_pair("scopes", &scopes.joined(','));
		}

		let issued_at = OffsetDateTime::now_utc();
		let response = http.get(url).header(METADATA_FLAVOR.0, METADATA_FLAVOR.1).send().await?;
		let token: TokenResponse = http::read_json(response).await?;

		Ok(token.into_access_token(issued_at))
	}
}
impl SigningIdentity for MetadataIdentity {
	fn kind(&self) -> &'static str {
		"platform"
	}

	fn signer_identity(&self) -> &str {
		&self.email
	}

	fn sign<'a>(
		&'a self,
		http: &'a ReqwestClient,
		payload: &'a [u8],
	) -> IdentityFuture<'a, Vec<u8>> {
		Box::pin(async move {
			#[derive(Serialize)]
			struct SignBlobRequest {
				payload: String,
			}

			#[derive(Deserialize)]
			#[serde(rename_all = "camelCase")]
			struct SignBlobResponse {
				#[serde(deserialize_with = "standard_base64")]
				signed_blob: Vec<u8>,
			}

			let bearer = self.signing_token(http).await?;
			let response = http
				.post(self.endpoints.sign_blob_url(&self.email)?)
				.bearer_auth(bearer.expose())
				.json(&SignBlobRequest { payload: STANDARD.encode(payload) })
				.send()
				.await?;
			let signed: SignBlobResponse = http::read_json(response).await?;

			Ok(signed.signed_blob)
		})
	}

	fn fetch_token<'a>(
		&'a self,
		http: &'a ReqwestClient,
		scopes: &'a ScopeSet,
	) -> IdentityFuture<'a, AccessToken> {
		Box::pin(self.metadata_token(http, Some(scopes)))
	}
}

fn join(base: &Url, path: &str) -> Result<Url> {
	base.join(path).map_err(|source| {
		ConfigError::InvalidEndpoint { url: base.to_string(), source: Some(source) }.into()
	})
}

fn standard_base64<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
	D: Deserializer<'de>,
{
	let encoded = String::deserialize(deserializer)?;

	STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}
