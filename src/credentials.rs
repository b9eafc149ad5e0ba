//! Signing identities and the self-refreshing [`Credentials`] wrapper around them.
//!
//! A [`SigningIdentity`] knows who it is, how to sign a blob, and how to obtain a bearer
//! token. Two implementations ship with the crate: [`ServiceAccount`] (explicit key material)
//! and [`MetadataIdentity`] (the platform's default service account). [`get_credentials`]
//! picks one from a [`KeySource`] and fails eagerly when none is usable.
//!
//! [`Credentials`] caches the bearer token. [`Credentials::ensure_fresh`] uses double-checked
//! locking: a lock-free read of the cached token first, then a per-instance refresh guard, then
//! a second read before touching the network, so callers that queued behind a refresh reuse
//! its result instead of refreshing again.

pub mod metadata;
pub mod service_account;

mod metrics;

pub use metadata::*;
pub use metrics::RefreshMetrics;
pub use service_account::*;

// std
use std::{env, path::PathBuf};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet},
	http::{self, Timeouts},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Environment variable naming the ambient service account key file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Boxed future returned by [`SigningIdentity`] operations.
pub type IdentityFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Identity capable of producing RS256 signatures over arbitrary bytes and of minting
/// bearer tokens for itself.
pub trait SigningIdentity
where
	Self: Send + Sync,
{
	/// Stable label for the identity kind, used in logs and `Debug` output.
	fn kind(&self) -> &'static str;

	/// Account the identity signs as (for example a service account email).
	fn signer_identity(&self) -> &str;

	/// Signs `payload` exactly as given.
	fn sign<'a>(
		&'a self,
		http: &'a ReqwestClient,
		payload: &'a [u8],
	) -> IdentityFuture<'a, Vec<u8>>;

	/// Obtains a new bearer token limited to `scopes`.
	fn fetch_token<'a>(
		&'a self,
		http: &'a ReqwestClient,
		scopes: &'a ScopeSet,
	) -> IdentityFuture<'a, AccessToken>;
}

/// Where [`get_credentials`] should look for a signing identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum KeySource {
	/// The key file named by [`CREDENTIALS_ENV`], falling back to the platform identity.
	#[default]
	Ambient,
	/// An explicit service account key file.
	KeyFile(PathBuf),
	/// The platform default identity served by the given endpoints.
	Platform(PlatformEndpoints),
}

/// Resolves `source` into [`Credentials`] scoped to the channel scope pair.
///
/// Fails with [`ConfigError`](crate::error::ConfigError) when no identity is available or
/// when the identity found cannot sign blobs.
pub async fn get_credentials(source: KeySource) -> Result<Credentials> {
	match source {
		KeySource::KeyFile(path) => Ok(Credentials::new(ServiceAccount::from_file(path)?)),
		KeySource::Platform(endpoints) => {
			let http = http::build_session(Timeouts::default())?;
			let identity = MetadataIdentity::discover(&http, endpoints).await?;

			Ok(Credentials::new(identity).with_http_client(http))
		},
		KeySource::Ambient => {
			let key_file = env::var_os(CREDENTIALS_ENV).map(PathBuf::from);

			resolve_ambient(key_file, PlatformEndpoints::default()).await
		},
	}
}

async fn resolve_ambient(
	key_file: Option<PathBuf>,
	endpoints: PlatformEndpoints,
) -> Result<Credentials> {
	if let Some(path) = key_file.filter(|path| !path.as_os_str().is_empty()) {
		return Ok(Credentials::new(ServiceAccount::from_file(path)?));
	}

	let http = http::build_session(Timeouts::default())?;
	let identity = MetadataIdentity::discover(&http, endpoints).await?;

	Ok(Credentials::new(identity).with_http_client(http))
}

/// Signing identity plus a cached bearer token that refreshes itself.
///
/// Share one instance behind an [`Arc`]; refreshes are serialized per instance and readers
/// always observe a token together with the expiry it was issued with. Refreshes and remote
/// signing run on a session bounded by [`Timeouts::default`] unless
/// [`with_timeouts`](Self::with_timeouts) says otherwise, so a hung token endpoint releases
/// the refresh guard once the read deadline passes.
pub struct Credentials {
	identity: Box<dyn SigningIdentity>,
	scopes: ScopeSet,
	http: ReqwestClient,
	cached: RwLock<Option<AccessToken>>,
	refresh_guard: AsyncMutex<()>,
	metrics: RefreshMetrics,
}
impl Credentials {
	/// Wraps `identity`, requesting the channel scope pair.
	pub fn new(identity: impl 'static + SigningIdentity) -> Self {
		Self {
			identity: Box::new(identity),
			scopes: ScopeSet::channel_defaults(),
			http: default_session(),
			cached: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			metrics: RefreshMetrics::default(),
		}
	}

	/// Rebuilds the refresh and signing session with `timeouts`.
	pub fn with_timeouts(self, timeouts: Timeouts) -> Result<Self> {
		Ok(self.with_http_client(http::build_session(timeouts)?))
	}

	/// Replaces the HTTP client used for token refreshes and remote signing.
	pub fn with_http_client(mut self, http: ReqwestClient) -> Self {
		self.http = http;

		self
	}

	/// Replaces the requested scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Account the credentials sign as.
	pub fn signer_identity(&self) -> &str {
		self.identity.signer_identity()
	}

	/// Scopes requested on every refresh.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Refresh counters for this instance.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns `true` when a cached token exists and has not expired.
	pub fn valid(&self) -> bool {
		self.current().is_some()
	}

	/// Snapshot of the cached token, whether or not it is still valid.
	pub fn cached_token(&self) -> Option<AccessToken> {
		self.cached.read().clone()
	}

	/// Signs `payload` with the underlying identity.
	pub async fn sign_bytes(&self, payload: &[u8]) -> Result<Vec<u8>> {
		const KIND: OpKind = OpKind::Sign;

		let span = OpSpan::new(KIND, "sign_bytes");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.identity.sign(&self.http, payload)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Returns a usable bearer token, refreshing it first when it is missing or expired.
	pub async fn ensure_fresh(&self) -> Result<AccessToken> {
		if let Some(token) = self.current() {
			return Ok(token);
		}

		let _refreshing = self.refresh_guard.lock().await;

		if let Some(token) = self.current() {
			self.metrics.record_coalesced();

			return Ok(token);
		}

		self.refresh_locked().await
	}

	/// Unconditionally fetches a new token, for example after the remote service rejected the
	/// cached one.
	pub async fn refresh(&self) -> Result<AccessToken> {
		let _refreshing = self.refresh_guard.lock().await;

		self.refresh_locked().await
	}

	/// Drops the cached token so the next [`ensure_fresh`](Self::ensure_fresh) refreshes.
	pub fn invalidate(&self) {
		*self.cached.write() = None;
	}

	fn current(&self) -> Option<AccessToken> {
		self.cached.read().as_ref().filter(|token| token.is_valid()).cloned()
	}

	// Must be called with `refresh_guard` held.
	async fn refresh_locked(&self) -> Result<AccessToken> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "refresh");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span.instrument(self.identity.fetch_token(&self.http, &self.scopes)).await;

		match &result {
			Ok(token) => {
				*self.cached.write() = Some(token.clone());

				self.metrics.record_success();
				obs::token_refreshed(self.signer_identity(), token.expires_at);
			},
			Err(_) => self.metrics.record_failure(),
		}

		obs::record_result(KIND, &result);

		result
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("kind", &self.identity.kind())
			.field("signer_identity", &self.signer_identity())
			.field("scopes", &self.scopes)
			.field("valid", &self.valid())
			.finish()
	}
}

// Building only fails without a usable TLS backend, where `ReqwestClient::default` panics too.
fn default_session() -> ReqwestClient {
	http::build_session(Timeouts::default()).unwrap_or_default()
}
