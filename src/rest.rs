//! Bearer-authenticated JSON REST client with bounded retries on authorization failure.
//!
//! Every call borrows the calling thread's pooled session, attaches the current access token,
//! and sends the request. A 401 forces a credential refresh and resends, up to
//! [`ClientConfig::with_max_auth_attempts`] requests in total. Once the budget is spent the last
//! response is classified like any other, so an exhausted retry surfaces as
//! [`Error::BadRequest`] carrying the final 401.

// crates.io
use reqwest::{Method, StatusCode};
// self
use crate::{
	_prelude::*,
	credentials::Credentials,
	error::ConfigError,
	http::{self, Timeouts},
	obs::{self, OpKind, OpOutcome, OpSpan},
	pool::SessionPool,
};

/// Maximum number of requests sent for one call while the service keeps answering 401.
pub const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Target and transport settings for a [`RestClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	base_url: Url,
	timeouts: Timeouts,
	max_auth_attempts: u32,
}
impl ClientConfig {
	/// Targets the realtime database of `project` (`https://{project}.firebaseio.com/`).
	pub fn firebase(project: &str) -> Result<Self> {
		let raw = format!("https://{project}.firebaseio.com/");
		let url = Url::parse(&raw)
			.map_err(|source| ConfigError::InvalidEndpoint { url: raw, source: Some(source) })?;

		Self::with_base_url(url)
	}

	/// Targets any bearer-authenticated JSON tree rooted at `base_url`.
	pub fn with_base_url(base_url: Url) -> Result<Self> {
		if base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidEndpoint { url: base_url.into(), source: None }.into());
		}

		Ok(Self {
			base_url: http::with_trailing_slash(base_url),
			timeouts: Timeouts::default(),
			max_auth_attempts: MAX_AUTH_ATTEMPTS,
		})
	}

	/// Overrides the connect/read deadlines.
	pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
		self.timeouts = timeouts;

		self
	}

	/// Overrides the request budget for 401 retries; values below one are raised to one.
	pub fn with_max_auth_attempts(mut self, attempts: u32) -> Self {
		self.max_auth_attempts = attempts.max(1);

		self
	}

	/// Root every request path is joined onto.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Deadlines applied to pooled sessions.
	pub fn timeouts(&self) -> Timeouts {
		self.timeouts
	}

	/// Request budget for one call while the service answers 401.
	pub fn max_auth_attempts(&self) -> u32 {
		self.max_auth_attempts
	}
}

/// Authenticated client for one JSON REST tree.
///
/// Cheap to share behind an [`Arc`]; sessions are pooled per OS thread and the wrapped
/// [`Credentials`] serialize their own refreshes.
pub struct RestClient {
	credentials: Arc<Credentials>,
	config: ClientConfig,
	pool: SessionPool<ReqwestClient>,
}
impl RestClient {
	/// Creates a client that authenticates with `credentials` against `config`'s tree.
	pub fn new(credentials: Arc<Credentials>, config: ClientConfig) -> Self {
		let timeouts = config.timeouts;

		Self {
			credentials,
			config,
			pool: SessionPool::new(move || http::build_session(timeouts)),
		}
	}

	/// Credentials used to authorize requests and sign channel tokens.
	pub fn credentials(&self) -> &Arc<Credentials> {
		&self.credentials
	}

	/// Settings the client was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Resolves `path` against the base URL, ignoring leading slashes.
	pub fn endpoint(&self, path: &str) -> Result<Url> {
		self.config.base_url.join(path.trim_start_matches('/')).map_err(|source| {
			ConfigError::InvalidEndpoint { url: path.into(), source: Some(source) }.into()
		})
	}

	/// Sends `method` to `path` with an optional JSON `body`.
	///
	/// Returns the decoded JSON body, or `None` when the body is empty or `null`.
	pub async fn call(
		&self,
		method: Method,
		path: &str,
		body: Option<&Value>,
	) -> Result<Option<Value>> {
		const KIND: OpKind = OpKind::Call;

		let span = OpSpan::new(KIND, "call");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.call_inner(method, path, body)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// `GET path`.
	pub async fn get(&self, path: &str) -> Result<Option<Value>> {
		self.call(Method::GET, path, None).await
	}

	/// `PUT path` with `body`.
	pub async fn put(&self, path: &str, body: &Value) -> Result<Option<Value>> {
		self.call(Method::PUT, path, Some(body)).await
	}

	/// `POST path` with `body`.
	pub async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
		self.call(Method::POST, path, Some(body)).await
	}

	/// `PATCH path` with `body`.
	pub async fn patch(&self, path: &str, body: &Value) -> Result<Option<Value>> {
		self.call(Method::PATCH, path, Some(body)).await
	}

	/// `DELETE path`.
	pub async fn delete(&self, path: &str) -> Result<Option<Value>> {
		self.call(Method::DELETE, path, None).await
	}

	/// `HEAD path`.
	pub async fn head(&self, path: &str) -> Result<Option<Value>> {
		self.call(Method::HEAD, path, None).await
	}

	async fn call_inner(
		&self,
		method: Method,
		path: &str,
		body: Option<&Value>,
	) -> Result<Option<Value>> {
		let session = self.pool.acquire()?;
		let endpoint = self.endpoint(path)?;
		let max_attempts = self.config.max_auth_attempts;
		let mut attempt = 1;
		let response = loop {
			let token = self.credentials.ensure_fresh().await?;
			let mut request =
				session.request(method.clone(), endpoint.clone()).bearer_auth(token.expose());

			if let Some(body) = body {
				request = request.json(body);
			}

			let response = request.send().await?;

			if response.status() != StatusCode::UNAUTHORIZED {
				break response;
			}

			obs::auth_rejected(attempt, max_attempts);

			// A failed refresh is not fatal; the next attempt reuses whatever is cached.
			if let Err(e) = self.credentials.refresh().await {
				obs::refresh_failed(&e);
			}

			if attempt >= max_attempts {
				break response;
			}

			attempt += 1;
		};

		http::read_optional_json(response).await
	}
}
impl Debug for RestClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RestClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("credentials", &self.credentials)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[test]
	fn firebase_config_renders_project_root() {
		let config = ClientConfig::firebase("demo-project").expect("Project URL should parse.");

		assert_eq!(config.base_url().as_str(), "https://demo-project.firebaseio.com/");
		assert_eq!(config.max_auth_attempts(), MAX_AUTH_ATTEMPTS);
		assert_eq!(config.timeouts(), Timeouts::default());
	}

	#[test]
	fn auth_attempts_never_drop_below_one() {
		let config = ClientConfig::firebase("demo").expect("Project URL should parse.");

		assert_eq!(config.with_max_auth_attempts(0).max_auth_attempts(), 1);
	}

	#[test]
	fn opaque_urls_cannot_be_roots() {
		let url = Url::parse("mailto:ops@example.com").expect("Mailto URL should parse.");
		let err = ClientConfig::with_base_url(url).expect_err("Opaque URLs cannot be joined.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidEndpoint { .. })));
	}

	#[test]
	fn endpoints_strip_leading_slashes() {
		let base = Url::parse("http://127.0.0.1:9000/db").expect("Base URL should parse.");
		let client = RestClient::new(
			Arc::new(fixture_credentials()),
			ClientConfig::with_base_url(base).expect("Base URL should be accepted."),
		);

		for path in ["firechannels/a.json", "/firechannels/a.json", "//firechannels/a.json"] {
			assert_eq!(
				client.endpoint(path).expect("Path should join.").as_str(),
				"http://127.0.0.1:9000/db/firechannels/a.json"
			);
		}
	}
}
