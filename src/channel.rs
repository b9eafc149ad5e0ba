//! Channels: per-client mailboxes stored under `firechannels/` in the realtime tree.
//!
//! A channel is opened by clearing its node and minting a token whose `uid` claim names it.
//! Messages are written with a millisecond timestamp so stale channels can be found and
//! reclaimed later.

// crates.io
use rand::{Rng, distr::Alphanumeric};
use serde_json::json;
// self
use crate::{
	_prelude::*,
	rest::RestClient,
	token::{self, Claims},
};

/// Tree node every channel lives under.
pub const CHANNEL_ROOT: &str = "firechannels";
/// Longest accepted client id.
pub const MAX_CLIENT_ID_LEN: usize = 64;
/// Token lifetime used when the caller has no preference.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;
/// Longest token lifetime a channel may be opened with.
pub const MAX_DURATION_MINUTES: u32 = 1_440;

const GENERATED_ID_LEN: usize = 32;

/// Channel arguments rejected before any request is sent.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ChannelError {
	/// Client id is empty, too long, or carries characters outside `[A-Za-z0-9_-]`.
	#[error("Client id `{id}` is invalid: {reason}.")]
	InvalidClientId {
		/// Rejected id.
		id: String,
		/// Which rule it broke.
		reason: &'static str,
	},
	/// Token lifetime is outside `1..=1440` minutes.
	#[error("Channel duration must be between 1 and 1440 minutes, got {minutes}.")]
	InvalidDuration {
		/// Rejected lifetime.
		minutes: u32,
	},
	/// Token does not carry a string `uid` claim.
	#[error("Token does not name a channel.")]
	MissingClientId,
}

/// Validated channel client id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ChannelId(String);
impl ChannelId {
	/// Validates `id` as a channel client id.
	pub fn new(id: impl Into<String>) -> Result<Self, ChannelError> {
		let id = id.into();
		let reason = if id.is_empty() {
			"must not be empty"
		} else if id.len() > MAX_CLIENT_ID_LEN {
			"must be at most 64 characters long"
		} else if !id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
			"contains invalid characters"
		} else {
			return Ok(Self(id));
		};

		Err(ChannelError::InvalidClientId { id, reason })
	}

	/// Random 32-character alphanumeric id for anonymous channels.
	pub fn generate() -> Self {
		Self(rand::rng().sample_iter(&Alphanumeric).take(GENERATED_ID_LEN).map(char::from).collect())
	}

	/// Id as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// REST path of the channel node.
	pub fn path(&self) -> String {
		format!("{CHANNEL_ROOT}/{}.json", self.0)
	}
}
impl AsRef<str> for ChannelId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for ChannelId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for ChannelId {
	type Err = ChannelError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl<'de> Deserialize<'de> for ChannelId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		Self::new(raw).map_err(serde::de::Error::custom)
	}
}

/// Freshly opened channel.
#[derive(Clone, Debug)]
pub struct OpenChannel {
	/// Channel the token grants access to.
	pub id: ChannelId,
	/// Signed token to hand to the client.
	pub token: String,
}

/// Channel operations bound to one [`RestClient`].
///
/// Hold one per database and pass it to whatever needs to talk to channels.
#[derive(Clone, Debug)]
pub struct Channels {
	client: Arc<RestClient>,
}
impl Channels {
	/// Binds channel operations to `client`.
	pub fn new(client: Arc<RestClient>) -> Self {
		Self { client }
	}

	/// Client requests go through.
	pub fn client(&self) -> &Arc<RestClient> {
		&self.client
	}

	/// Opens a channel and returns a token valid for `duration_minutes`.
	///
	/// `None` opens an anonymous channel with a generated id. Any data left in the channel
	/// node is deleted first so the client never sees stale messages.
	pub async fn create_channel(
		&self,
		id: Option<ChannelId>,
		duration_minutes: u32,
	) -> Result<OpenChannel> {
		if !(1..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
			return Err(ChannelError::InvalidDuration { minutes: duration_minutes }.into());
		}

		let id = id.unwrap_or_else(ChannelId::generate);

		self.client.delete(&id.path()).await?;

		let mut claims = Claims::new();

		claims.insert("uid".into(), id.as_str().into());

		let token = token::build_token(self.client.credentials(), &claims, duration_minutes).await?;

		Ok(OpenChannel { id, token })
	}

	/// Deletes the channel named by `target`, a client id or a channel token.
	pub async fn delete_channel(&self, target: &str) -> Result<()> {
		let id = resolve_target(target)?;

		self.client.delete(&id.path()).await?;

		Ok(())
	}

	/// Writes `message` into the channel named by `target`, a client id or a channel token.
	pub async fn send_message(&self, target: &str, message: &str) -> Result<()> {
		let id = resolve_target(target)?;
		let body = json!({ "message": message, "timestamp": now_millis() });

		self.client.patch(&id.path(), &body).await?;

		Ok(())
	}

	/// Ids of channels whose last message is at least `max_age` old.
	///
	/// Entries without a numeric `timestamp` are half-written and count as expired too.
	pub async fn find_expired_channels(&self, max_age: Duration) -> Result<Vec<String>> {
		let tree = self.client.get(&format!("{CHANNEL_ROOT}.json")).await?;

		Ok(expired_ids(tree.as_ref(), now_millis(), max_age))
	}

	/// Reads the channel id out of `token` without checking its signature.
	pub fn decode_client_id(&self, token: &str) -> Result<ChannelId> {
		decode_client_id(token)
	}
}

/// Reads the `uid` claim of a channel token without checking its signature.
pub fn decode_client_id(token: &str) -> Result<ChannelId> {
	let claims = token::decode_unverified(token)?;
	let uid = claims.get("uid").and_then(Value::as_str).ok_or(ChannelError::MissingClientId)?;

	Ok(ChannelId::new(uid)?)
}

// Channel ids never contain `.`; tokens always do.
fn resolve_target(target: &str) -> Result<ChannelId> {
	if target.contains('.') { decode_client_id(target) } else { Ok(ChannelId::new(target)?) }
}

fn now_millis() -> i64 {
	(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn expired_ids(tree: Option<&Value>, now_ms: i64, max_age: Duration) -> Vec<String> {
	let Some(Value::Object(channels)) = tree else {
		return Vec::new();
	};
	let max_age_ms = max_age.whole_milliseconds() as f64;

	channels
		.iter()
		.filter(|(_, channel)| {
			match channel.get("timestamp").and_then(Value::as_f64) {
				Some(written_at) => now_ms as f64 - written_at >= max_age_ms,
				None => true,
			}
		})
		.map(|(id, _)| id.clone())
		.collect()
}
