//! Crate-level error taxonomy shared by the credential provider, token codec, and REST client.

// std
use std::path::PathBuf;
// self
use crate::{_prelude::*, channel::ChannelError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Every variant except [`Error::Config`] describes a condition the caller can recover
/// from (retry later, fix the input, or treat a missing node as empty).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Remote service rejected the request with a 4xx status other than 404.
	#[error("Request was rejected with HTTP {status}: {body}")]
	BadRequest {
		/// HTTP status code of the final response.
		status: u16,
		/// Response body returned by the service.
		body: String,
	},
	/// Remote service answered 404.
	#[error("Resource was not found: {body}")]
	NotFound {
		/// Response body returned by the service.
		body: String,
	},
	/// Remote service failed with a 5xx status.
	#[error("Server failed with HTTP {status}: {body}")]
	Server {
		/// HTTP status code of the final response.
		status: u16,
		/// Response body returned by the service.
		body: String,
	},
	/// Response arrived but its body could not be decoded.
	#[error("Response body is not valid JSON.")]
	Decode(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Transport failure before a response was received.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Deployment or setup defect.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Channel token could not be decoded or verified.
	#[error(transparent)]
	Token(#[from] TokenError),
	/// Channel arguments were rejected before any request was sent.
	#[error(transparent)]
	Channel(#[from] ChannelError),
}
impl Error {
	/// Classifies a terminal HTTP status.
	///
	/// Returns `None` for statuses below 400, which callers treat as success.
	pub fn from_status(status: u16, body: impl Into<String>) -> Option<Self> {
		let body = body.into();

		match status {
			500.. => Some(Self::Server { status, body }),
			404 => Some(Self::NotFound { body }),
			400..500 => Some(Self::BadRequest { status, body }),
			_ => None,
		}
	}

	/// Returns `false` only for setup defects that no retry can fix.
	pub fn is_recoverable(&self) -> bool {
		!matches!(self, Self::Config(_))
	}

	/// HTTP status that produced this error, when one exists.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::BadRequest { status, .. } | Self::Server { status, .. } => Some(*status),
			Self::NotFound { .. } => Some(404),
			_ => None,
		}
	}
}
impl From<ReqwestError> for Error {
	fn from(e: ReqwestError) -> Self {
		if e.is_builder() {
			return ConfigError::http_client_build(e).into();
		}

		TransportError::from(e).into()
	}
}

/// Setup failures detected while acquiring credentials or building clients.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint URL does not parse or cannot serve as a join base.
	#[error("Endpoint `{url}` is not a usable base URL.")]
	InvalidEndpoint {
		/// Offending URL.
		url: String,
		/// Underlying parsing failure, when the URL did not parse at all.
		#[source]
		source: Option<url::ParseError>,
	},
	/// Key file could not be read or parsed.
	#[error("Key file {} could not be loaded.", .path.display())]
	KeyFile {
		/// Path that was read.
		path: PathBuf,
		/// Underlying read or parse failure.
		#[source]
		source: BoxError,
	},
	/// Private key material is not a usable RSA key.
	#[error("Private key is not a valid RSA PEM key.")]
	InvalidKey(#[source] jsonwebtoken::errors::Error),
	/// Credential type cannot produce signatures.
	#[error("Credentials of type `{kind}` cannot sign blobs.")]
	SigningUnsupported {
		/// Credential type reported by the key material.
		kind: String,
	},
	/// Neither a key file nor a platform identity is available.
	#[error("No ambient identity is available; provide a service account key file.")]
	NoAmbientIdentity,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn key_file(
		path: impl Into<PathBuf>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::KeyFile { path: path.into(), source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Request exceeded its deadline.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Connection could not be established or was dropped (DNS, refused, reset).
	#[error("Connection to the remote service failed.")]
	Connection {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while talking to the remote service.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a timeout raised by the transport.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Wraps a transport-specific network error.
	pub fn connection(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Connection { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::connection(e) }
	}
}

/// Channel token failures. Deterministic; never retried.
#[derive(Debug, ThisError)]
pub enum TokenError {
	/// Token does not have the expected shape or header.
	#[error("Token is malformed: {reason}.")]
	Malformed {
		/// What was wrong with the token.
		reason: &'static str,
		/// Decoding failure behind the rejection, if any.
		#[source]
		source: Option<BoxError>,
	},
	/// Signature does not match the payload.
	#[error("Token signature is invalid.")]
	InvalidSignature,
}
impl TokenError {
	pub(crate) fn malformed(reason: &'static str) -> Self {
		Self::Malformed { reason, source: None }
	}

	pub(crate) fn malformed_by(
		reason: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Malformed { reason, source: Some(Box::new(src)) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn status_classification_matches_taxonomy() {
		assert!(matches!(Error::from_status(500, "boom"), Some(Error::Server { status: 500, .. })));
		assert!(matches!(Error::from_status(503, ""), Some(Error::Server { status: 503, .. })));
		assert!(matches!(Error::from_status(404, "missing"), Some(Error::NotFound { .. })));
		assert!(matches!(
			Error::from_status(401, "denied"),
			Some(Error::BadRequest { status: 401, .. })
		));
		assert!(matches!(
			Error::from_status(400, "bad"),
			Some(Error::BadRequest { status: 400, .. })
		));
		assert!(Error::from_status(200, "ok").is_none());
		assert!(Error::from_status(304, "").is_none());
	}

	#[test]
	fn only_config_errors_are_unrecoverable() {
		assert!(!Error::from(ConfigError::NoAmbientIdentity).is_recoverable());
		assert!(Error::from(TokenError::InvalidSignature).is_recoverable());
		assert!(
			Error::from_status(404, "").expect("404 should classify as an error.").is_recoverable()
		);
	}

	#[test]
	fn malformed_token_error_exposes_source() {
		let parse = serde_json::from_str::<serde_json::Value>("{").expect_err("Input is invalid.");
		let err: Error = TokenError::malformed_by("claims are not JSON", parse).into();

		assert!(err.to_string().contains("claims are not JSON"));
		assert!(StdError::source(&err).is_some());
	}
}
