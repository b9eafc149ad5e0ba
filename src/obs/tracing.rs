// self
use crate::{_prelude::*, obs::OpKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by credential and REST operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("firechannel.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Notes that the remote service rejected the access token and the call will be retried.
pub fn auth_rejected(attempt: u32, max_attempts: u32) {
	#[cfg(feature = "tracing")]
	tracing::debug!(attempt, max_attempts, "Access token was rejected; retrying.");
	#[cfg(not(feature = "tracing"))]
	let _ = (attempt, max_attempts);
}

/// Notes a refresh failure that the auth-retry loop swallows.
pub fn refresh_failed(error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(%error, "Failed refreshing access token.");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Notes that a fresh access token was cached.
pub fn token_refreshed(signer: &str, expires_at: OffsetDateTime) {
	#[cfg(feature = "tracing")]
	tracing::debug!(signer, %expires_at, "Cached a fresh access token.");
	#[cfg(not(feature = "tracing"))]
	let _ = (signer, expires_at);
}
