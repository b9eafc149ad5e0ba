//! Optional observability helpers for credential and REST operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `firechannel.op` with the `op` and `stage`
//!   fields, plus debug/warn events for auth retries.
//! - Enable `metrics` to increment the `firechannel_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod tracing;

pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// One logical REST call, including its auth retries.
	Call,
	/// Access-token refresh against the identity's token source.
	Refresh,
	/// Blob signing by the identity.
	Sign,
	/// Channel token signature verification.
	Verify,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Call => "call",
			OpKind::Refresh => "refresh",
			OpKind::Sign => "sign",
			OpKind::Verify => "verify",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Increments `firechannel_op_total{op, outcome}` when the `metrics` feature is enabled.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!("firechannel_op_total", "op" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Records the terminal outcome of `result` for `kind`.
pub fn record_result<T, E>(kind: OpKind, result: &Result<T, E>) {
	match result {
		Ok(_) => record_op_outcome(kind, OpOutcome::Success),
		Err(_) => record_op_outcome(kind, OpOutcome::Failure),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(OpKind::Verify.to_string(), "verify");
		assert_eq!(OpOutcome::Attempt.as_str(), "attempt");
	}

	#[test]
	fn outcomes_follow_the_result() {
		record_result(OpKind::Call, &Ok::<_, ()>(()));
		record_result(OpKind::Refresh, &Err::<(), _>(()));
		record_op_outcome(OpKind::Sign, OpOutcome::Attempt);
	}
}
