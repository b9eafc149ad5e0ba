//! Per-thread session pool.
//!
//! Each OS thread that acquires from a [`SessionPool`] lazily gets its own session and keeps
//! getting that same session afterwards, so keep-alive connections are reused without a shared
//! lock. Sessions are never returned to the pool; thread affinity is the release mechanism.
//! Sessions are dropped together with the pool. A thread that exits leaves its session behind
//! for the next thread that takes over its slot.

// std
use std::ops::Deref;
// crates.io
use thread_local::ThreadLocal;
// self
use crate::_prelude::*;

type SessionFactory<S> = Box<dyn Fn() -> Result<S> + Send + Sync>;

/// Thread-sharded cache of reusable sessions created by a factory.
pub struct SessionPool<S>
where
	S: Send,
{
	sessions: ThreadLocal<S>,
	factory: SessionFactory<S>,
}
impl<S> SessionPool<S>
where
	S: Send,
{
	/// Creates an empty pool that builds sessions with `factory` on first use per thread.
	pub fn new<F>(factory: F) -> Self
	where
		F: 'static + Fn() -> Result<S> + Send + Sync,
	{
		Self { sessions: ThreadLocal::new(), factory: Box::new(factory) }
	}

	/// Borrows the calling thread's session, creating it on first use.
	///
	/// A failed factory call leaves the slot empty so the next acquisition retries.
	pub fn acquire(&self) -> Result<ScopedSession<'_, S>> {
		self.sessions.get_or_try(|| (self.factory)()).map(ScopedSession)
	}
}
impl<S> SessionPool<S>
where
	S: Send + Sync,
{
	/// Number of sessions created so far.
	pub fn len(&self) -> usize {
		self.sessions.iter().count()
	}

	/// Returns `true` when no thread has acquired a session yet.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl<S> Debug for SessionPool<S>
where
	S: Send,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SessionPool(..)")
	}
}

/// Session borrowed from a [`SessionPool`] for the duration of one operation.
#[derive(Debug)]
pub struct ScopedSession<'a, S>(&'a S);
impl<S> Deref for ScopedSession<'_, S> {
	type Target = S;

	fn deref(&self) -> &Self::Target {
		self.0
	}
}
