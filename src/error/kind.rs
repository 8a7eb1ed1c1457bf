use std::fmt::{self, Display, Formatter};

/// The closed taxonomy of errors this crate raises, per the library's
/// error handling design: routine outcomes (full channel, timeout) are
/// returned as plain enums from the call site instead, `ErrorKind` is
/// reserved for programming errors and interruption.
#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum ErrorKind {
	/// Raised at an interruption point on a fiber that had `interrupt()`
	/// called on it.
	FiberInterrupted,

	/// A `Promise`'s shared state was dropped before it was satisfied.
	BrokenPromise,

	/// A `Future` has no shared state, or its value was already consumed.
	FutureUninitialized,

	/// `Promise::set_value`/`set_exception` called on an already-satisfied
	/// shared state.
	PromiseAlreadySatisfied,

	/// `Future::share`/`get_future` called more than once.
	FutureAlreadyRetrieved,

	/// A `PackagedTask` was invoked or had its future requested without a
	/// callable installed. Part of the taxonomy for completeness (see
	/// `boost::fibers::packaged_task`'s default constructor, which leaves it
	/// without a shared state); this crate's own `PackagedTask::new` always
	/// requires a callable up front, so nothing in this crate can actually
	/// construct the uninitialized case this variant names.
	PackagedTaskUninitialized,

	/// A `PackagedTask` was invoked a second time without an intervening
	/// `reset`.
	TaskAlreadyStarted,

	/// Part of the taxonomy for completeness (`boost::fibers::packaged_task`
	/// is move-only, and using a moved-from one throws this); Rust's move
	/// semantics already make that a compile error here rather than a
	/// runtime one, so nothing in this crate raises it.
	TaskMoved,

	/// Self-lock on a non-recursive mutex.
	ResourceDeadlockWouldOccur,

	/// `unlock()` called by a fiber that does not own the mutex.
	OperationNotPermitted,

	/// Construction with invalid arguments (e.g. `hwm < lwm`, a barrier
	/// of size zero).
	InvalidArgument,

	/// A generic, uncategorized failure.
	Other
}

impl ErrorKind {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::FiberInterrupted => "fiber was interrupted",
			Self::BrokenPromise => "broken promise",
			Self::FutureUninitialized => "future has no shared state",
			Self::PromiseAlreadySatisfied => "promise already satisfied",
			Self::FutureAlreadyRetrieved => "future already retrieved",
			Self::PackagedTaskUninitialized => "packaged task has no callable",
			Self::TaskAlreadyStarted => "packaged task already started",
			Self::TaskMoved => "packaged task's callable was already moved out",
			Self::ResourceDeadlockWouldOccur => "resource deadlock would occur",
			Self::OperationNotPermitted => "operation not permitted",
			Self::InvalidArgument => "invalid argument",
			Self::Other => "other error"
		}
	}
}

impl Display for ErrorKind {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		fmt.write_str(self.as_str())
	}
}
