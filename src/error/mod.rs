//! The error taxonomy from the library's error handling design (spec §7):
//! a closed [`ErrorKind`] plus an [`Error`] wrapper, in the same shape as
//! the teacher crate's own `error` module (a `Result<T>` alias over a
//! `std::error::Error`-implementing wrapper type) but scoped to this
//! crate's own misuse/cancellation taxonomy instead of OS errors.

use std::error;
use std::fmt::{self, Debug, Display, Formatter};
use std::result;

mod kind;

pub use kind::ErrorKind;

pub type Result<T> = result::Result<T, Error>;

/// An error raised by the runtime: a programming error (misuse of a
/// primitive) or a cancellation ([`ErrorKind::FiberInterrupted`]).
///
/// Routine, expected outcomes (a channel being closed or full, a timed
/// wait expiring) are represented as plain return values, not `Error` —
/// see [`crate::sync::channel::TrySendError`] and friends.
///
/// `Copy`, so a [`crate::future::SharedFuture`] can hand the same
/// exception back to every observer without needing `Arc` or `dyn Any`
/// payload plumbing.
#[derive(Clone, Copy)]
pub struct Error {
	kind: ErrorKind,
	message: Option<&'static str>
}

impl Error {
	#[must_use]
	pub const fn new(kind: ErrorKind) -> Self {
		Self { kind, message: None }
	}

	#[must_use]
	pub const fn with_message(kind: ErrorKind, message: &'static str) -> Self {
		Self { kind, message: Some(message) }
	}

	#[must_use]
	pub const fn kind(&self) -> ErrorKind {
		self.kind
	}

	#[must_use]
	pub const fn is_interrupted(&self) -> bool {
		matches!(self.kind, ErrorKind::FiberInterrupted)
	}
}

impl Display for Error {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		match self.message {
			Some(message) => write!(fmt, "{}: {message}", self.kind),
			None => Display::fmt(&self.kind, fmt)
		}
	}
}

impl Debug for Error {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		fmt.debug_struct("Error")
			.field("kind", &self.kind)
			.field("message", &self.message)
			.finish()
	}
}

impl error::Error for Error {}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Self {
		Self::new(kind)
	}
}

/// Construct an [`Error`] with a fixed, static message, mirroring the
/// teacher crate's own `err!`-style error-construction convenience.
macro_rules! err {
	($kind:ident) => {
		$crate::error::Error::new($crate::error::ErrorKind::$kind)
	};

	($kind:ident, $message:literal) => {
		$crate::error::Error::with_message($crate::error::ErrorKind::$kind, $message)
	};
}

pub(crate) use err;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_kind() {
		let error = err!(ResourceDeadlockWouldOccur);

		assert!(error.to_string().contains("deadlock"));
		assert_eq!(error.kind(), ErrorKind::ResourceDeadlockWouldOccur);
	}

	#[test]
	fn is_interrupted_only_for_interrupted_kind() {
		assert!(err!(FiberInterrupted).is_interrupted());
		assert!(!err!(BrokenPromise).is_interrupted());
	}
}
