//! Component J: fiber-specific storage.
//!
//! Each [`FiberContext`](crate::context::FiberContext) owns an [`FssMap`], a
//! small per-fiber slot table keyed by [`FssKey<T>`] tokens. Unlike the
//! original C++ design's `void*` + explicit destructor-callback pair, a slot
//! here is a `Box<dyn Any>`: dropping the map (when the fiber terminates)
//! runs each value's own `Drop` impl, which is the cleanup callback — no
//! separate function pointer to keep in sync with the stored type.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::this_fiber;

/// A typed key identifying one fiber-specific storage slot.
///
/// Keys are cheap to create (one atomic increment) and `Clone`/`Copy`;
/// create one `static` per logical slot, the same way callers create one
/// `thread_local!` per slot for thread-local storage.
pub struct FssKey<T> {
	id: usize,
	marker: PhantomData<fn() -> T>
}

impl<T: 'static> FssKey<T> {
	#[must_use]
	pub fn new() -> Self {
		static NEXT: AtomicUsize = AtomicUsize::new(0);

		Self { id: NEXT.fetch_add(1, Ordering::Relaxed), marker: PhantomData }
	}

	/// Run `f` with a reference to this slot's value on the *currently
	/// running* fiber, or `None` if unset.
	pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
		this_fiber::with_fss(|fss| f(fss.get(self)))
	}

	/// Set this slot's value on the currently running fiber, returning the
	/// previous value if any.
	pub fn set(&self, value: T) -> Option<T> {
		this_fiber::with_fss(|fss| fss.set(self, value))
	}

	/// Clear this slot's value on the currently running fiber, returning it
	/// if it was set.
	pub fn remove(&self) -> Option<T> {
		this_fiber::with_fss(|fss| fss.remove(self))
	}
}

impl<T: 'static> Default for FssKey<T> {
	fn default() -> Self {
		Self::new()
	}
}

/// The per-fiber slot table. Lives inside
/// [`FiberContext`](crate::context::FiberContext); dropped (running every
/// stored value's destructor) when the fiber terminates.
#[derive(Default)]
pub struct FssMap {
	slots: HashMap<usize, Box<dyn Any>>
}

impl FssMap {
	#[must_use]
	pub fn new() -> Self {
		Self { slots: HashMap::new() }
	}

	fn get<T: 'static>(&self, key: &FssKey<T>) -> Option<&T> {
		self.slots.get(&key.id).map(|value| {
			value
				.downcast_ref()
				.expect("fiber-specific storage slot type mismatch")
		})
	}

	fn set<T: 'static>(&mut self, key: &FssKey<T>, value: T) -> Option<T> {
		self.slots
			.insert(key.id, Box::new(value))
			.map(|previous| {
				*previous
					.downcast()
					.expect("fiber-specific storage slot type mismatch")
			})
	}

	fn remove<T: 'static>(&mut self, key: &FssKey<T>) -> Option<T> {
		self.slots.remove(&key.id).map(|value| {
			*value
				.downcast()
				.expect("fiber-specific storage slot type mismatch")
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn set_get_remove_round_trip() {
		let key: FssKey<u32> = FssKey::new();
		let mut map = FssMap::new();

		assert_eq!(map.get(&key), None);
		assert_eq!(map.set(&key, 7), None);
		assert_eq!(map.get(&key), Some(&7));
		assert_eq!(map.set(&key, 9), Some(7));
		assert_eq!(map.remove(&key), Some(9));
		assert_eq!(map.get(&key), None);
	}
}
