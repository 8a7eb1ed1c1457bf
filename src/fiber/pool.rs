use std::sync::Mutex;

use log::trace;

use crate::fiber::{Fiber, Start, DEFAULT_STACK_SIZE};

struct Data {
	pool: Vec<Fiber>,
	active: u64
}

impl Data {
	const fn new() -> Self {
		Self { pool: Vec::new(), active: 0 }
	}
}

/// A pool of spare fiber stacks, reused across fiber spawns so a
/// short-lived fiber doesn't pay for a fresh `mmap`/`mprotect` every time.
///
/// Every [`Scheduler`](crate::scheduler::Scheduler) owns one.
pub struct Pool {
	data: Mutex<Data>
}

impl Pool {
	#[must_use]
	pub const fn new() -> Self {
		Self { data: Mutex::new(Data::new()) }
	}

	/// Construct a fiber ready to run `start`, reusing a spare stack from the
	/// pool when one is available and `stack_size` either wasn't requested
	/// or matches what spare stacks are sized at ([`DEFAULT_STACK_SIZE`]).
	/// A non-default request always maps a fresh stack of exactly that size
	/// instead, since every spare in the pool is a default-sized mapping.
	///
	/// # Panics
	/// if allocating a fresh stack fails
	#[allow(clippy::unwrap_used)]
	#[must_use]
	pub fn new_fiber(&self, start: Start, stack_size: Option<usize>) -> Fiber {
		let wants_default = stack_size.is_none_or(|size| size <= DEFAULT_STACK_SIZE);

		let fiber = if wants_default {
			let mut data = self.data.lock().unwrap();

			data.active = data.active.checked_add(1).expect("fiber count overflow");
			data.pool.pop()
		} else {
			let mut data = self.data.lock().unwrap();

			data.active = data.active.checked_add(1).expect("fiber count overflow");

			None
		};

		match fiber {
			Some(mut fiber) => {
				trace!("reusing stack for fiber");

				/* Safety: fiber was exited to us, its stack is idle */
				unsafe { fiber.set_start(start) };

				fiber
			}

			None => {
				trace!("mapping new stack for fiber");

				Fiber::with_start_and_stack_size(start, stack_size.unwrap_or(DEFAULT_STACK_SIZE))
			}
		}
	}

	const fn ideal_spares(active: u64) -> u64 {
		const RATIO_PERCENT: u64 = 20;

		#[allow(clippy::arithmetic_side_effects)]
		(active * RATIO_PERCENT / 100 + 16)
	}

	/// # Safety
	/// `fiber` must already be exited (not running)
	pub unsafe fn return_fiber(&self, mut fiber: Fiber) {
		#[allow(clippy::unwrap_used)]
		let mut data = self.data.lock().unwrap();

		data.active = data.active.checked_sub(1).expect("fiber count underflow");

		let ideal = Self::ideal_spares(data.active);

		if ideal > data.pool.len() as u64 && data.pool.try_reserve(1).is_ok() {
			trace!("keeping spare fiber stack");

			fiber.discard_stack();
			data.pool.push(fiber);
		} else {
			trace!("dropping spare fiber stack");
		}
	}
}

impl Default for Pool {
	fn default() -> Self {
		Self::new()
	}
}
