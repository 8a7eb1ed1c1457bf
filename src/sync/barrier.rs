//! Component G: a cyclic rendezvous barrier built directly on [`Mutex`] and
//! [`Condvar`].
//!
//! Grounded in `boost::fibers::barrier` (`examples/original_source/src/
//! barrier.cpp`): `current` counts down from `initial` each cycle; the
//! fiber that brings it to zero flips `cycle`, resets `current`, and wakes
//! everyone else, who were looping on `cycle` changing.

use crate::error::{err, Result};
use crate::sync::{Condvar, Mutex};

/// A reusable rendezvous point for a fixed number of fibers.
pub struct Barrier {
	initial: usize,
	mutex: Mutex,
	cond: Condvar,
	current: std::cell::Cell<usize>,
	cycle: std::cell::Cell<bool>
}

impl Barrier {
	/// Create a barrier that releases once `count` fibers have called
	/// [`wait`](Self::wait).
	///
	/// # Errors
	/// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
	/// if `count` is zero.
	pub fn new(count: usize) -> Result<Self> {
		if count == 0 {
			return Err(err!(InvalidArgument, "barrier count must be non-zero"));
		}

		Ok(Self {
			initial: count,
			mutex: Mutex::new(),
			cond: Condvar::new(),
			current: std::cell::Cell::new(count),
			cycle: std::cell::Cell::new(true)
		})
	}

	/// Block until `count` fibers (from this barrier's construction) have
	/// all called `wait`. Returns `true` to exactly one of them per cycle
	/// (the one that completed it), `false` to the rest.
	///
	/// # Errors
	/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting.
	pub fn wait(&self) -> Result<bool> {
		self.mutex.lock()?;

		let cycle = self.cycle.get();
		let current = self.current.get() - 1;

		self.current.set(current);

		let result = if current == 0 {
			self.cycle.set(!cycle);
			self.current.set(self.initial);
			self.cond.notify_all();

			true
		} else {
			let wait_result = self.cond.wait_while(&self.mutex, || self.cycle.get() == cycle);

			if let Err(error) = wait_result {
				self.mutex.unlock()?;

				return Err(error);
			}

			false
		};

		self.mutex.unlock()?;

		Ok(result)
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;
	use crate::scheduler::Scheduler;
	use crate::{spawn, this_fiber};

	#[test]
	fn zero_count_is_rejected() {
		assert!(Barrier::new(0).is_err());
	}

	#[test]
	fn only_the_last_arriver_gets_true() {
		let scheduler = Scheduler::new();
		let barrier = Rc::new(Barrier::new(3).unwrap());
		let winners = Rc::new(RefCell::new(0));

		for id in 0..3 {
			let barrier = Rc::clone(&barrier);
			let winners = Rc::clone(&winners);

			spawn::spawn(move || {
				/* stagger arrival so the last one isn't always fiber 0 */
				for _ in 0..id {
					this_fiber::yield_now();
				}

				if barrier.wait().unwrap() {
					*winners.borrow_mut() += 1;
				}
			})
			.detach();
		}

		scheduler.run();

		assert_eq!(*winners.borrow(), 1);
	}

	#[test]
	fn barrier_is_reusable_across_cycles() {
		let scheduler = Scheduler::new();
		let barrier = Rc::new(Barrier::new(2).unwrap());
		let cycles = Rc::new(RefCell::new(0));

		for _ in 0..2 {
			let barrier = Rc::clone(&barrier);
			let cycles = Rc::clone(&cycles);

			spawn::spawn(move || {
				for _ in 0..3 {
					if barrier.wait().unwrap() {
						*cycles.borrow_mut() += 1;
					}
				}
			})
			.detach();
		}

		scheduler.run();

		assert_eq!(*cycles.borrow(), 3);
	}
}
