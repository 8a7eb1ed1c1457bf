//! Component G: the condition variable.
//!
//! Grounded in `boost::fibers::condition` (`examples/original_source/src/
//! condition.cpp`, `boost/fiber/condition.hpp`): `notify_one`/`notify_all`
//! swap the waiter deque out under a spinlock and call `set_ready` on each
//! entry outside the lock. `wait` itself is rebuilt around this crate's own
//! [`Scheduler::wait`](crate::scheduler::Scheduler::wait) post-switch-action
//! mechanism (spec §5) instead of the original's `enter_mtx_`/`check_mtx_`
//! pair, since that hand-off is exactly what the post-switch action already
//! gives every primitive in this crate.

use std::time::{Duration, Instant};

use crate::container::intrusive::LinkedList;
use crate::context::FiberContext;
use crate::error::Result;
use crate::pointer::{Pin, Ptr};
use crate::scheduler;
use crate::sync::mutex::Mutex;
use crate::sync::{wake, SpinLock};
use crate::this_fiber;

/// Whether a condition variable wait ended because it was notified or
/// because its deadline passed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WaitStatus {
	NoTimeout,
	Timeout
}

/// A fiber-aware condition variable, used together with a [`Mutex`].
///
/// Unlike `std::sync::Condvar`, `wait` takes the mutex by reference rather
/// than consuming a guard: this crate's [`Mutex`] has no RAII guard type
/// (mirroring `boost::fibers::mutex`), so the caller is responsible for
/// having locked `lock` before calling and for treating it as locked again
/// on return.
pub struct Condvar {
	lock: SpinLock,
	waiters: Box<LinkedList>
}

impl Condvar {
	#[must_use]
	pub fn new() -> Self {
		let mut waiters = Box::new(LinkedList::new());

		/* Safety: just boxed, at its final address, nothing linked yet */
		unsafe { waiters.pin() };

		Self { lock: SpinLock::new(), waiters }
	}

	/// Release `lock`, block until notified, then re-acquire `lock`.
	///
	/// May return spuriously (a forced wake-up raced the notification):
	/// callers that need a real condition should use
	/// [`wait_while`](Self::wait_while) or loop on their own predicate.
	///
	/// # Errors
	/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting. `lock` is re-acquired before returning
	/// even on error.
	pub fn wait(&self, lock: &Mutex) -> Result<()> {
		self.wait_until_inner(lock, None).map(|_| ())
	}

	/// As [`wait`](Self::wait), but gives up and returns
	/// [`WaitStatus::Timeout`] if not notified by `deadline`.
	///
	/// # Errors
	/// see [`wait`](Self::wait)
	pub fn wait_until(&self, lock: &Mutex, deadline: Instant) -> Result<WaitStatus> {
		self.wait_until_inner(lock, Some(deadline))
	}

	/// Relative-duration form of [`wait_until`](Self::wait_until).
	///
	/// # Errors
	/// see [`wait`](Self::wait)
	pub fn wait_for(&self, lock: &Mutex, timeout: Duration) -> Result<WaitStatus> {
		self.wait_until(lock, Instant::now() + timeout)
	}

	fn wait_until_inner(&self, lock: &Mutex, deadline: Option<Instant>) -> Result<WaitStatus> {
		this_fiber::interruption_point()?;

		let ctx = this_fiber::current_context();

		self.lock.lock();

		/* Safety: `ctx` is the currently running fiber, pinned, and not
		 * linked into any other wait-like queue: the caller holds `lock`,
		 * so it cannot itself be concurrently waiting on this condvar */
		unsafe { self.waiters.append(ctx.as_ref().wait_hook()) };

		self.lock.unlock();

		/* `Ptr` carries no lifetime, unlike `&Mutex`, so it can be moved
		 * into the `'static` post-switch closure below; `lock` outlives
		 * the switch since the caller keeps it locked until this call
		 * returns */
		let lock_ptr = Ptr::from(lock);

		/* the defining atomicity guarantee of `wait`: `lock` is only
		 * actually released by the post-switch action, after this fiber
		 * has fully stopped running, so no notifier can observe us linked
		 * into `waiters` before also observing `lock` released */
		scheduler::with_current(|scheduler| {
			/* Safety: this fiber is the one currently running on
			 * `scheduler`. The closure runs on the dispatcher's stack
			 * after we've already switched away, so it must not go
			 * through the owner-checked `Mutex::unlock` (this_fiber::id
			 * would no longer name the waiting fiber by then) */
			unsafe { scheduler.wait(deadline, move || lock_ptr.as_ref().unlock_unchecked()) };
		})
		.expect("Condvar::wait called with no scheduler running on this thread");

		self.lock.lock();

		let node = unsafe { ctx.as_ref().wait_hook() };
		/* Safety: `node` is pinned for as long as `ctx` is */
		let timed_out = unsafe { node.as_ref() }.linked();

		if timed_out {
			/* Safety: observed linked into our own waiters above */
			unsafe { self.waiters.remove(node) };
		}

		self.lock.unlock();

		let interrupted = this_fiber::interruption_point();

		lock.lock()?;

		interrupted?;

		Ok(if timed_out { WaitStatus::Timeout } else { WaitStatus::NoTimeout })
	}

	/// `wait(lock)` in a loop until `predicate` holds, ignoring spurious
	/// wake-ups.
	///
	/// # Errors
	/// see [`wait`](Self::wait)
	pub fn wait_while(&self, lock: &Mutex, mut predicate: impl FnMut() -> bool) -> Result<()> {
		while predicate() {
			self.wait(lock)?;
		}

		Ok(())
	}

	/// Wake one waiter, if any.
	pub fn notify_one(&self) {
		self.lock.lock();

		/* Safety: list is pinned for the condvar's lifetime */
		let woken = unsafe { self.waiters.pop_front() };

		self.lock.unlock();

		if let Some(node) = woken {
			/* Safety: every node in `waiters` came from a live context's
			 * `wait_hook` */
			let ctx: Ptr<FiberContext> =
				unsafe { crate::container_of!(node, FiberContext=>wait_hook) }.cast_const();

			/* Safety: just popped from our own waiters */
			unsafe { wake(ctx) };
		}
	}

	/// Wake every current waiter.
	pub fn notify_all(&self) {
		self.lock.lock();

		let mut drained = LinkedList::new();

		/* Safety: freshly created, not yet linked into anything */
		unsafe { drained.pin() };

		/* Safety: `drained` is pinned and empty */
		unsafe { self.waiters.move_elements(&drained) };

		self.lock.unlock();

		/* Safety: we own `drained` exclusively, and it's pinned for this
		 * scope */
		while let Some(node) = unsafe { drained.pop_front() } {
			let ctx: Ptr<FiberContext> =
				unsafe { crate::container_of!(node, FiberContext=>wait_hook) }.cast_const();

			/* Safety: just popped from `drained` */
			unsafe { wake(ctx) };
		}
	}
}

impl Default for Condvar {
	fn default() -> Self {
		Self::new()
	}
}

/* Safety: every field is only ever touched while `lock` is held */
unsafe impl Send for Condvar {}
/* Safety: see above */
unsafe impl Sync for Condvar {}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;
	use crate::scheduler::Scheduler;

	#[test]
	fn notify_one_wakes_a_single_waiter() {
		let scheduler = Scheduler::new();
		let mutex = Rc::new(Mutex::new());
		let cv = Rc::new(Condvar::new());
		let woken = Rc::new(RefCell::new(0));

		for _ in 0..2 {
			let mutex = Rc::clone(&mutex);
			let cv = Rc::clone(&cv);
			let woken = Rc::clone(&woken);

			crate::spawn::spawn(move || {
				mutex.lock().unwrap();
				cv.wait(&mutex).unwrap();
				*woken.borrow_mut() += 1;
				mutex.unlock().unwrap();
			})
			.detach();
		}

		crate::spawn::spawn({
			let mutex = Rc::clone(&mutex);
			let cv = Rc::clone(&cv);

			move || {
				/* let both waiters above block first */
				this_fiber::yield_now();
				this_fiber::yield_now();

				mutex.lock().unwrap();
				cv.notify_one();
				mutex.unlock().unwrap();
			}
		})
		.detach();

		scheduler.run();

		assert_eq!(*woken.borrow(), 1);
	}

	#[test]
	fn predicate_wait_survives_spurious_and_ordered_notify() {
		let scheduler = Scheduler::new();
		let mutex = Rc::new(Mutex::new());
		let cv = Rc::new(Condvar::new());
		let x = Rc::new(RefCell::new(0));
		let done = Rc::new(RefCell::new(0));

		for _ in 0..3 {
			let mutex = Rc::clone(&mutex);
			let cv = Rc::clone(&cv);
			let x = Rc::clone(&x);
			let done = Rc::clone(&done);

			crate::spawn::spawn(move || {
				mutex.lock().unwrap();
				cv.wait_while(&mutex, || *x.borrow() != 1).unwrap();
				*done.borrow_mut() += 1;
				mutex.unlock().unwrap();
			})
			.detach();
		}

		crate::spawn::spawn({
			let mutex = Rc::clone(&mutex);
			let cv = Rc::clone(&cv);
			let x = Rc::clone(&x);

			move || {
				this_fiber::yield_now();
				this_fiber::yield_now();
				this_fiber::yield_now();

				mutex.lock().unwrap();
				*x.borrow_mut() = 1;
				cv.notify_all();
				mutex.unlock().unwrap();
			}
		})
		.detach();

		scheduler.run();

		assert_eq!(*done.borrow(), 3);
	}
}
