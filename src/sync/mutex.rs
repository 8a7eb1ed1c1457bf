//! Component F: the mutex family — plain, recursive, and the `_until`
//! timed variants, all built on one internal [`RawMutex`].
//!
//! Grounded in `boost::fibers::{mutex, recursive_mutex, timed_mutex,
//! recursive_timed_mutex}` (`examples/original_source/include/boost/fiber/
//! {mutex,recursive_mutex,timed_mutex,recursive_timed_mutex}.hpp`): one
//! owner slot, a FIFO wait queue protected by a [`SpinLock`], and direct
//! hand-off on `unlock()` — the woken waiter resumes already owning the
//! mutex instead of racing a fresh `try_lock()` against whoever else shows
//! up (spec §4.5's fairness requirement).

use std::cell::Cell;
use std::time::{Duration, Instant};

use crate::container::intrusive::LinkedList;
use crate::context::{FiberContext, FiberId};
use crate::error::{err, Result};
use crate::pointer::{Pin, Ptr};
use crate::scheduler;
use crate::sync::{wake, SpinLock};
use crate::this_fiber;

struct RawMutex {
	lock: SpinLock,
	owner: Cell<Option<FiberId>>,
	depth: Cell<u32>,
	waiters: LinkedList,
	recursive: bool
}

impl RawMutex {
	/// Boxed so the waiter list is pinned at its final heap address from
	/// construction: a `RawMutex` may be freely moved by value (e.g. into
	/// an `Rc`/`Arc`) without ever invalidating the intrusive list inside
	/// the box, mirroring [`crate::context::FiberContext`]'s `pin_boxed`.
	fn new(recursive: bool) -> Box<Self> {
		let mut boxed = Box::new(Self {
			lock: SpinLock::new(),
			owner: Cell::new(None),
			depth: Cell::new(0),
			waiters: LinkedList::new(),
			recursive
		});

		/* Safety: just boxed, at its final address, nothing linked yet */
		unsafe { boxed.waiters.pin() };

		boxed
	}

	/// Attempt to acquire without blocking.
	fn try_lock(&self) -> Result<bool> {
		self.lock.lock();

		let id = this_fiber::id();
		let result = match self.owner.get() {
			None => {
				self.owner.set(Some(id));
				self.depth.set(1);

				Ok(true)
			}

			Some(owner) if owner == id => {
				if self.recursive {
					self.depth.set(self.depth.get().saturating_add(1));

					Ok(true)
				} else {
					Err(err!(ResourceDeadlockWouldOccur))
				}
			}

			Some(_) => Ok(false)
		};

		self.lock.unlock();
		result
	}

	/// Block until acquired or `deadline` elapses. `Ok(true)` means
	/// acquired, `Ok(false)` means `deadline` passed first.
	fn lock_until(&self, deadline: Option<Instant>) -> Result<bool> {
		loop {
			if self.try_lock()? {
				return Ok(true);
			}

			this_fiber::interruption_point()?;

			let ctx = this_fiber::current_context();

			self.lock.lock();

			/* the owner may have unlocked between our failed `try_lock`
			 * above and re-acquiring the spinlock here */
			if self.owner.get().is_none() {
				self.owner.set(Some(this_fiber::id()));
				self.depth.set(1);
				self.lock.unlock();

				return Ok(true);
			}

			/* Safety: `ctx` is the currently running fiber, pinned, and
			 * not linked into any other wait-like queue */
			unsafe { self.waiters.append(ctx.as_ref().wait_hook()) };

			let spin = Ptr::from(&self.lock);

			scheduler::with_current(|scheduler| {
				/* Safety: this fiber is the one currently running on
				 * `scheduler`; `spin` stays valid for the closure's
				 * lifetime since `self` outlives the call */
				unsafe { scheduler.wait(deadline, move || spin.as_ref().unlock()) };
			})
			.expect("Mutex::lock called with no scheduler running on this thread");

			self.lock.lock();

			let node = unsafe { ctx.as_ref().wait_hook() };

			/* Safety: `node` is pinned for as long as `ctx` is */
			if unsafe { node.as_ref() }.linked() {
				/* nobody handed us the mutex: a timeout or a forced
				 * wake-up (interrupt) raced our suspend. Either way we
				 * must remove ourselves before anyone else pops us */
				/* Safety: observed linked into our own waiters above */
				unsafe { self.waiters.remove(node) };
				self.lock.unlock();

				this_fiber::interruption_point()?;

				if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
					return Ok(false);
				}

				continue;
			}

			self.lock.unlock();

			return Ok(true);
		}
	}

	fn unlock(&self) -> Result<()> {
		self.lock.lock();

		if self.owner.get() != Some(this_fiber::id()) {
			self.lock.unlock();

			return Err(err!(OperationNotPermitted));
		}

		let depth = self.depth.get().saturating_sub(1);

		self.depth.set(depth);

		if depth > 0 {
			self.lock.unlock();

			return Ok(());
		}

		self.release_locked();

		Ok(())
	}

	/// Release the mutex unconditionally, bypassing the owner/depth check.
	///
	/// Used only by [`crate::sync::condvar::Condvar::wait`]'s post-switch
	/// action: that closure runs on the dispatcher's stack after the
	/// waiting fiber has already switched away, at which point
	/// `this_fiber::id()` no longer names the fiber that locked `self` (it
	/// names whatever the scheduler is about to run next). The condvar's
	/// own contract — `wait` is only ever called by the fiber currently
	/// holding `lock` — is what makes skipping the identity check sound
	/// here.
	pub(crate) fn unlock_unchecked(&self) {
		self.lock.lock();
		self.depth.set(0);
		self.release_locked();
	}

	/// Pop the next waiter (if any) and hand it ownership, or clear
	/// `owner` if the wait queue is empty. Releases `self.lock`.
	///
	/// # Safety precondition
	/// `self.lock` must be held, and `self.depth` must already be `0`.
	fn release_locked(&self) {
		/* Safety: the wait queue is pinned for the mutex's lifetime */
		let next = unsafe { self.waiters.pop_front() };

		match next {
			Some(node) => {
				/* Safety: every node in `waiters` came from a live
				 * context's `wait_hook` */
				let ctx: Ptr<FiberContext> =
					unsafe { crate::container_of!(node, FiberContext=>wait_hook) }.cast_const();

				/* Safety: `ctx` is live */
				self.owner.set(Some(unsafe { ctx.as_ref() }.id()));
				self.depth.set(1);
				self.lock.unlock();

				/* Safety: just popped from our own waiters */
				unsafe { wake(ctx) };
			}
			None => {
				self.owner.set(None);
				self.lock.unlock();
			}
		}
	}
}

/* Safety: every field is only ever touched while `lock` is held */
unsafe impl Send for RawMutex {}
/* Safety: see above */
unsafe impl Sync for RawMutex {}

/// A non-recursive, fiber-aware mutex. Locking it from the fiber that
/// already holds it raises [`ErrorKind::ResourceDeadlockWouldOccur`](crate::error::ErrorKind::ResourceDeadlockWouldOccur)
/// instead of deadlocking.
pub struct Mutex {
	raw: Box<RawMutex>
}

impl Mutex {
	#[must_use]
	pub fn new() -> Self {
		Self { raw: RawMutex::new(false) }
	}

	/// Block the calling fiber until the mutex is acquired.
	///
	/// # Errors
	/// [`ErrorKind::ResourceDeadlockWouldOccur`](crate::error::ErrorKind::ResourceDeadlockWouldOccur)
	/// if already held by the calling fiber;
	/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting.
	pub fn lock(&self) -> Result<()> {
		self.raw.lock_until(None).map(|_| ())
	}

	/// Acquire the mutex if it is immediately available, without blocking.
	///
	/// # Errors
	/// see [`lock`](Self::lock)
	pub fn try_lock(&self) -> Result<bool> {
		self.raw.try_lock()
	}

	/// Release the mutex.
	///
	/// # Errors
	/// [`ErrorKind::OperationNotPermitted`](crate::error::ErrorKind::OperationNotPermitted)
	/// if the calling fiber does not own it.
	pub fn unlock(&self) -> Result<()> {
		self.raw.unlock()
	}

	/// See [`RawMutex::unlock_unchecked`].
	pub(crate) fn unlock_unchecked(&self) {
		self.raw.unlock_unchecked();
	}
}

impl Default for Mutex {
	fn default() -> Self {
		Self::new()
	}
}

/// A [`Mutex`] with `try_lock_until`/`try_lock_for`, mirroring
/// `boost::fibers::timed_mutex`.
pub struct TimedMutex {
	raw: Box<RawMutex>
}

impl TimedMutex {
	#[must_use]
	pub fn new() -> Self {
		Self { raw: RawMutex::new(false) }
	}

	/// See [`Mutex::lock`].
	pub fn lock(&self) -> Result<()> {
		self.raw.lock_until(None).map(|_| ())
	}

	/// See [`Mutex::try_lock`].
	pub fn try_lock(&self) -> Result<bool> {
		self.raw.try_lock()
	}

	/// Block until acquired or `deadline` passes, whichever comes first.
	///
	/// # Errors
	/// see [`Mutex::lock`]
	pub fn try_lock_until(&self, deadline: Instant) -> Result<bool> {
		self.raw.lock_until(Some(deadline))
	}

	/// Relative-duration form of [`try_lock_until`](Self::try_lock_until).
	///
	/// # Errors
	/// see [`Mutex::lock`]
	pub fn try_lock_for(&self, timeout: Duration) -> Result<bool> {
		self.try_lock_until(Instant::now() + timeout)
	}

	/// See [`Mutex::unlock`].
	pub fn unlock(&self) -> Result<()> {
		self.raw.unlock()
	}
}

impl Default for TimedMutex {
	fn default() -> Self {
		Self::new()
	}
}

/// A mutex the owning fiber may lock more than once; `unlock` only
/// releases it once the matching number of `unlock`s have been made.
pub struct RecursiveMutex {
	raw: Box<RawMutex>
}

impl RecursiveMutex {
	#[must_use]
	pub fn new() -> Self {
		Self { raw: RawMutex::new(true) }
	}

	/// Block the calling fiber until the mutex is acquired. Never raises
	/// `ResourceDeadlockWouldOccur`: re-entering is the whole point.
	///
	/// # Errors
	/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting.
	pub fn lock(&self) -> Result<()> {
		self.raw.lock_until(None).map(|_| ())
	}

	/// See [`Mutex::try_lock`].
	pub fn try_lock(&self) -> Result<bool> {
		self.raw.try_lock()
	}

	/// See [`Mutex::unlock`].
	pub fn unlock(&self) -> Result<()> {
		self.raw.unlock()
	}
}

impl Default for RecursiveMutex {
	fn default() -> Self {
		Self::new()
	}
}

/// [`RecursiveMutex`] plus `try_lock_until`/`try_lock_for`.
pub struct RecursiveTimedMutex {
	raw: Box<RawMutex>
}

impl RecursiveTimedMutex {
	#[must_use]
	pub fn new() -> Self {
		Self { raw: RawMutex::new(true) }
	}

	/// See [`RecursiveMutex::lock`].
	pub fn lock(&self) -> Result<()> {
		self.raw.lock_until(None).map(|_| ())
	}

	/// See [`Mutex::try_lock`].
	pub fn try_lock(&self) -> Result<bool> {
		self.raw.try_lock()
	}

	/// See [`TimedMutex::try_lock_until`].
	///
	/// # Errors
	/// see [`RecursiveMutex::lock`]
	pub fn try_lock_until(&self, deadline: Instant) -> Result<bool> {
		self.raw.lock_until(Some(deadline))
	}

	/// See [`TimedMutex::try_lock_for`].
	///
	/// # Errors
	/// see [`RecursiveMutex::lock`]
	pub fn try_lock_for(&self, timeout: Duration) -> Result<bool> {
		self.try_lock_until(Instant::now() + timeout)
	}

	/// See [`Mutex::unlock`].
	pub fn unlock(&self) -> Result<()> {
		self.raw.unlock()
	}
}

impl Default for RecursiveTimedMutex {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;
	use crate::scheduler::Scheduler;

	#[test]
	fn uncontended_lock_unlock_round_trips() {
		let scheduler = Scheduler::new();
		let mutex = Rc::new(Mutex::new());

		{
			let mutex = Rc::clone(&mutex);

			crate::spawn::spawn(move || {
				mutex.lock().unwrap();
				assert!(!mutex.try_lock().is_ok_and(|acquired| acquired));
				mutex.unlock().unwrap();
			})
			.detach();
		}

		scheduler.run();
	}

	#[test]
	fn contended_lock_hands_off_in_fifo_order() {
		let scheduler = Scheduler::new();
		let mutex = Rc::new(Mutex::new());
		let order = Rc::new(RefCell::new(Vec::new()));

		crate::spawn::spawn({
			let mutex = Rc::clone(&mutex);
			let order = Rc::clone(&order);

			move || {
				mutex.lock().unwrap();

				for id in 0..3 {
					let mutex = Rc::clone(&mutex);
					let order = Rc::clone(&order);

					crate::spawn::spawn(move || {
						mutex.lock().unwrap();
						order.borrow_mut().push(id);
						mutex.unlock().unwrap();
					})
					.detach();
				}

				/* let the three waiters above run and block on `mutex`
				 * before handing it off, so the hand-off order below is
				 * actually exercised rather than just an uncontended
				 * lock/unlock */
				this_fiber::yield_now();

				mutex.unlock().unwrap();
			}
		})
		.detach();

		scheduler.run();

		assert_eq!(*order.borrow(), vec![0, 1, 2]);
	}

	#[test]
	fn recursive_mutex_allows_reentry() {
		let scheduler = Scheduler::new();
		let mutex = Rc::new(RecursiveMutex::new());

		{
			let mutex = Rc::clone(&mutex);

			crate::spawn::spawn(move || {
				mutex.lock().unwrap();
				mutex.lock().unwrap();
				mutex.unlock().unwrap();
				mutex.unlock().unwrap();
				assert!(mutex.try_lock().unwrap());
				mutex.unlock().unwrap();
			})
			.detach();
		}

		scheduler.run();
	}

	#[test]
	fn non_owner_unlock_is_rejected() {
		let scheduler = Scheduler::new();
		let mutex = Rc::new(Mutex::new());

		{
			let mutex = Rc::clone(&mutex);

			crate::spawn::spawn(move || {
				assert_eq!(mutex.unlock().unwrap_err().kind(), crate::error::ErrorKind::OperationNotPermitted);
			})
			.detach();
		}

		scheduler.run();
	}
}
