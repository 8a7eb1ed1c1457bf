//! Component H: bounded and unbounded fiber-aware channels.
//!
//! Grounded in `boost::fibers::buffered_channel`/`unbuffered_channel`
//! (`examples/original_source/include/boost/fiber/buffered_channel.hpp`):
//! a spinlock-guarded queue plus two FIFO wait lists (blocked producers,
//! blocked consumers), built the same way as [`crate::sync::mutex`]'s
//! `RawMutex` — link the waiting fiber into the relevant list, release the
//! spinlock via the scheduler's post-switch action, suspend, and re-check
//! the link on resume to tell a real wake-up from a timeout or
//! interruption race.
//!
//! Error enum names follow `std::sync::mpsc` rather than this crate's own
//! `Result<T, crate::error::Error>`: a channel's "full"/"empty" outcomes
//! are routine control flow a caller branches on, not failures, so they
//! get their own small enums instead of an `ErrorKind` variant each.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::container::intrusive::LinkedList;
use crate::context::FiberContext;
use crate::error::err;
use crate::pointer::{Pin, Ptr, UnsafeCell};
use crate::scheduler;
use crate::sync::{wake, SpinLock};
use crate::this_fiber;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	Open,
	Closed
}

/// [`BoundedChannel::try_push`]/[`UnboundedChannel`] push outcomes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrySendError<T> {
	/// The channel is at its high-water mark. The value is handed back.
	Full(T),
	/// [`close`](BoundedChannel::close) was called; no further values will
	/// ever be accepted. The value is handed back.
	Closed(T)
}

/// [`BoundedChannel::push`]/[`UnboundedChannel::push`] outcomes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SendError<T> {
	Closed(T),
	/// `interrupt()` was called on this fiber while it was blocked pushing
	/// (spec §4.2's cancellation of a blocked channel push). The value is
	/// handed back.
	Interrupted(T)
}

/// [`BoundedChannel::push_wait_until`]/`push_for` outcomes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SendTimeoutError<T> {
	Timeout(T),
	Closed(T),
	/// See [`SendError::Interrupted`].
	Interrupted(T)
}

/// `try_pop` outcomes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TryRecvError {
	/// Nothing buffered right now; the channel is still open.
	Empty,
	/// The channel is closed and drained.
	Closed
}

/// `pop` outcomes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecvError {
	Closed,
	/// `interrupt()` was called on this fiber while it was blocked popping.
	Interrupted
}

/// `pop_wait_until`/`pop_for` outcomes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecvTimeoutError {
	Timeout,
	Closed,
	/// See [`RecvError::Interrupted`].
	Interrupted
}

/// A channel's high- and low-water marks (spec §3/§4.7): producers block at
/// `hwm`; a pop that leaves the queue at or below `lwm` wakes producers
/// back up — one of them if `lwm == hwm` (strict alternation), otherwise
/// every blocked producer (there's room for more than one to make progress).
#[derive(Clone, Copy)]
struct Watermarks {
	hwm: usize,
	lwm: usize
}

struct Raw<T> {
	lock: SpinLock,
	queue: UnsafeCell<VecDeque<T>>,
	watermarks: Option<Watermarks>,
	state: std::cell::Cell<State>,
	producers: LinkedList,
	consumers: LinkedList
}

impl<T> Raw<T> {
	fn new(watermarks: Option<Watermarks>) -> Box<Self> {
		let mut boxed = Box::new(Self {
			lock: SpinLock::new(),
			queue: UnsafeCell::new(VecDeque::new()),
			watermarks,
			state: std::cell::Cell::new(State::Open),
			producers: LinkedList::new(),
			consumers: LinkedList::new()
		});

		/* Safety: just boxed, at its final address, nothing linked yet */
		unsafe {
			boxed.producers.pin();
			boxed.consumers.pin();
		}

		boxed
	}

	fn len(&self) -> usize {
		self.lock.lock();

		/* Safety: spinlock held */
		let len = unsafe { self.queue.as_mut() }.len();

		self.lock.unlock();

		len
	}

	fn is_closed(&self) -> bool {
		self.lock.lock();

		let closed = self.state.get() == State::Closed;

		self.lock.unlock();

		closed
	}

	fn close(&self) {
		self.lock.lock();

		self.state.set(State::Closed);

		let mut drained = LinkedList::new();

		/* Safety: freshly created, empty, not linked into anything */
		unsafe { drained.pin() };

		/* Safety: `drained` is pinned and empty; both lists are pinned for
		 * this channel's lifetime */
		unsafe {
			self.producers.move_elements(&drained);
			self.consumers.move_elements(&drained);
		}

		self.lock.unlock();

		wake_all(&drained);
	}

	/// # Safety
	/// `self.lock` must be held by the caller
	unsafe fn has_room(&self) -> bool {
		/* Safety: guaranteed by caller */
		let len = unsafe { self.queue.as_mut() }.len();

		self.watermarks.is_none_or(|wm| len < wm.hwm)
	}

	/// Push without blocking.
	fn try_push(&self, value: T) -> Result<(), TrySendError<T>> {
		self.lock.lock();

		if self.state.get() == State::Closed {
			self.lock.unlock();

			return Err(TrySendError::Closed(value));
		}

		/* Safety: spinlock held */
		if !unsafe { self.has_room() } {
			self.lock.unlock();

			return Err(TrySendError::Full(value));
		}

		/* Safety: spinlock held */
		unsafe { self.queue.as_mut() }.push_back(value);

		/* Safety: pinned for the channel's lifetime */
		let woken = unsafe { self.consumers.pop_front() };

		self.lock.unlock();

		if let Some(node) = woken {
			/* Safety: just popped from our own consumers */
			unsafe { wake(node_to_context(node)) };
		}

		Ok(())
	}

	/// Pop without blocking.
	fn try_pop(&self) -> Result<T, TryRecvError> {
		self.lock.lock();

		/* Safety: spinlock held */
		let popped = unsafe { self.queue.as_mut() }.pop_front();
		let closed = self.state.get() == State::Closed;

		/* Safety: spinlock held */
		let len = unsafe { self.queue.as_mut() }.len();
		let mut woken = LinkedList::new();

		/* Safety: freshly created, empty, not linked into anything */
		unsafe { woken.pin() };

		if let (Some(_), Some(wm)) = (&popped, self.watermarks) {
			if len <= wm.lwm {
				/* Safety: both lists pinned for the channel's lifetime,
				 * `woken` just pinned above and empty */
				unsafe {
					if wm.lwm == wm.hwm {
						if let Some(node) = self.producers.pop_front() {
							woken.append(node);
						}
					} else {
						self.producers.move_elements(&woken);
					}
				}
			}
		}

		self.lock.unlock();

		/* Safety: we own `woken` exclusively and it's pinned for this scope */
		while let Some(node) = unsafe { woken.pop_front() } {
			/* Safety: just popped from our own producers, via `woken` */
			unsafe { wake(node_to_context(node)) };
		}

		match popped {
			Some(value) => Ok(value),
			None if closed => Err(TryRecvError::Closed),
			None => Err(TryRecvError::Empty)
		}
	}

	/// Block the calling fiber until there's room, the channel closes, or
	/// `deadline` passes.
	fn send_blocking(&self, mut value: T, deadline: Option<Instant>) -> Result<(), SendTimeoutError<T>> {
		loop {
			match self.try_push(value) {
				Ok(()) => return Ok(()),
				Err(TrySendError::Closed(back)) => return Err(SendTimeoutError::Closed(back)),
				Err(TrySendError::Full(back)) => value = back
			}

			if let Err(outcome) = self.park_on(&self.producers, deadline) {
				return Err(match outcome {
					ParkOutcome::Timeout => SendTimeoutError::Timeout(value),
					ParkOutcome::Closed => SendTimeoutError::Closed(value),
					ParkOutcome::Interrupted => SendTimeoutError::Interrupted(value)
				});
			}
		}
	}

	/// Block the calling fiber until a value is available, the channel
	/// closes and drains, or `deadline` passes.
	fn recv_blocking(&self, deadline: Option<Instant>) -> Result<T, RecvTimeoutError> {
		loop {
			match self.try_pop() {
				Ok(value) => return Ok(value),
				Err(TryRecvError::Closed) => return Err(RecvTimeoutError::Closed),
				Err(TryRecvError::Empty) => {}
			}

			if let Err(outcome) = self.park_on(&self.consumers, deadline) {
				return Err(match outcome {
					ParkOutcome::Timeout => RecvTimeoutError::Timeout,
					ParkOutcome::Closed => RecvTimeoutError::Closed,
					ParkOutcome::Interrupted => RecvTimeoutError::Interrupted
				});
			}
		}
	}

	/// Link the calling fiber into `list` and suspend it until woken,
	/// timed out, or the channel closes.
	///
	/// `Ok(())` means the fiber was woken normally (the caller should loop
	/// around and retry its operation); `Err` means it unlinked itself
	/// after a timeout or close and the caller should give up.
	fn park_on(&self, list: &LinkedList, deadline: Option<Instant>) -> Result<(), ParkOutcome> {
		this_fiber::interruption_point().map_err(|_| ParkOutcome::Interrupted)?;

		let ctx = this_fiber::current_context();

		self.lock.lock();

		if self.state.get() == State::Closed {
			self.lock.unlock();

			return Err(ParkOutcome::Closed);
		}

		/* Safety: `ctx` is the currently running fiber, pinned, and not
		 * linked into any other wait-like queue */
		unsafe { list.append(ctx.as_ref().wait_hook()) };

		let spin = Ptr::from(&self.lock);

		scheduler::with_current(|scheduler| {
			/* Safety: this fiber is the one currently running on
			 * `scheduler`; `spin` stays valid since `self` outlives the
			 * call */
			unsafe { scheduler.wait(deadline, move || spin.as_ref().unlock()) };
		})
		.expect("channel operation called with no scheduler running on this thread");

		self.lock.lock();

		let node = unsafe { ctx.as_ref().wait_hook() };
		/* Safety: `node` is pinned for as long as `ctx` is */
		let still_linked = unsafe { node.as_ref() }.linked();

		if still_linked {
			/* Safety: observed linked into `list` above */
			unsafe { list.remove(node) };
		}

		let closed = self.state.get() == State::Closed;

		self.lock.unlock();

		if !still_linked {
			/* handed off by a push/pop on the other side: go retry */
			return Ok(());
		}

		if closed {
			return Err(ParkOutcome::Closed);
		}

		if this_fiber::interruption_point().is_err() {
			return Err(ParkOutcome::Interrupted);
		}

		if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
			return Err(ParkOutcome::Timeout);
		}

		/* spurious wake; the caller's loop re-checks and parks again if
		 * nothing has actually changed */
		Ok(())
	}
}

enum ParkOutcome {
	Timeout,
	Closed,
	Interrupted
}

fn node_to_context(node: Ptr<crate::container::intrusive::Node>) -> Ptr<FiberContext> {
	/* Safety: every node ever linked into a channel's wait lists came from
	 * a live context's `wait_hook` */
	unsafe { crate::container_of!(node, FiberContext=>wait_hook) }.cast_const()
}

fn wake_all(list: &LinkedList) {
	/* Safety: caller owns `list` exclusively and it's pinned */
	while let Some(node) = unsafe { list.pop_front() } {
		/* Safety: just popped from `list` */
		unsafe { wake(node_to_context(node)) };
	}
}

/* Safety: every field is only ever touched while `lock` is held, and `T`
 * only crosses threads while owned by the queue under that same lock */
unsafe impl<T: Send> Send for Raw<T> {}
/* Safety: see above */
unsafe impl<T: Send> Sync for Raw<T> {}

/// A fixed-capacity, fiber-aware channel with high- and low-water marks.
///
/// Producers block while `len() >= hwm` and the channel is open; consumers
/// block while empty and open. A pop that leaves the queue at or below
/// `lwm` wakes blocked producers back up: just one if `lwm == hwm` (the
/// strict producer/consumer alternation of spec §8's bounded-channel
/// property), otherwise every one of them, since there's room for more than
/// one to make progress at once. After [`close`](Self::close), further
/// pushes are rejected and pops drain whatever remains before also
/// reporting closed.
pub struct BoundedChannel<T> {
	raw: Box<Raw<T>>
}

impl<T> BoundedChannel<T> {
	/// Create a bounded channel with the given high- and low-water marks.
	///
	/// # Errors
	/// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
	/// if `hwm == 0` or `hwm < lwm`.
	pub fn new(hwm: usize, lwm: usize) -> crate::error::Result<Self> {
		if hwm == 0 || lwm == 0 || hwm < lwm {
			return Err(err!(InvalidArgument, "bounded channel requires hwm >= lwm >= 1"));
		}

		Ok(Self { raw: Raw::new(Some(Watermarks { hwm, lwm })) })
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.raw.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.raw.is_closed()
	}

	/// Reject all future pushes; pops continue draining buffered values
	/// until empty, then report closed too. Idempotent.
	pub fn close(&self) {
		self.raw.close();
	}

	/// Push without blocking.
	///
	/// # Errors
	/// [`TrySendError::Full`] if at the high-water mark;
	/// [`TrySendError::Closed`] if closed. Both return the value back.
	pub fn try_push(&self, value: T) -> Result<(), TrySendError<T>> {
		self.raw.try_push(value)
	}

	/// Block the calling fiber until pushed or the channel closes.
	///
	/// # Errors
	/// [`SendError::Closed`]/[`SendError::Interrupted`], returning the value
	/// back.
	pub fn push(&self, value: T) -> Result<(), SendError<T>> {
		match self.raw.send_blocking(value, None) {
			Ok(()) => Ok(()),
			Err(SendTimeoutError::Closed(value)) => Err(SendError::Closed(value)),
			Err(SendTimeoutError::Interrupted(value)) => Err(SendError::Interrupted(value)),
			Err(SendTimeoutError::Timeout(_)) => unreachable!("no deadline given")
		}
	}

	/// As [`push`](Self::push), giving up at `deadline`.
	///
	/// # Errors
	/// [`SendTimeoutError::Timeout`]/[`SendTimeoutError::Closed`]
	pub fn push_wait_until(&self, value: T, deadline: Instant) -> Result<(), SendTimeoutError<T>> {
		self.raw.send_blocking(value, Some(deadline))
	}

	/// Relative-duration form of [`push_wait_until`](Self::push_wait_until).
	///
	/// # Errors
	/// see [`push_wait_until`](Self::push_wait_until)
	pub fn push_for(&self, value: T, timeout: Duration) -> Result<(), SendTimeoutError<T>> {
		self.push_wait_until(value, Instant::now() + timeout)
	}

	/// Pop without blocking.
	///
	/// # Errors
	/// [`TryRecvError::Empty`] if nothing is buffered and the channel is
	/// still open; [`TryRecvError::Closed`] if closed and drained.
	pub fn try_pop(&self) -> Result<T, TryRecvError> {
		self.raw.try_pop()
	}

	/// Block the calling fiber until a value is available or the channel
	/// closes and drains.
	///
	/// # Errors
	/// [`RecvError::Closed`]/[`RecvError::Interrupted`]
	pub fn pop(&self) -> Result<T, RecvError> {
		match self.raw.recv_blocking(None) {
			Ok(value) => Ok(value),
			Err(RecvTimeoutError::Closed) => Err(RecvError::Closed),
			Err(RecvTimeoutError::Interrupted) => Err(RecvError::Interrupted),
			Err(RecvTimeoutError::Timeout) => unreachable!("no deadline given")
		}
	}

	/// As [`pop`](Self::pop), giving up at `deadline`.
	///
	/// # Errors
	/// [`RecvTimeoutError::Timeout`]/[`RecvTimeoutError::Closed`]
	pub fn pop_wait_until(&self, deadline: Instant) -> Result<T, RecvTimeoutError> {
		self.raw.recv_blocking(Some(deadline))
	}

	/// Relative-duration form of [`pop_wait_until`](Self::pop_wait_until).
	///
	/// # Errors
	/// see [`pop_wait_until`](Self::pop_wait_until)
	pub fn pop_for(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
		self.pop_wait_until(Instant::now() + timeout)
	}
}

/* Safety: delegated to `Raw` */
unsafe impl<T: Send> Send for BoundedChannel<T> {}
/* Safety: delegated to `Raw` */
unsafe impl<T: Send> Sync for BoundedChannel<T> {}

/// An unbounded, fiber-aware queue: like [`BoundedChannel`] but `push`
/// never blocks (no high-water mark, so producers never park).
pub struct UnboundedChannel<T> {
	raw: Box<Raw<T>>
}

impl<T> UnboundedChannel<T> {
	#[must_use]
	pub fn new() -> Self {
		Self { raw: Raw::new(None) }
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.raw.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.raw.is_closed()
	}

	pub fn close(&self) {
		self.raw.close();
	}

	/// Push; only fails if the channel has been closed.
	///
	/// # Errors
	/// [`SendError::Closed`], returning the value back.
	pub fn push(&self, value: T) -> Result<(), SendError<T>> {
		match self.raw.try_push(value) {
			Ok(()) => Ok(()),
			Err(TrySendError::Closed(value)) => Err(SendError::Closed(value)),
			Err(TrySendError::Full(_)) => unreachable!("unbounded channel has no high-water mark")
		}
	}

	/// Pop without blocking.
	///
	/// # Errors
	/// see [`BoundedChannel::try_pop`]
	pub fn try_pop(&self) -> Result<T, TryRecvError> {
		self.raw.try_pop()
	}

	/// Block the calling fiber until a value is available or the channel
	/// closes and drains.
	///
	/// # Errors
	/// [`RecvError::Closed`]/[`RecvError::Interrupted`]
	pub fn pop(&self) -> Result<T, RecvError> {
		match self.raw.recv_blocking(None) {
			Ok(value) => Ok(value),
			Err(RecvTimeoutError::Closed) => Err(RecvError::Closed),
			Err(RecvTimeoutError::Interrupted) => Err(RecvError::Interrupted),
			Err(RecvTimeoutError::Timeout) => unreachable!("no deadline given")
		}
	}
}

impl<T> Default for UnboundedChannel<T> {
	fn default() -> Self {
		Self::new()
	}
}

/* Safety: delegated to `Raw` */
unsafe impl<T: Send> Send for UnboundedChannel<T> {}
/* Safety: delegated to `Raw` */
unsafe impl<T: Send> Sync for UnboundedChannel<T> {}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;
	use crate::scheduler::Scheduler;
	use crate::{spawn, this_fiber};

	#[test]
	fn zero_capacity_is_rejected() {
		assert_eq!(
			BoundedChannel::<i32>::new(0, 0).unwrap_err().kind(),
			crate::error::ErrorKind::InvalidArgument
		);
	}

	#[test]
	fn lwm_above_hwm_is_rejected() {
		assert_eq!(
			BoundedChannel::<i32>::new(1, 2).unwrap_err().kind(),
			crate::error::ErrorKind::InvalidArgument
		);
	}

	#[test]
	fn push_pop_round_trip() {
		let scheduler = Scheduler::new();
		let channel = Rc::new(BoundedChannel::<i32>::new(2, 1).unwrap());

		{
			let channel = Rc::clone(&channel);

			spawn::spawn(move || {
				channel.push(1).unwrap();
				channel.push(2).unwrap();

				assert_eq!(channel.pop().unwrap(), 1);
				assert_eq!(channel.pop().unwrap(), 2);
			})
			.detach();
		}

		scheduler.run();
	}

	#[test]
	fn backpressure_blocks_producer_until_consumer_pops() {
		let scheduler = Scheduler::new();
		let channel = Rc::new(BoundedChannel::<i32>::new(2, 1).unwrap());
		let order = Rc::new(RefCell::new(Vec::new()));

		{
			let channel = Rc::clone(&channel);
			let order = Rc::clone(&order);

			spawn::spawn(move || {
				channel.push(1).unwrap();
				channel.push(2).unwrap();
				order.borrow_mut().push("about to push 3");
				channel.push(3).unwrap();
				order.borrow_mut().push("pushed 3");
			})
			.detach();
		}

		{
			let channel = Rc::clone(&channel);
			let order = Rc::clone(&order);

			spawn::spawn(move || {
				this_fiber::yield_now();
				this_fiber::yield_now();
				order.borrow_mut().push("about to pop");
				assert_eq!(channel.pop().unwrap(), 1);
				order.borrow_mut().push("popped");
			})
			.detach();
		}

		scheduler.run();

		let order = order.borrow();

		assert_eq!(
			*order,
			vec!["about to push 3", "about to pop", "popped", "pushed 3"]
		);
	}

	#[test]
	fn close_drains_then_reports_closed() {
		let scheduler = Scheduler::new();
		let channel = Rc::new(BoundedChannel::<i32>::new(4, 1).unwrap());

		channel.push(1).unwrap();
		channel.push(2).unwrap();
		channel.close();

		{
			let channel = Rc::clone(&channel);

			spawn::spawn(move || {
				assert_eq!(channel.pop().unwrap(), 1);
				assert_eq!(channel.pop().unwrap(), 2);
				assert_eq!(channel.pop(), Err(RecvError::Closed));
				assert_eq!(channel.try_push(3), Err(TrySendError::Closed(3)));
			})
			.detach();
		}

		scheduler.run();
	}

	#[test]
	fn blocked_consumer_observes_close() {
		let scheduler = Scheduler::new();
		let channel = Rc::new(UnboundedChannel::<i32>::new());

		{
			let channel = Rc::clone(&channel);

			spawn::spawn(move || {
				assert_eq!(channel.pop(), Err(RecvError::Closed));
			})
			.detach();
		}

		spawn::spawn({
			let channel = Rc::clone(&channel);

			move || {
				this_fiber::yield_now();
				channel.close();
			}
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn interrupting_a_blocked_pop_returns_interrupted() {
		let scheduler = Scheduler::new();
		let channel = Rc::new(UnboundedChannel::<i32>::new());

		let handle = {
			let channel = Rc::clone(&channel);

			spawn::spawn(move || channel.pop())
		};

		spawn::spawn(move || {
			this_fiber::yield_now();
			handle.interrupt();

			assert_eq!(handle.join().unwrap(), Err(RecvError::Interrupted));
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn pop_below_low_water_mark_wakes_every_blocked_producer() {
		// hwm=4, lwm=2: three producers block once the channel is full; a
		// single pop that leaves the queue at 2 (<= lwm) should release all
		// three at once rather than just one, since lwm != hwm here.
		let scheduler = Scheduler::new();
		let channel = Rc::new(BoundedChannel::<i32>::new(4, 2).unwrap());
		let unblocked = Rc::new(RefCell::new(0));

		channel.push(1).unwrap();
		channel.push(2).unwrap();
		channel.push(3).unwrap();
		channel.push(4).unwrap();

		for _ in 0..3 {
			let channel = Rc::clone(&channel);
			let unblocked = Rc::clone(&unblocked);

			spawn::spawn(move || {
				channel.push(99).unwrap();
				*unblocked.borrow_mut() += 1;
			})
			.detach();
		}

		spawn::spawn({
			let channel = Rc::clone(&channel);
			let unblocked = Rc::clone(&unblocked);

			move || {
				this_fiber::yield_now();
				this_fiber::yield_now();
				this_fiber::yield_now();

				// still full: all three producers above are parked
				assert_eq!(*unblocked.borrow(), 0);

				// one pop takes the queue from 4 to 3, above lwm: no wake yet
				assert_eq!(channel.pop().unwrap(), 1);
				this_fiber::yield_now();
				assert_eq!(*unblocked.borrow(), 0);

				// the next pop takes it to 2 (== lwm): every blocked producer
				// wakes at once, not just one
				assert_eq!(channel.pop().unwrap(), 2);
				this_fiber::yield_now();
				this_fiber::yield_now();
				this_fiber::yield_now();

				assert_eq!(*unblocked.borrow(), 3);
			}
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn strict_alternation_when_hwm_equals_lwm() {
		let scheduler = Scheduler::new();
		let channel = Rc::new(BoundedChannel::<i32>::new(1, 1).unwrap());
		let order = Rc::new(RefCell::new(Vec::new()));

		channel.push(1).unwrap();

		{
			let channel = Rc::clone(&channel);
			let order = Rc::clone(&order);

			spawn::spawn(move || {
				channel.push(2).unwrap();
				order.borrow_mut().push("pushed 2");
				channel.push(3).unwrap();
				order.borrow_mut().push("pushed 3");
			})
			.detach();
		}

		{
			let channel = Rc::clone(&channel);
			let order = Rc::clone(&order);

			spawn::spawn(move || {
				this_fiber::yield_now();

				order.borrow_mut().push("about to pop 1");
				assert_eq!(channel.pop().unwrap(), 1);

				this_fiber::yield_now();
				this_fiber::yield_now();

				order.borrow_mut().push("about to pop 2");
				assert_eq!(channel.pop().unwrap(), 2);
			})
			.detach();
		}

		scheduler.run();

		let order = order.borrow();

		assert_eq!(
			*order,
			vec!["about to pop 1", "pushed 2", "about to pop 2", "pushed 3"]
		);
	}

	#[test]
	fn unbounded_channel_never_blocks_producer() {
		let scheduler = Scheduler::new();
		let channel = Rc::new(UnboundedChannel::<i32>::new());

		for i in 0..1000 {
			channel.push(i).unwrap();
		}

		{
			let channel = Rc::clone(&channel);

			spawn::spawn(move || {
				for i in 0..1000 {
					assert_eq!(channel.pop().unwrap(), i);
				}
			})
			.detach();
		}

		scheduler.run();
	}
}
