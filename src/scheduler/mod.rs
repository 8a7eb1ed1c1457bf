//! Components C/D: one scheduler per OS thread, plus the public handle
//! ([`RemoteHandle`]) other threads use to wake a fiber parked here.
//!
//! Every switch a fiber performs — suspending to wait on a primitive,
//! yielding, terminating — goes back to this scheduler's own "dispatcher"
//! context (the [`FiberContext`] representing the thread's original stack).
//! [`Scheduler::run`] is the loop that runs there: pick the next ready
//! fiber via the [`policy`] and switch into it directly. Funnelling every
//! switch through one place keeps the hand-written assembly in
//! [`crate::fiber`] to exactly two call sites (dispatcher→worker,
//! worker→dispatcher) instead of needing to reason about arbitrary
//! worker-to-worker jumps.

pub mod policy;
pub mod properties;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::trace;

use crate::context::{FiberContext, FiberFlags, FiberState};
use crate::fiber::{Fiber, Pool, Start};
use crate::pointer::Ptr;
use crate::scheduler::policy::{FifoPolicy, SchedulingPolicy};
use crate::scheduler::properties::FiberProperties;

thread_local! {
	static CURRENT: Cell<Option<Ptr<Scheduler>>> = const { Cell::new(None) };
}

/// Run `f` with the calling thread's [`Scheduler`], or return `None` if no
/// scheduler is running on this thread.
pub fn with_current<R>(f: impl FnOnce(&Scheduler) -> R) -> Option<R> {
	CURRENT.with(|cell| {
		/* Safety: a scheduler only ever sets this to its own address, and
		 * clears it before being dropped */
		cell.get().map(|ptr| f(unsafe { ptr.as_ref() }))
	})
}

struct RemoteQueue {
	queue: Mutex<VecDeque<Ptr<FiberContext>>>,
	parked: Condvar
}

/// A cloneable, `Send`+`Sync` handle letting any thread wake a fiber parked
/// on this scheduler (component D's cross-thread half of `set_remote_ready`).
#[derive(Clone)]
pub struct RemoteHandle {
	remote: Arc<RemoteQueue>
}

/* Safety: the only thing ever pushed through the queue is a pointer to a
 * context that has already stopped running (it suspended before the handoff
 * was published), so no two threads ever touch its fields concurrently */
unsafe impl Send for RemoteHandle {}
/* Safety: see above; the queue itself is protected by its own mutex */
unsafe impl Sync for RemoteHandle {}

impl RemoteHandle {
	/// Wake `ctx` on the scheduler this handle points at.
	///
	/// # Safety
	/// `ctx` must have been suspended (not linked into any other queue) by
	/// the scheduler that is about to receive it, with
	/// [`FiberFlags::THREAD_AFFINITY`] unset
	pub unsafe fn set_remote_ready(&self, ctx: Ptr<FiberContext>) {
		#[allow(clippy::unwrap_used)]
		let mut queue = self.remote.queue.lock().unwrap();

		/* Safety: guaranteed by caller */
		unsafe { ctx.as_ref().set_state(FiberState::Migrating) };

		queue.push_back(ctx);
		self.remote.parked.notify_one();
	}
}

/// One scheduler, owning exactly one OS thread's fibers.
///
/// Not `Sync`: everything except [`RemoteHandle`] is only ever touched from
/// the thread that created it.
pub struct Scheduler {
	dispatcher: Box<FiberContext>,
	current: Cell<Ptr<FiberContext>>,
	policy: RefCell<Box<dyn SchedulingPolicy>>,
	sleeping: RefCell<Vec<(Instant, Ptr<FiberContext>)>>,
	remote: Arc<RemoteQueue>,
	spawned: Cell<u64>,
	pool: Pool,
	post_switch: RefCell<Option<Box<dyn FnOnce()>>>
}

impl Scheduler {
	/// Start a scheduler on the calling thread with the default FIFO
	/// policy. Panics if one is already running here.
	#[must_use]
	pub fn new() -> Box<Self> {
		Self::with_policy(Box::new(FifoPolicy::new()))
	}

	/// # Panics
	/// if a scheduler is already running on this thread
	#[must_use]
	pub fn with_policy(policy: Box<dyn SchedulingPolicy>) -> Box<Self> {
		let dispatcher = FiberContext::main();
		let current = Cell::new(Ptr::from(&*dispatcher));

		let this = Box::new(Self {
			dispatcher,
			current,
			policy: RefCell::new(policy),
			sleeping: RefCell::new(Vec::new()),
			remote: Arc::new(RemoteQueue { queue: Mutex::new(VecDeque::new()), parked: Condvar::new() }),
			spawned: Cell::new(0),
			pool: Pool::new(),
			post_switch: RefCell::new(None)
		});

		CURRENT.with(|cell| {
			assert!(cell.get().is_none(), "a scheduler is already running on this thread");

			cell.set(Some(Ptr::from(&*this)));
		});

		this
	}

	/// A cloneable handle other threads can use to wake a fiber parked here.
	#[must_use]
	pub fn remote_handle(&self) -> RemoteHandle {
		RemoteHandle { remote: Arc::clone(&self.remote) }
	}

	#[must_use]
	pub fn current(&self) -> Ptr<FiberContext> {
		self.current.get()
	}

	fn dispatcher_ptr(&self) -> Ptr<FiberContext> {
		Ptr::from(&*self.dispatcher)
	}

	/// Spawn a new fiber with entry point `start`, making it eligible to
	/// run. Returns the (not-yet-started) context. `stack_size` is a hint
	/// (spec §6's `Attributes::stack_size`): `None` uses
	/// [`crate::fiber::DEFAULT_STACK_SIZE`] and is eligible for the pool's
	/// spare-stack reuse; `Some` requests at least that many bytes, mapping
	/// a fresh stack when it doesn't match what spares are sized at.
	pub fn spawn(
		&self, start: Start, stack_size: Option<usize>, properties: Option<Box<dyn FiberProperties>>
	) -> Ptr<FiberContext> {
		let fiber = self.pool.new_fiber(start, stack_size);
		let ctx = Box::leak(FiberContext::with_fiber(fiber, properties));
		let ptr = Ptr::from(&*ctx);

		self.spawned.set(self.spawned.get() + 1);

		/* Safety: freshly constructed, pinned, not linked anywhere yet */
		unsafe { self.policy.borrow_mut().awakened(ptr) };

		ptr
	}

	/// Record a one-shot action to run immediately after the *next* switch
	/// completes, on the stack being switched into. Used to release a
	/// spinlock only once the calling fiber has safely stopped running —
	/// releasing it any earlier could let another thread resume the fiber
	/// (and, via work-stealing, run it on a different scheduler) while this
	/// one is still mid-switch.
	pub fn defer_until_switched(&self, action: impl FnOnce() + 'static) {
		*self.post_switch.borrow_mut() = Some(Box::new(action));
	}

	fn run_post_switch(&self) {
		if let Some(action) = self.post_switch.borrow_mut().take() {
			action();
		}
	}

	/// Switch from the currently running fiber to the dispatcher context,
	/// re-entering [`run`](Self::run)'s loop. The caller is responsible for
	/// having already updated the suspending fiber's state and linked it
	/// wherever it needs to be found again (a wait list, the sleep queue,
	/// nowhere at all for a cross-thread migration).
	///
	/// # Safety
	/// the calling fiber must be the one currently running on this
	/// scheduler, and must not be the dispatcher itself
	pub unsafe fn switch_to_dispatcher(&self) {
		let prev = self.current.get();
		let next = self.dispatcher_ptr();

		self.current.set(next);

		/* Safety: guaranteed by caller */
		unsafe {
			Fiber::switch(
				Ptr::from(prev.as_ref().fiber()).cast_mut(),
				Ptr::from(next.as_ref().fiber()).cast_mut()
			);
		}

		self.run_post_switch();
	}

	/// Suspend the current fiber (already marked `Waiting` and linked by
	/// the caller) and run whatever the policy picks next.
	///
	/// # Safety
	/// same as [`switch_to_dispatcher`](Self::switch_to_dispatcher)
	pub unsafe fn suspend_current(&self) {
		/* Safety: guaranteed by caller */
		unsafe { self.switch_to_dispatcher() };
	}

	/// Put the current fiber back on the ready queue and run something
	/// else, matching `this_fiber::yield_now`.
	///
	/// # Safety
	/// same as [`switch_to_dispatcher`](Self::switch_to_dispatcher)
	pub unsafe fn yield_current(&self) {
		let prev = self.current.get();

		/* Safety: `prev` is the running fiber, not linked anywhere */
		unsafe {
			prev.as_ref().set_state(FiberState::Ready);
			self.policy.borrow_mut().awakened(prev);
			self.switch_to_dispatcher();
		}
	}

	/// Park the current fiber on the sleep queue until `deadline`, then
	/// run whatever the policy picks next.
	///
	/// # Safety
	/// same as [`switch_to_dispatcher`](Self::switch_to_dispatcher)
	pub unsafe fn sleep_current_until(&self, deadline: Instant) {
		let prev = self.current.get();

		/* Safety: `prev` is the running fiber */
		unsafe { prev.as_ref().set_state(FiberState::Waiting) };

		self.sleeping.borrow_mut().push((deadline, prev));

		/* Safety: guaranteed by caller */
		unsafe { self.switch_to_dispatcher() };
	}

	/// Suspend the current fiber, which the caller has already linked into
	/// whatever wait list it needs to be found on again (a primitive's
	/// waiter queue, a `join` record's joiners list). If `deadline` is
	/// given, also registers a sleep-queue wake-up for it — this is the
	/// "timed wait" half of §4.3's `wait_until`; the caller distinguishes a
	/// real timeout from a race against a concurrent wake-up by checking,
	/// under its own spinlock after resuming, whether its wait hook is
	/// still linked.
	///
	/// `action` runs once the switch away from this fiber has completed
	/// (the "post-switch action" of §5) — the sole place a spinlock may be
	/// released while still logically "held across" the switch.
	///
	/// # Safety
	/// same as [`switch_to_dispatcher`](Self::switch_to_dispatcher); the
	/// caller must have already linked this fiber wherever a waker will
	/// look for it
	pub unsafe fn wait(&self, deadline: Option<Instant>, action: impl FnOnce() + 'static) {
		let prev = self.current.get();

		/* Safety: `prev` is the running fiber */
		unsafe { prev.as_ref().set_state(FiberState::Waiting) };

		if let Some(deadline) = deadline {
			self.sleeping.borrow_mut().push((deadline, prev));
		}

		self.defer_until_switched(action);

		/* Safety: guaranteed by caller */
		unsafe { self.switch_to_dispatcher() };
	}

	/// Notify the scheduling policy that `ctx`'s properties just changed
	/// (spec §4.3 / `SchedulingPolicy::property_change`), letting a
	/// property-aware policy like [`policy::PriorityPolicy`] re-bucket it.
	/// A no-op if `ctx` has no properties attached.
	///
	/// # Safety
	/// `ctx` must be pinned and live
	pub unsafe fn notify_property_change(&self, ctx: Ptr<FiberContext>) {
		/* Safety: guaranteed by caller */
		let Some(properties) = (unsafe { ctx.as_ref() }.properties()) else {
			return;
		};

		self.policy.borrow_mut().property_change(ctx, properties);
	}

	/// Move a `Waiting` fiber back to `Ready` on this thread, per §4.3's
	/// `set_ready`: cancels any pending sleep-queue registration for it
	/// first. Used for same-thread wake-ups (`interrupt`, a primitive
	/// notifying a waiter known to live on this scheduler).
	///
	/// Cross-thread wake-ups must go through
	/// [`RemoteHandle::set_remote_ready`] instead — this method does not
	/// touch the remote inbox.
	///
	/// # Safety
	/// `ctx` must be `Waiting`, not linked into this scheduler's ready
	/// queue, and not linked into any wait list the caller still expects
	/// to observe it in
	pub unsafe fn set_ready(&self, ctx: Ptr<FiberContext>) {
		/* Safety: guaranteed by caller */
		unsafe { self.mark_ready(ctx) };
	}

	/// Shared by every "this fiber is now runnable again" path: cancels a
	/// pending sleep-queue entry (a no-op if there wasn't one) and hands
	/// the fiber to the policy.
	///
	/// # Safety
	/// same as [`set_ready`](Self::set_ready)
	unsafe fn mark_ready(&self, ctx: Ptr<FiberContext>) {
		self.sleeping.borrow_mut().retain(|&(_, c)| c != ctx);

		/* Safety: guaranteed by caller */
		unsafe {
			ctx.as_ref().set_state(FiberState::Ready);
			self.policy.borrow_mut().awakened(ctx);
		}
	}

	/// Terminate the current fiber: wake its joiners, reclaim its stack
	/// (returning it to the pool), and switch to the dispatcher. Never
	/// returns.
	///
	/// The control block itself outlives this call — only the stack is
	/// handed back to the pool here. A fiber's joiners read its `state()`
	/// after being woken below, which races this same call on the real
	/// scheduler (they don't actually run until the dispatcher picks them,
	/// but the context they'll read must still be valid when they do); the
	/// rest of the block survives until the scheduler's and the owning
	/// `JoinHandle`'s holds on it (`FiberContext::release`) are both gone.
	///
	/// # Safety
	/// the calling fiber must be the one currently running, must own no
	/// further live borrows into its own `FiberContext`, and must never be
	/// resumed again
	pub unsafe fn terminate_current(&self) -> ! {
		let prev = self.current.get();

		/* Safety: `prev` is the running fiber's context; still possibly
		 * referenced by a `JoinHandle`, so this only borrows it, it doesn't
		 * take ownership */
		let ctx = unsafe { prev.as_ref() };

		ctx.set_state(FiberState::Terminated);
		ctx.insert_flags(FiberFlags::TERMINATED);

		/* Safety: terminated; `joiners` is never linked into again */
		let woken = unsafe { ctx.wake_joiners() };

		self.requeue_all(woken);

		let next = self.dispatcher_ptr();
		self.current.set(next);

		let pool = Ptr::from(&self.pool);
		let to = Ptr::from(next.as_ref().fiber()).cast_mut();

		/* Safety: `ctx` is `Terminated` and never read again on this side */
		let fiber = unsafe { ctx.take_fiber() };

		trace!("fiber terminated");

		/* Safety: releases the scheduler's hold on `prev`; the `JoinHandle`
		 * (if any — `detach` releases it immediately otherwise) releases
		 * the other, whichever of the two runs last frees the block */
		unsafe { FiberContext::release(prev) };

		/* Safety: `to` is the dispatcher, always valid for this scheduler's
		 * lifetime */
		unsafe { fiber.exit_to_pool(to, pool) }
	}

	fn requeue_all(&self, list: crate::container::intrusive::LinkedList) {
		/* Safety: list is pinned by the caller (`wake_joiners`) */
		while let Some(node) = unsafe { list.pop_front() } {
			/* Safety: every node here came from a live context's
			 * `wait_hook` */
			let ctx: Ptr<FiberContext> =
				unsafe { crate::container_of!(node, FiberContext=>wait_hook) }.cast_const();

			/* Safety: `ctx` is live and was just unlinked */
			unsafe { self.mark_ready(ctx) };
		}
	}

	fn drain_remote(&self) {
		#[allow(clippy::unwrap_used)]
		let mut queue = self.remote.queue.lock().unwrap();

		while let Some(ctx) = queue.pop_front() {
			/* Safety: handed to us by `RemoteHandle::set_remote_ready`,
			 * which guarantees the fiber isn't linked anywhere else. It may
			 * still carry a stale sleep-queue registration (e.g. a timed
			 * condvar wait that got notified before its deadline) —
			 * `mark_ready` cancels that. */
			unsafe { self.mark_ready(ctx) };
		}
	}

	fn wake_expired_sleepers(&self) {
		let now = Instant::now();
		let mut sleeping = self.sleeping.borrow_mut();
		let mut woken = Vec::new();

		sleeping.retain(|&(deadline, ctx)| {
			if deadline <= now {
				woken.push(ctx);

				false
			} else {
				true
			}
		});

		drop(sleeping);

		for ctx in woken {
			/* Safety: `ctx` was only linked into `sleeping`, not any
			 * primitive's wait list (a timed wait that fires the timeout
			 * side must unlink itself from the primitive first) */
			unsafe {
				ctx.as_ref().set_state(FiberState::Ready);
				self.policy.borrow_mut().awakened(ctx);
			}
		}
	}

	fn next_deadline(&self) -> Option<Instant> {
		self.sleeping.borrow().iter().map(|&(deadline, _)| deadline).min()
	}

	/// Run the dispatch loop until there is nothing left to do: no ready
	/// fiber, no sleeper, no outstanding spawned fiber that hasn't yet
	/// terminated.
	///
	/// Call this from the thread that created the [`Scheduler`].
	pub fn run(&self) {
		loop {
			self.drain_remote();
			self.wake_expired_sleepers();

			let mut next = self.policy.borrow_mut().pick_next();

			if next.is_none() {
				next = self.policy.borrow_mut().steal();
			}

			if let Some(next) = next {
				self.current.set(next);

				/* Safety: `next` came from the policy, which only ever
				 * hands back fibers that were `awakened` with a live,
				 * pinned context */
				unsafe {
					next.as_ref().set_state(FiberState::Running);

					Fiber::switch(
						Ptr::from(self.dispatcher.fiber()).cast_mut(),
						Ptr::from(next.as_ref().fiber()).cast_mut()
					);
				}

				self.run_post_switch();

				continue;
			}

			if self.sleeping.borrow().is_empty() {
				break;
			}

			self.park_until_next_event();
		}
	}

	fn park_until_next_event(&self) {
		#[allow(clippy::unwrap_used)]
		let queue = self.remote.queue.lock().unwrap();

		if !queue.is_empty() {
			return;
		}

		let Some(deadline) = self.next_deadline() else {
			/* nothing sleeping and nothing remote pending: park
			 * indefinitely until a remote wake arrives */
			#[allow(clippy::unwrap_used)]
			let _queue = self.remote.parked.wait(queue).unwrap();

			return;
		};

		let timeout = deadline.saturating_duration_since(Instant::now());

		#[allow(clippy::unwrap_used)]
		let _ = self.remote.parked.wait_timeout(queue, timeout.max(Duration::from_millis(0))).unwrap();
	}
}

impl Drop for Scheduler {
	fn drop(&mut self) {
		CURRENT.with(|cell| cell.set(None));
	}
}

/* Safety: a `Scheduler` is only ever touched from the thread that created
 * it, via thread-local lookup; `RemoteHandle` is the cross-thread surface */
unsafe impl Send for Scheduler {}
