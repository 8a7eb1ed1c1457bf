//! Component I: one-shot promises and futures, built on the crate's own
//! [`crate::sync::Mutex`]/[`crate::sync::Condvar`] rather than any new
//! lower-level primitive.
//!
//! Grounded in `boost::fibers::promise`/`future`/`packaged_task`
//! (`examples/original_source/include/boost/fiber/future/{promise,
//! future,packaged_task}.hpp` and `future/detail/shared_state.hpp`): a
//! single-assignment shared state with a ready flag, a value-or-exception
//! slot, and a condition variable woken on assignment. Where the original
//! carries a `std::exception_ptr`, this crate carries a
//! [`crate::error::Error`] instead — see [`SharedFuture`] for why.

use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{err, Error, Result};
use crate::pointer::UnsafeCell;
use crate::sync::{Condvar, Mutex};
use crate::this_fiber;

/// The outcome of a timed wait on a [`Future`]/[`SharedFuture`], mirroring
/// `boost::fibers::future_status` minus `deferred`: nothing in this crate
/// runs a future's work lazily on first `wait`, so only the two outcomes
/// that can actually happen are modeled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FutureStatus {
	Ready,
	Timeout
}

/// A single external condition a [`SharedState`] notifies in addition to its
/// own `cond`, used by [`waitfor_any`] to block on several shared states at
/// once. Mirrors the "single external condition" spec §4.8 calls for,
/// without tying `SharedState` to any particular number of them.
struct WaitNode {
	mutex: Mutex,
	cond: Condvar,
	ready: Cell<bool>
}

/* Safety: every field is only read/written while `mutex` is held */
unsafe impl Send for WaitNode {}
/* Safety: see above */
unsafe impl Sync for WaitNode {}

impl WaitNode {
	fn new() -> Arc<Self> {
		Arc::new(Self { mutex: Mutex::new(), cond: Condvar::new(), ready: Cell::new(false) })
	}

	/// Mark ready and wake whoever's blocked in [`wait`](Self::wait).
	fn notify(&self) {
		// best-effort, matching `SharedState::break_promise`: a poisoned or
		// already-locked mutex here just means the waiter never blocks in
		// the first place (see the already-ready fast path in
		// `SharedState::register_waiter`), not a lost wakeup.
		if self.mutex.lock().is_ok() {
			self.ready.set(true);
			self.mutex.unlock().ok();
			self.cond.notify_all();
		}
	}

	/// Block until some registered [`SharedState`] calls [`notify`](Self::notify).
	///
	/// # Errors
	/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting.
	fn wait(&self) -> Result<()> {
		self.mutex.lock()?;
		let result = self.cond.wait_while(&self.mutex, || !self.ready.get());

		self.mutex.unlock()?;

		result
	}
}

struct SharedState<T> {
	mutex: Mutex,
	cond: Condvar,
	ready: Cell<bool>,
	value: UnsafeCell<Option<std::result::Result<T, Error>>>,
	future_retrieved: Cell<bool>,
	/// Waiters registered by [`waitfor_any`], notified (in addition to
	/// `cond`) once this state becomes ready. Guarded by `mutex`.
	external: UnsafeCell<Vec<Arc<WaitNode>>>
}

impl<T> SharedState<T> {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			mutex: Mutex::new(),
			cond: Condvar::new(),
			ready: Cell::new(false),
			value: UnsafeCell::new(None),
			future_retrieved: Cell::new(false),
			external: UnsafeCell::new(Vec::new())
		})
	}

	/// Register `node` to be notified once this state becomes ready, for
	/// [`waitfor_any`]. Notifies immediately, without registering, if this
	/// state is already ready.
	fn register_waiter(&self, node: &Arc<WaitNode>) -> Result<()> {
		self.mutex.lock()?;

		let already_ready = self.ready.get();

		if !already_ready {
			/* Safety: mutex held */
			unsafe { self.external.as_mut() }.push(Arc::clone(node));
		}

		self.mutex.unlock()?;

		if already_ready {
			node.notify();
		}

		Ok(())
	}

	/// Undo a prior [`register_waiter`](Self::register_waiter). A no-op if
	/// `node` was never registered or this state already dropped it while
	/// becoming ready.
	fn unregister_waiter(&self, node: &Arc<WaitNode>) -> Result<()> {
		self.mutex.lock()?;

		/* Safety: mutex held */
		unsafe { self.external.as_mut() }.retain(|registered| !Arc::ptr_eq(registered, node));

		self.mutex.unlock()
	}

	fn is_ready(&self) -> bool {
		/* non-blocking by design, so `try_lock` rather than `lock`: this
		 * mutex is internal and never held across a public call, so the
		 * only way `try_lock` fails is transient contention, in which case
		 * treating the state as "not ready yet" is harmless */
		let Ok(true) = self.mutex.try_lock() else {
			return false;
		};

		let ready = self.ready.get();

		self.mutex.unlock().ok();

		ready
	}

	/// Store `result`, waking every waiter.
	///
	/// # Errors
	/// [`ErrorKind::PromiseAlreadySatisfied`](crate::error::ErrorKind::PromiseAlreadySatisfied) if already set.
	fn set(&self, result: std::result::Result<T, Error>) -> Result<()> {
		self.mutex.lock()?;

		if self.ready.get() {
			self.mutex.unlock()?;

			return Err(err!(PromiseAlreadySatisfied));
		}

		/* Safety: mutex held, no other reader can be mid-read since `ready`
		 * was just observed false under the same mutex */
		unsafe { *self.value.as_mut() = Some(result) };
		self.ready.set(true);

		/* Safety: mutex still held; takes ownership of the list so
		 * `waitfor_any` can still safely `unregister_waiter` afterwards
		 * (it'll just find nothing left to remove) */
		let external = std::mem::take(unsafe { self.external.as_mut() });

		self.mutex.unlock()?;
		self.cond.notify_all();

		for waiter in external {
			waiter.notify();
		}

		Ok(())
	}

	fn wait(&self) -> Result<()> {
		self.mutex.lock()?;
		let result = self.cond.wait_while(&self.mutex, || !self.ready.get());

		self.mutex.unlock()?;

		result
	}

	fn wait_until(&self, deadline: Instant) -> Result<FutureStatus> {
		self.mutex.lock()?;

		while !self.ready.get() {
			if Instant::now() >= deadline {
				self.mutex.unlock()?;

				return Ok(FutureStatus::Timeout);
			}

			/* `Condvar::wait_until` re-locks `self.mutex` before returning
			 * even on error, so the unlock below always applies */
			if let Err(error) = self.cond.wait_until(&self.mutex, deadline) {
				self.mutex.unlock()?;

				return Err(error);
			}
		}

		self.mutex.unlock()?;

		Ok(FutureStatus::Ready)
	}

	/// Wait, then move the value out. Only sound to call once per shared
	/// state — used by the non-shared [`Future::get`].
	fn take(&self) -> Result<T> {
		self.wait()?;

		self.mutex.lock()?;

		/* Safety: mutex held; `ready` observed true by `wait` above, so the
		 * slot holds `Some` and nobody else concurrently takes it (this is
		 * the one-shot `Future`, never cloned) */
		let result = unsafe { self.value.as_mut() }.take().expect("ready but empty shared state");

		self.mutex.unlock()?;

		result
	}

	/// Wait, then clone the value out, leaving it in place for other
	/// [`SharedFuture`] clones.
	fn get_cloned(&self) -> Result<T>
	where
		T: Clone
	{
		self.wait()?;

		self.mutex.lock()?;

		/* Safety: mutex held; `ready` observed true */
		let result = unsafe { self.value.as_mut() }.clone().expect("ready but empty shared state");

		self.mutex.unlock()?;

		result
	}

	/// Called when a [`Promise`] is dropped without ever calling
	/// `set_value`/`set_exception`.
	fn break_promise(&self) {
		/* best-effort: a promise that panicked while already holding the
		 * mutex (impossible in this crate's own code, but a caller's
		 * `Drop` impl could reenter) silently loses the broken-promise
		 * notification rather than risk a double panic */
		let _ = self.set(Err(err!(BrokenPromise)));
	}
}

/* Safety: every field is only read/written while `mutex` is held */
unsafe impl<T: Send> Send for SharedState<T> {}
/* Safety: see above */
unsafe impl<T: Send> Sync for SharedState<T> {}

/// The writable half of a one-shot value, mirroring `boost::fibers::promise<T>`.
///
/// Dropping a `Promise` that never had `set_value`/`set_exception` called on
/// it resolves its [`Future`] (if one was taken) with
/// [`ErrorKind::BrokenPromise`](crate::error::ErrorKind::BrokenPromise), the same as `boost::fibers::promise`'s
/// destructor raising `broken_promise`.
pub struct Promise<T> {
	state: Arc<SharedState<T>>,
	fulfilled: bool
}

impl<T> Promise<T> {
	#[must_use]
	pub fn new() -> Self {
		Self { state: SharedState::new(), fulfilled: false }
	}

	/// Hand out the one [`Future`] that observes this promise.
	///
	/// # Errors
	/// [`ErrorKind::FutureAlreadyRetrieved`](crate::error::ErrorKind::FutureAlreadyRetrieved) if called more than once.
	pub fn get_future(&self) -> Result<Future<T>> {
		if self.state.future_retrieved.replace(true) {
			return Err(err!(FutureAlreadyRetrieved));
		}

		Ok(Future { state: Some(Arc::clone(&self.state)) })
	}

	/// Fulfill the promise with a value.
	///
	/// # Errors
	/// [`ErrorKind::PromiseAlreadySatisfied`](crate::error::ErrorKind::PromiseAlreadySatisfied) if already fulfilled.
	pub fn set_value(&mut self, value: T) -> Result<()> {
		self.state.set(Ok(value))?;
		self.fulfilled = true;

		Ok(())
	}

	/// Fulfill the promise with an error instead of a value, observed by
	/// the [`Future`] as `Err(error)`.
	///
	/// # Errors
	/// [`ErrorKind::PromiseAlreadySatisfied`](crate::error::ErrorKind::PromiseAlreadySatisfied) if already fulfilled.
	pub fn set_exception(&mut self, error: Error) -> Result<()> {
		self.state.set(Err(error))?;
		self.fulfilled = true;

		Ok(())
	}
}

impl<T> Default for Promise<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> Drop for Promise<T> {
	fn drop(&mut self) {
		if !self.fulfilled {
			self.state.break_promise();
		}
	}
}

/// A one-shot, non-cloneable handle to a value a [`Promise`] will
/// eventually produce.
///
/// A default-constructed `Future` carries no shared state at all (mirroring
/// `std::future<T>`'s default constructor): every operation on it returns
/// [`ErrorKind::FutureUninitialized`](crate::error::ErrorKind::FutureUninitialized).
pub struct Future<T> {
	state: Option<Arc<SharedState<T>>>
}

impl<T> Future<T> {
	fn state(&self) -> Result<&Arc<SharedState<T>>> {
		self.state.as_ref().ok_or_else(|| err!(FutureUninitialized))
	}

	/// Whether a result is already available, without blocking.
	///
	/// # Errors
	/// [`ErrorKind::FutureUninitialized`](crate::error::ErrorKind::FutureUninitialized)
	pub fn is_ready(&self) -> Result<bool> {
		Ok(self.state()?.is_ready())
	}

	/// Block the calling fiber until a result is available.
	///
	/// # Errors
	/// [`ErrorKind::FutureUninitialized`](crate::error::ErrorKind::FutureUninitialized);
	/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting.
	pub fn wait(&self) -> Result<()> {
		self.state()?.wait()
	}

	/// As [`wait`](Self::wait), giving up at `deadline`.
	///
	/// # Errors
	/// see [`wait`](Self::wait)
	pub fn wait_until(&self, deadline: Instant) -> Result<FutureStatus> {
		self.state()?.wait_until(deadline)
	}

	/// Relative-duration form of [`wait_until`](Self::wait_until).
	///
	/// # Errors
	/// see [`wait`](Self::wait)
	pub fn wait_for(&self, timeout: Duration) -> Result<FutureStatus> {
		self.wait_until(Instant::now() + timeout)
	}

	/// Block until ready, then consume the future and return its result
	/// (the promise's value, or the error it was resolved with — including
	/// [`ErrorKind::BrokenPromise`](crate::error::ErrorKind::BrokenPromise) if the promise was dropped unfulfilled).
	///
	/// # Errors
	/// [`ErrorKind::FutureUninitialized`](crate::error::ErrorKind::FutureUninitialized); otherwise whatever the promise
	/// was resolved with.
	pub fn get(self) -> Result<T> {
		self.state()?.take()
	}

	/// Convert into a cloneable [`SharedFuture`], letting more than one
	/// observer read the eventual result.
	///
	/// # Errors
	/// [`ErrorKind::FutureUninitialized`](crate::error::ErrorKind::FutureUninitialized)
	pub fn share(self) -> Result<SharedFuture<T>>
	where
		T: Clone
	{
		Ok(SharedFuture { state: Arc::clone(self.state()?) })
	}
}

impl<T> Default for Future<T> {
	fn default() -> Self {
		Self { state: None }
	}
}

/// A cloneable [`Future`]: every clone observes the same eventual result.
///
/// Requires `T: Clone` rather than carrying the result behind an `Arc`,
/// keeping `get` a plain by-value return like [`Future::get`] instead of a
/// borrow tied to the `SharedFuture`'s own lifetime.
///
/// Exceptions are represented as [`crate::error::Error`] rather than a
/// boxed panic payload (unlike `std::thread::JoinHandle`'s `Box<dyn Any +
/// Send>`): `Error` is plain data (`Copy`), so cloning the exception out to
/// every observer needs no extra indirection.
pub struct SharedFuture<T> {
	state: Arc<SharedState<T>>
}

impl<T> SharedFuture<T> {
	/// Whether a result is already available, without blocking.
	#[must_use]
	pub fn is_ready(&self) -> bool {
		self.state.is_ready()
	}

	/// Block the calling fiber until a result is available.
	///
	/// # Errors
	/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting.
	pub fn wait(&self) -> Result<()> {
		self.state.wait()
	}

	/// As [`wait`](Self::wait), giving up at `deadline`.
	///
	/// # Errors
	/// see [`wait`](Self::wait)
	pub fn wait_until(&self, deadline: Instant) -> Result<FutureStatus> {
		self.state.wait_until(deadline)
	}

	/// Relative-duration form of [`wait_until`](Self::wait_until).
	///
	/// # Errors
	/// see [`wait`](Self::wait)
	pub fn wait_for(&self, timeout: Duration) -> Result<FutureStatus> {
		self.wait_until(Instant::now() + timeout)
	}

	/// Block until ready, then clone out the result.
	///
	/// # Errors
	/// whatever the promise was resolved with.
	pub fn get(&self) -> Result<T>
	where
		T: Clone
	{
		self.state.get_cloned()
	}
}

impl<T> Clone for SharedFuture<T> {
	fn clone(&self) -> Self {
		Self { state: Arc::clone(&self.state) }
	}
}

/// A `FnMut() -> T` bundled with the [`Promise`] its result is delivered
/// through, mirroring `boost::fibers::packaged_task<T()>`.
///
/// Unlike [`crate::spawn::spawn`], invoking a `PackagedTask` does not start
/// a new fiber: `invoke` runs the closure on the calling fiber's own stack,
/// useful for routing a plain closure's result through the same
/// future/promise machinery without the cost of a fiber (e.g. handing work
/// to a thread pool built out of this crate rather than scheduling it as
/// its own fiber).
///
/// The closure is bound by `FnMut` rather than `FnOnce` so [`reset`](Self::reset)
/// (spec §4.8) can run it again for a second shared state without needing to
/// have kept a spare, uninvoked copy around — the same shape `boost::fibers::
/// packaged_task::reset` assumes when it says "equivalent to `*this =
/// packaged_task(std::move(f))`, where `f` is the stored task".
pub struct PackagedTask<F, T> {
	closure: F,
	promise: Promise<T>,
	started: bool
}

impl<F, T> PackagedTask<F, T>
where
	F: FnMut() -> T
{
	pub fn new(closure: F) -> Self {
		Self { closure, promise: Promise::new(), started: false }
	}

	/// See [`Promise::get_future`].
	///
	/// # Errors
	/// see [`Promise::get_future`]
	pub fn get_future(&self) -> Result<Future<T>> {
		self.promise.get_future()
	}

	/// Run the closure and resolve the associated future with its result.
	///
	/// A closure that panics does not unwind out of `invoke`: the panic is
	/// caught and the future instead resolves to
	/// [`ErrorKind::Other`](crate::error::ErrorKind::Other), since an
	/// arbitrary panic payload can't be carried in this crate's
	/// `&'static str`-only [`Error`] message field.
	///
	/// # Errors
	/// [`ErrorKind::TaskAlreadyStarted`](crate::error::ErrorKind::TaskAlreadyStarted) if `invoke` was already called
	/// since construction or the last [`reset`](Self::reset).
	pub fn invoke(&mut self) -> Result<()> {
		if self.started {
			return Err(err!(TaskAlreadyStarted));
		}

		self.started = true;

		match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (self.closure)())) {
			Ok(value) => self.promise.set_value(value).ok(),
			Err(_) => self.promise.set_exception(err!(Other, "task panicked")).ok()
		};

		Ok(())
	}

	/// Abandon the current shared state (breaking any future retrieved from
	/// it, exactly as dropping the task would) and build a fresh one around
	/// the same closure, so `invoke` can run it again. Mirrors
	/// `boost::fibers::packaged_task::reset`.
	pub fn reset(&mut self) {
		self.promise = Promise::new();
		self.started = false;
	}
}

/// Block the calling fiber until every future in `futures` is resolved,
/// returning each one's result in the same order.
///
/// Needs no [`WaitNode`] of its own, unlike [`waitfor_any`]: waiting on each
/// future in turn already blocks only as long as that one future isn't ready
/// yet, and every other fiber (including whichever ones will resolve the
/// later futures in the list) keeps running on this scheduler in the
/// meantime.
pub fn waitfor_all<T>(futures: Vec<Future<T>>) -> Vec<Result<T>> {
	futures.into_iter().map(Future::get).collect()
}

/// Block the calling fiber until at least one future in `futures` is
/// resolved, returning its index, its result, and the rest still pending.
///
/// Registers a single [`WaitNode`] with every future's shared state (spec
/// §4.8): whichever becomes ready first notifies it directly, so this never
/// polls. The node is unregistered from every future before returning, on
/// every exit path including an interrupted wait, so no future is left
/// holding a dangling registration.
///
/// An uninitialized [`Future`] (default-constructed, see [`Future`]'s docs)
/// has no shared state to register against; it's treated as already ready
/// (matching `is_ready`'s own `FutureUninitialized` error), so its presence
/// anywhere in `futures` resolves the call immediately with that error.
///
/// # Errors
/// [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
/// if interrupted while waiting. Every future is still unregistered first.
///
/// # Panics
/// if `futures` is empty
pub fn waitfor_any<T>(mut futures: Vec<Future<T>>) -> Result<(usize, Result<T>, Vec<Future<T>>)> {
	assert!(!futures.is_empty(), "waitfor_any requires at least one future");

	if let Some(index) = futures.iter().position(|future| future.is_ready().unwrap_or(true)) {
		let future = futures.remove(index);

		return Ok((index, future.get(), futures));
	}

	let node = WaitNode::new();

	for future in &futures {
		/* every future here passed the `is_ready` scan above without
		 * error, so `state()` is `Ok` for all of them */
		if let Ok(state) = future.state() {
			state.register_waiter(&node)?;
		}
	}

	let result = node.wait();

	for future in &futures {
		if let Ok(state) = future.state() {
			state.unregister_waiter(&node)?;
		}
	}

	result?;

	let index = futures
		.iter()
		.position(|future| future.is_ready().unwrap_or(true))
		.expect("WaitNode notified but no registered future is ready");
	let future = futures.remove(index);

	Ok((index, future.get(), futures))
}

#[cfg(test)]
mod tests {
	use std::rc::Rc;

	use super::*;
	use crate::error::ErrorKind;
	use crate::scheduler::Scheduler;
	use crate::spawn;

	#[test]
	fn set_value_then_get_round_trips() {
		let scheduler = Scheduler::new();
		let mut promise = Promise::<i32>::new();
		let future = promise.get_future().unwrap();

		promise.set_value(42).unwrap();

		spawn::spawn(move || {
			assert_eq!(future.get().unwrap(), 42);
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn dropped_promise_breaks_the_future() {
		let scheduler = Scheduler::new();
		let promise = Promise::<i32>::new();
		let future = promise.get_future().unwrap();

		drop(promise);

		spawn::spawn(move || {
			let error = future.get().unwrap_err();

			assert_eq!(error.kind(), ErrorKind::BrokenPromise);
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn second_get_future_is_rejected() {
		let promise = Promise::<i32>::new();

		promise.get_future().unwrap();

		assert_eq!(promise.get_future().unwrap_err().kind(), ErrorKind::FutureAlreadyRetrieved);
	}

	#[test]
	fn second_set_value_is_rejected() {
		let mut promise = Promise::<i32>::new();

		promise.set_value(1).unwrap();

		assert_eq!(promise.set_value(2).unwrap_err().kind(), ErrorKind::PromiseAlreadySatisfied);
	}

	#[test]
	fn shared_future_allows_multiple_observers() {
		let scheduler = Scheduler::new();
		let mut promise = Promise::<i32>::new();
		let shared = promise.get_future().unwrap().share().unwrap();

		for _ in 0..3 {
			let shared = shared.clone();

			spawn::spawn(move || {
				shared.wait().unwrap();

				assert_eq!(shared.get().unwrap(), 7);
			})
			.detach();
		}

		promise.set_value(7).unwrap();

		scheduler.run();
	}

	#[test]
	fn packaged_task_delivers_result_through_its_future() {
		let scheduler = Scheduler::new();
		let mut task = PackagedTask::new(|| 1 + 1);
		let future = task.get_future().unwrap();

		spawn::spawn(move || {
			task.invoke().unwrap();
		})
		.detach();

		spawn::spawn(move || {
			assert_eq!(future.get().unwrap(), 2);
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn packaged_task_panic_resolves_future_to_an_error() {
		let scheduler = Scheduler::new();
		let mut task = PackagedTask::new(|| -> i32 { panic!("boom") });
		let future = task.get_future().unwrap();

		spawn::spawn(move || {
			task.invoke().unwrap();
		})
		.detach();

		spawn::spawn(move || {
			assert_eq!(future.get().unwrap_err().kind(), ErrorKind::Other);
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn second_invoke_without_reset_is_rejected() {
		let mut count = 0;
		let mut task = PackagedTask::new(move || {
			count += 1;

			count
		});
		let first = task.get_future().unwrap();

		task.invoke().unwrap();
		assert_eq!(first.get().unwrap(), 1);

		assert_eq!(task.invoke().unwrap_err().kind(), ErrorKind::TaskAlreadyStarted);
	}

	#[test]
	fn reset_rebuilds_the_shared_state_and_reruns_the_closure() {
		let mut count = 0;
		let mut task = PackagedTask::new(move || {
			count += 1;

			count
		});

		let first = task.get_future().unwrap();

		task.invoke().unwrap();
		assert_eq!(first.get().unwrap(), 1);

		task.reset();

		let second = task.get_future().unwrap();

		task.invoke().unwrap();
		assert_eq!(second.get().unwrap(), 2);
	}

	#[test]
	fn dropping_a_task_without_invoking_breaks_its_future() {
		let task = PackagedTask::new(|| 0);
		let future = task.get_future().unwrap();

		drop(task);

		assert_eq!(future.get().unwrap_err().kind(), ErrorKind::BrokenPromise);
	}

	#[test]
	fn waitfor_all_collects_every_result_in_order() {
		let scheduler = Scheduler::new();
		let mut promises: Vec<Promise<i32>> = (0..3).map(|_| Promise::new()).collect();
		let futures = promises.iter().map(|promise| promise.get_future().unwrap()).collect::<Vec<_>>();

		spawn::spawn(move || {
			for (i, promise) in promises.iter_mut().enumerate() {
				promise.set_value(i32::try_from(i).unwrap()).unwrap();
			}
		})
		.detach();

		let results = Rc::new(std::cell::RefCell::new(Vec::new()));

		{
			let results = Rc::clone(&results);

			spawn::spawn(move || {
				let collected = waitfor_all(futures);

				*results.borrow_mut() = collected.into_iter().map(|r| r.unwrap()).collect::<Vec<_>>();
			})
			.detach();
		}

		scheduler.run();

		assert_eq!(*results.borrow(), vec![0, 1, 2]);
	}

	#[test]
	fn waitfor_any_returns_the_first_one_ready() {
		let scheduler = Scheduler::new();
		let mut first = Promise::<i32>::new();
		let mut second = Promise::<i32>::new();
		let futures = vec![first.get_future().unwrap(), second.get_future().unwrap()];

		spawn::spawn(move || {
			this_fiber::yield_now();
			second.set_value(99).unwrap();
			first.set_value(1).unwrap();
		})
		.detach();

		spawn::spawn(move || {
			let (index, result, _rest) = waitfor_any(futures).unwrap();

			assert_eq!(index, 1);
			assert_eq!(result.unwrap(), 99);
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn waitfor_any_unregisters_so_the_pending_future_still_resolves_on_its_own() {
		let scheduler = Scheduler::new();
		let mut first = Promise::<i32>::new();
		let mut second = Promise::<i32>::new();
		let futures = vec![first.get_future().unwrap(), second.get_future().unwrap()];
		let rest_result = Rc::new(std::cell::RefCell::new(None));

		spawn::spawn(move || {
			this_fiber::yield_now();
			first.set_value(1).unwrap();
			this_fiber::yield_now();
			this_fiber::yield_now();
			second.set_value(2).unwrap();
		})
		.detach();

		{
			let rest_result = Rc::clone(&rest_result);

			spawn::spawn(move || {
				let (index, result, mut rest) = waitfor_any(futures).unwrap();

				assert_eq!(index, 0);
				assert_eq!(result.unwrap(), 1);

				// the still-pending future was unregistered from the
				// `WaitNode` along with the one that fired; it must still
				// resolve normally, on its own, afterwards.
				let second = rest.remove(0);

				*rest_result.borrow_mut() = Some(second.get().unwrap());
			})
			.detach();
		}

		scheduler.run();

		assert_eq!(*rest_result.borrow(), Some(2));
	}

	#[test]
	fn waitfor_any_with_an_uninitialized_future_resolves_immediately() {
		let other: Future<i32> = Future::default();
		let (index, result, _rest) = waitfor_any(vec![Future::default(), other]).unwrap();

		assert_eq!(index, 0);
		assert_eq!(result.unwrap_err().kind(), ErrorKind::FutureUninitialized);
	}

	#[test]
	#[should_panic(expected = "waitfor_any requires at least one future")]
	fn waitfor_any_panics_on_an_empty_list() {
		let _ = waitfor_any::<i32>(Vec::new());
	}
}
