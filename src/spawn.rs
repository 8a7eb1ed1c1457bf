//! The public entry point for starting fibers: [`spawn`], [`Builder`], and
//! the [`JoinHandle`] it returns.

use std::any::Any;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

use crate::context::{FiberContext, FiberFlags, FiberState, ForcedUnwind};
use crate::error::{err, Result};
use crate::fiber::Start;
use crate::pointer::Ptr;
use crate::scheduler::properties::FiberProperties;
use crate::scheduler::{self, Scheduler};
use crate::this_fiber;

/// Fiber construction parameters, mirroring Boost.Fiber's
/// `fiber::properties`/stack-size constructor parameters.
#[derive(Default)]
pub struct Builder {
	stack_size: Option<usize>,
	thread_affine: bool,
	properties: Option<Box<dyn FiberProperties>>
}

impl Builder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Request at least `size` bytes of stack. Rounded up to a whole number
	/// of pages by [`crate::fiber::Stack`].
	#[must_use]
	pub const fn stack_size(mut self, size: usize) -> Self {
		self.stack_size = Some(size);

		self
	}

	/// Pin the fiber to the scheduler that spawns it: a work-stealing
	/// policy will never migrate it to another thread.
	#[must_use]
	pub const fn thread_affine(mut self, affine: bool) -> Self {
		self.thread_affine = affine;

		self
	}

	/// Attach scheduling properties a [`crate::scheduler::policy`]
	/// implementation can read back, e.g.
	/// [`properties::Priority`](crate::scheduler::properties::Priority).
	#[must_use]
	pub fn properties(mut self, properties: impl FiberProperties) -> Self {
		self.properties = Some(Box::new(properties));

		self
	}

	/// Spawn `f` as a new fiber on the scheduler running on the current
	/// thread.
	///
	/// # Panics
	/// if no [`Scheduler`] is running on the current thread
	pub fn spawn<F, T>(self, f: F) -> JoinHandle<T>
	where
		F: FnOnce() -> T + 'static,
		T: 'static
	{
		let shared = Box::into_raw(Box::new(Shared::<T> { result: UnsafeCell::new(None) }));

		let payload = Box::into_raw(Box::new(Payload { closure: Some(f), shared }));

		/* Safety: `trampoline::<F, T>` only ever runs once, as this fiber's
		 * entry point, and always exits via `Scheduler::terminate_current`
		 * instead of returning */
		let start = unsafe { Start::new(trampoline::<F, T>, Ptr::from(payload.cast_const()).cast()) };

		let ctx = scheduler::with_current(|scheduler| {
			let ctx = scheduler.spawn(start, self.stack_size, self.properties);

			if self.thread_affine {
				/* Safety: freshly spawned, not yet running */
				unsafe { ctx.as_ref().insert_flags(FiberFlags::THREAD_AFFINITY) };
			}

			ctx
		})
		.expect("Builder::spawn called with no scheduler running on this thread");

		JoinHandle { ctx, shared, joined: false, marker: PhantomData }
	}
}

/// What a spawned fiber's entry point left behind: a value, a genuine
/// panic to be replayed on the joiner, or (absent entirely, see
/// [`JoinHandle::join_inner`]) a [`this_fiber::unwind`](crate::this_fiber::unwind).
enum Outcome<T> {
	Returned(T),
	Panicked(Box<dyn Any + Send + 'static>)
}

struct Shared<T> {
	result: UnsafeCell<Option<Outcome<T>>>
}

struct Payload<F, T> {
	closure: Option<F>,
	shared: *mut Shared<T>
}

unsafe extern "C" fn trampoline<F, T>(arg: Ptr<()>)
where
	F: FnOnce() -> T + 'static,
	T: 'static
{
	/* Safety: `arg` points at the `Payload<F, T>` leaked by `Builder::spawn`
	 * for this exact `F`/`T`, and this trampoline runs exactly once */
	let mut payload = unsafe { Box::from_raw(arg.cast::<Payload<F, T>>().cast_mut().as_ptr()) };
	let closure = payload.closure.take().expect("fiber entry point invoked twice");

	// `AssertUnwindSafe`: the closure is only ever run once, to completion
	// or to a panic that ends this fiber, so there's no second call that
	// could observe a torn mutation through it.
	let outcome = match panic::catch_unwind(AssertUnwindSafe(closure)) {
		Ok(value) => Some(Outcome::Returned(value)),
		Err(payload) if payload.downcast_ref::<ForcedUnwind>().is_some() => None,
		Err(payload) => Some(Outcome::Panicked(payload))
	};

	/* Safety: the joining fiber only reads `shared.result` after observing
	 * this fiber's `Terminated` state, which happens-after this write since
	 * both run on the same single-threaded scheduler */
	unsafe { *(*payload.shared).result.get_mut() = outcome };

	/* Safety: `shared` is leaked, reclaimed by whichever of `JoinHandle`
	 * (on success) or nobody (if detached, in which case it leaks — see
	 * `JoinHandle::detach`) frees it */
	drop(payload);

	scheduler::with_current(|scheduler| {
		/* Safety: called from the fiber currently running on `scheduler`,
		 * which is this one */
		unsafe { scheduler.terminate_current() }
	});

	unreachable!("no scheduler running on the thread that started this fiber")
}

/// Spawn `f` as a new fiber with default [`Builder`] settings.
///
/// # Panics
/// if no [`Scheduler`] is running on the current thread
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
	F: FnOnce() -> T + 'static,
	T: 'static
{
	Builder::new().spawn(f)
}

/// A handle to a spawned fiber, letting the spawner wait for it to finish
/// and retrieve its result.
///
/// Must be joined (or explicitly [`detach`](Self::detach)ed) from a fiber
/// running on the *same* scheduler that spawned it — cross-scheduler joins
/// aren't supported, since the wait list `join` suspends onto is only ever
/// touched by the owning scheduler's single thread.
pub struct JoinHandle<T> {
	ctx: Ptr<FiberContext>,
	shared: *mut Shared<T>,
	joined: bool,
	marker: PhantomData<T>
}

impl<T> JoinHandle<T> {
	#[must_use]
	pub fn id(&self) -> crate::context::FiberId {
		/* Safety: a fiber's context stays alive as long as this handle
		 * hasn't released its hold on it (via `join`/`detach`) —
		 * `terminate_current` only reclaims the `Fiber`/stack, not the
		 * `FiberContext` allocation itself, which survives until this
		 * handle's release too (`FiberContext::release`) */
		unsafe { self.ctx.as_ref() }.id()
	}

	/// Block the calling fiber until the spawned fiber terminates, then
	/// return its result.
	///
	/// # Errors
	/// [`ErrorKind::OperationNotPermitted`](crate::error::ErrorKind::OperationNotPermitted)
	/// if called from the scheduler's own dispatcher context instead of a
	/// spawned fiber; [`ErrorKind::FiberInterrupted`](crate::error::ErrorKind::FiberInterrupted)
	/// if interrupted while waiting; [`ErrorKind::BrokenPromise`](crate::error::ErrorKind::BrokenPromise)
	/// if the fiber terminated via [`this_fiber::unwind`](crate::this_fiber::unwind)
	/// instead of returning.
	///
	/// # Panics
	/// resumes the spawned fiber's own panic on this caller if its entry
	/// point panicked, the same way [`std::thread::JoinHandle::join`]'s
	/// caller decides whether to propagate or inspect it — except here
	/// there is no `Result`-returning variant, since [`ErrorKind`](crate::error::ErrorKind)
	/// is reserved for this crate's own misuse/cancellation taxonomy, not
	/// arbitrary panic payloads.
	pub fn join(mut self) -> Result<T> {
		self.join_inner()
	}

	fn join_inner(&mut self) -> Result<T> {
		loop {
			/* Safety: the context is kept alive by the caller's contract
			 * (same-scheduler join, not yet joined) */
			let context = unsafe { self.ctx.as_ref() };

			if context.state() == FiberState::Terminated {
				break;
			}

			this_fiber::interruption_point()?;

			let current = scheduler::with_current(Scheduler::current)
				.ok_or_else(|| err!(OperationNotPermitted, "no scheduler running on this thread"))?;

			/* Safety: `current` is live */
			if unsafe { current.as_ref() }.flags().contains(FiberFlags::MAIN_CONTEXT) {
				return Err(err!(
					OperationNotPermitted,
					"join() called from the scheduler's dispatcher context, not a fiber"
				));
			}

			scheduler::with_current(|scheduler| {
				/* Safety: `current` is the fiber currently running */
				unsafe {
					current.as_ref().set_state(FiberState::Waiting);
					context.joiners().append(current.as_ref().wait_hook());
					scheduler.suspend_current();
				}
			});
		}

		self.joined = true;

		/* Safety: the spawned fiber has terminated, so its trampoline has
		 * already written the result and will never touch `shared` again */
		let result = unsafe { (*(*self.shared).result.get()).take() };

		/* Safety: `shared` was leaked exactly once by `Builder::spawn` and
		 * is reclaimed exactly once here */
		drop(unsafe { Box::from_raw(self.shared) });

		/* Safety: releases this handle's hold on the context; reached only
		 * once `context.state()` read `Terminated` above, so the scheduler
		 * has already released its own hold in `terminate_current` */
		unsafe { FiberContext::release(self.ctx) };

		match result {
			Some(Outcome::Returned(value)) => Ok(value),
			Some(Outcome::Panicked(payload)) => panic::resume_unwind(payload),
			None => Err(err!(BrokenPromise))
		}
	}

	/// Let the spawned fiber run to completion without ever being joined.
	/// Its result, if any, is dropped when it terminates.
	pub fn detach(mut self) {
		self.joined = true;

		/* Safety: releases this handle's hold on the context; the scheduler
		 * releases its own in `terminate_current`, whenever the fiber gets
		 * there, regardless of whether that's already happened */
		unsafe { FiberContext::release(self.ctx) };
	}

	/// Request interruption of the spawned fiber (spec §4.2's
	/// `interrupt(this)`).
	///
	/// Sets the target's `InterruptionRequested` flag; if it is currently
	/// blocked at an interruption point (a `join`, a sleep, a primitive
	/// wait) and not inside a [`this_fiber::disable_interruption`] scope,
	/// it is forced back to `Ready` so it observes the request immediately
	/// instead of waiting out whatever it was blocked on.
	///
	/// Only meaningful when called from a fiber running on the same
	/// scheduler as the target — this crate has no cross-thread
	/// interruption path (the target's wait lists are only safe to force a
	/// fiber out of from the thread that owns them).
	/// Run `f` with the spawned fiber's scheduling properties, then notify
	/// the scheduler's policy that they changed, letting a property-aware
	/// policy (e.g. [`PriorityPolicy`](crate::scheduler::policy::PriorityPolicy))
	/// re-bucket it if it's currently sitting ready. Mirrors Boost.Fiber's
	/// `fiber::properties<PROPS>()` being mutable from outside the fiber
	/// itself, paired with `fiber_properties::notify`.
	///
	/// Returns `None` if the spawned fiber has no properties attached (
	/// [`Builder::properties`] was never called for it).
	///
	/// Only meaningful when called from a fiber running on the same
	/// scheduler as the target, for the same reason as
	/// [`interrupt`](Self::interrupt).
	pub fn with_properties_mut<R>(&self, f: impl FnOnce(&mut dyn FiberProperties) -> R) -> Option<R> {
		/* Safety: the context outlives the `JoinHandle` (released only once
		 * `join`/`detach` runs) */
		let properties = unsafe { self.ctx.cast_mut().as_mut() }.properties_mut()?;
		let result = f(properties);

		scheduler::with_current(|scheduler| {
			/* Safety: the target is live and pinned */
			unsafe { scheduler.notify_property_change(self.ctx) };
		});

		Some(result)
	}

	pub fn interrupt(&self) {
		/* Safety: the context outlives the `JoinHandle` (freed only once
		 * `join`/`detach` runs) */
		let context = unsafe { self.ctx.as_ref() };

		context.insert_flags(FiberFlags::INTERRUPTION_REQUESTED);

		if context.state() != FiberState::Waiting || context.flags().contains(FiberFlags::INTERRUPTION_BLOCKED) {
			return;
		}

		scheduler::with_current(|scheduler| {
			/* Safety: the target is `Waiting`, found via this same-thread
			 * scheduler; it is not linked into this scheduler's ready
			 * queue. It may still be linked into a primitive's wait list —
			 * every blocking primitive in this crate re-checks that link
			 * under its own spinlock immediately upon resuming, which is
			 * exactly what lets a forced wake-up here be observed safely */
			unsafe { scheduler.set_ready(self.ctx) };
		});
	}
}

impl<T> Drop for JoinHandle<T> {
	fn drop(&mut self) {
		if !self.joined {
			crate::runtime::panic_nounwind(format_args!(
				"JoinHandle dropped without join() or detach() for fiber {:?}",
				self.id()
			));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use crate::scheduler::Scheduler;
	use crate::this_fiber;

	#[test]
	fn builder_defaults_are_not_affine() {
		let builder = Builder::new();

		assert!(!builder.thread_affine);
	}

	#[test]
	fn join_returns_the_entry_points_value() {
		let scheduler = Scheduler::new();

		spawn(|| {
			let handle = spawn(|| 7);

			assert_eq!(handle.join().unwrap(), 7);
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn unwind_reports_a_broken_promise_to_the_joiner() {
		let scheduler = Scheduler::new();

		spawn(|| {
			let handle = spawn::<_, ()>(|| this_fiber::unwind());

			assert_eq!(handle.join().unwrap_err().kind(), ErrorKind::BrokenPromise);
		})
		.detach();

		scheduler.run();
	}

	#[test]
	fn a_panic_in_the_entry_point_is_replayed_on_the_joiner() {
		let scheduler = Scheduler::new();

		spawn(|| {
			let handle = spawn(|| panic!("boom"));
			let replayed = panic::catch_unwind(AssertUnwindSafe(|| handle.join()));

			assert!(replayed.is_err());
		})
		.detach();

		scheduler.run();
	}
}
