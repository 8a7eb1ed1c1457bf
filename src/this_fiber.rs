//! Operations the currently running fiber performs on itself: yielding,
//! sleeping, reading its id, checking for interruption, and reaching its
//! fiber-specific storage.
//!
//! Every function here is a thin, safe wrapper around
//! [`crate::scheduler::Scheduler`]: the safety preconditions on the
//! scheduler's raw `switch_to_dispatcher`-family methods always hold when
//! called from a fiber's own code (it is, by definition, the fiber
//! currently running on whichever scheduler owns this thread).

use std::time::{Duration, Instant};

use crate::context::{FiberContext, FiberFlags, ForcedUnwind};
use crate::error::{err, Result};
use crate::fss::FssMap;
use crate::scheduler::properties::FiberProperties;
use crate::scheduler::{self, Scheduler};

/// The currently running fiber's context. Exposed crate-internally so the
/// synchronization primitives in [`crate::sync`] and [`crate::spawn`] can
/// link/unlink it against their own wait lists without duplicating the
/// "which scheduler, if any, is running on this thread" lookup.
pub(crate) fn current_context() -> Ptr {
	scheduler::with_current(Scheduler::current)
		.expect("this_fiber operation called with no scheduler running on this thread")
}

type Ptr = crate::pointer::Ptr<FiberContext>;

/// The currently running fiber's id.
#[must_use]
pub fn id() -> crate::context::FiberId {
	/* Safety: the scheduler only ever hands back a live, pinned context */
	unsafe { current_context().as_ref() }.id()
}

/// Give up the remainder of this fiber's turn, letting other ready fibers
/// run before it's scheduled again.
pub fn yield_now() {
	scheduler::with_current(|scheduler| {
		/* Safety: called from the fiber currently running on `scheduler` */
		unsafe { scheduler.yield_current() };
	});
}

/// Suspend this fiber until at least `duration` has elapsed.
///
/// # Errors
/// see [`sleep_until`]
pub fn sleep_for(duration: Duration) -> Result<()> {
	sleep_until(Instant::now() + duration)
}

/// Suspend this fiber until `deadline`. A named interruption point (spec
/// §4.2/§4.3): `interrupt()`ing the sleeping fiber wakes it early, same as a
/// reached deadline would, but it observes [`ErrorKind::FiberInterrupted`]
/// instead of returning normally.
///
/// # Errors
/// [`ErrorKind::FiberInterrupted`] if `interrupt()` was called on this fiber
/// either before the call or while it was asleep.
pub fn sleep_until(deadline: Instant) -> Result<()> {
	interruption_point()?;

	scheduler::with_current(|scheduler| {
		/* Safety: called from the fiber currently running on `scheduler` */
		unsafe { scheduler.sleep_current_until(deadline) };
	});

	interruption_point()
}

/// Check whether this fiber has a pending interruption request, clearing
/// it if delivery isn't currently
/// [blocked](disable_interruption). Blocking operations throughout the
/// crate (mutex/condvar/channel waits, `join`) call this at the point
/// they're about to suspend, and again right after being woken.
///
/// # Errors
/// [`ErrorKind::FiberInterrupted`] if `interrupt()` was called on this
/// fiber and interruption isn't currently blocked.
pub fn interruption_point() -> Result<()> {
	let ctx = current_context();

	/* Safety: live, pinned context of the fiber calling this function */
	let context = unsafe { ctx.as_ref() };
	let flags = context.flags();

	// unlike ordinary interruption, forced unwind is never held back by
	// `disable_interruption` — a fiber that called `unwind()` is already
	// committed to terminating, so any blocking call made while its stack
	// unwinds re-throws immediately instead of suspending.
	if flags.contains(FiberFlags::FORCED_UNWIND) {
		std::panic::panic_any(ForcedUnwind);
	}

	if flags.contains(FiberFlags::INTERRUPTION_REQUESTED) && !flags.contains(FiberFlags::INTERRUPTION_BLOCKED)
	{
		context.remove_flags(FiberFlags::INTERRUPTION_REQUESTED);

		return Err(err!(FiberInterrupted));
	}

	Ok(())
}

/// Unwind the calling fiber's stack immediately instead of letting its
/// entry point return normally: every live local's destructor still runs,
/// but the fiber terminates as soon as unwinding reaches its trampoline.
/// Mirrors Boost.Fiber's `this_fiber::yield_break`.
///
/// Any [`JoinHandle::join`](crate::spawn::JoinHandle::join) on this fiber
/// sees [`ErrorKind::BrokenPromise`](crate::error::ErrorKind::BrokenPromise),
/// exactly as if the fiber had panicked and the panic had been swallowed —
/// which, mechanically, is exactly what this does.
pub fn unwind() -> ! {
	let ctx = current_context();

	/* Safety: live, pinned context of the calling fiber */
	unsafe { ctx.as_ref() }.insert_flags(FiberFlags::FORCED_UNWIND);

	std::panic::panic_any(ForcedUnwind)
}

/// An RAII guard restoring the previous interruption-blocked state on drop.
/// See [`disable_interruption`].
#[must_use = "interruption is re-enabled when this guard drops"]
pub struct InterruptionGuard {
	previously_blocked: bool
}

impl Drop for InterruptionGuard {
	fn drop(&mut self) {
		if !self.previously_blocked {
			let ctx = current_context();

			/* Safety: live, pinned context of the fiber that created this
			 * guard; guards never outlive the fiber that made them since
			 * they aren't `Send` (see below) */
			unsafe { ctx.as_ref() }.remove_flags(FiberFlags::INTERRUPTION_BLOCKED);
		}
	}
}

/// Block interruption delivery for as long as the returned guard lives.
/// [`interruption_point`] becomes a no-op (always `Ok`) until it's dropped;
/// a request made meanwhile is held and delivered at the next
/// interruption point afterwards.
#[must_use = "interruption is re-enabled when the returned guard drops"]
pub fn disable_interruption() -> InterruptionGuard {
	let ctx = current_context();
	/* Safety: live, pinned context of the calling fiber */
	let context = unsafe { ctx.as_ref() };
	let previously_blocked = context.flags().contains(FiberFlags::INTERRUPTION_BLOCKED);

	context.insert_flags(FiberFlags::INTERRUPTION_BLOCKED);

	InterruptionGuard { previously_blocked }
}

/// Run `f` with this fiber's scheduling properties, then notify the
/// scheduler's policy that they changed (Boost.Fiber's
/// `fiber_properties::notify`), letting a property-aware policy such as
/// [`crate::scheduler::policy::PriorityPolicy`] re-bucket this fiber under
/// its new value.
///
/// Returns `None` if this fiber wasn't spawned with
/// [`Builder::properties`](crate::spawn::Builder::properties).
pub fn with_properties_mut<R>(f: impl FnOnce(&mut dyn FiberProperties) -> R) -> Option<R> {
	let ctx = current_context();

	/* Safety: live, pinned context of the calling fiber; properties are
	 * only ever touched by the fiber that owns them */
	let properties = unsafe { ctx.cast_mut().as_mut() }.properties_mut()?;
	let result = f(properties);

	scheduler::with_current(|scheduler| {
		/* Safety: `ctx` is live and pinned */
		unsafe { scheduler.notify_property_change(ctx) };
	});

	Some(result)
}

/// Run `f` with this fiber's fiber-specific-storage map. See
/// [`crate::fss::FssKey`].
pub fn with_fss<R>(f: impl FnOnce(&mut FssMap) -> R) -> R {
	let ctx = current_context();

	/* Safety: live, pinned context of the calling fiber; `fss` is only ever
	 * touched by the fiber that owns it */
	let fss = unsafe { ctx.as_ref().fss() };
	let fss_mut = fss as *const FssMap as *mut FssMap;

	/* Safety: no other borrow of this fiber's own FSS map is alive, since
	 * `with_fss` never recurses into itself from `f` in any code this
	 * crate ships */
	f(unsafe { &mut *fss_mut })
}
