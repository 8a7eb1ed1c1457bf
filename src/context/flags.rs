use bitflags::bitflags;

bitflags! {
	/// Per-fiber flags orthogonal to [`super::FiberState`].
	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	pub struct FiberFlags: u32 {
		/// This is the context representing the thread's own stack, not a
		/// spawned fiber. Never scheduled away permanently: every other
		/// fiber on the thread eventually switches back to it.
		const MAIN_CONTEXT = 1 << 0;

		/// The scheduler's dispatch loop itself, on platforms/policies that
		/// run it as its own fiber rather than inline on the main context.
		const DISPATCHER_CONTEXT = 1 << 1;

		/// The fiber has entered a region that must not be interrupted
		/// (see `this_fiber::disable_interruption`). A pending interrupt
		/// is held until the region ends.
		const INTERRUPTION_BLOCKED = 1 << 2;

		/// `interrupt()` was called on this fiber. Delivered at the next
		/// interruption point once `INTERRUPTION_BLOCKED` is clear.
		const INTERRUPTION_REQUESTED = 1 << 3;

		/// The fiber is unwinding because it was interrupted, not because
		/// its entry point returned normally.
		const FORCED_UNWIND = 1 << 4;

		/// The fiber may only ever run on the scheduler that spawned it;
		/// `set_remote_ready`/work-stealing must not migrate it.
		const THREAD_AFFINITY = 1 << 5;

		/// The fiber's entry point has returned (or unwound); it has been
		/// moved to the scheduler's terminated queue and its joiners are
		/// being (or have been) woken.
		const TERMINATED = 1 << 6;
	}
}
