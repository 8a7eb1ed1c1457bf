/// The lifecycle of a fiber, as tracked by its owning
/// [`crate::scheduler::Scheduler`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FiberState {
	/// Linked into a ready queue, eligible to be picked by the scheduling
	/// policy.
	Ready,

	/// Currently executing on the OS thread.
	Running,

	/// Linked into a synchronization primitive's wait list (and possibly
	/// also the scheduler's sleep queue, for a timed wait).
	Waiting,

	/// Handed off to another scheduler via `set_remote_ready` and not yet
	/// claimed by its run queue. A fiber is never observable in this state
	/// by the scheduler it's leaving; it exists only for the brief window
	/// between the cross-thread handoff and the destination scheduler
	/// re-linking it into its own ready queue.
	Migrating,

	/// Run to completion; only reachable from `Running`. A terminated
	/// fiber's stack is either returned to a [`crate::fiber::Pool`] or
	/// dropped once every joiner has been woken.
	Terminated
}
