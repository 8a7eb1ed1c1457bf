//! Components C/D: the scheduler's run-queue discipline.
//!
//! [`SchedulingPolicy`] plays the role of Boost.Fiber's `sched_algorithm`:
//! the [`super::Scheduler`] owns one as a trait object and defers every
//! ready-queue decision to it, so swapping FIFO for a priority- or
//! affinity-aware order never touches the dispatch loop itself.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::container::intrusive::LinkedList;
use crate::context::FiberContext;
use crate::pointer::{Pin, Ptr};
use crate::scheduler::properties::{downcast, FiberProperties, Priority};

/// A pluggable run-queue discipline.
///
/// Implementations are free to ignore [`FiberProperties`] entirely (as
/// [`FifoPolicy`] does); a property-aware policy downcasts via
/// [`crate::scheduler::properties::downcast`].
pub trait SchedulingPolicy: Send {
	/// A fiber became ready to run (freshly spawned, woken from a wait
	/// list, or handed back after a timed sleep expired). Link it into
	/// whatever structure [`pick_next`](Self::pick_next) reads from.
	///
	/// # Safety
	/// `ctx` must be pinned, live, and not already linked into this or any
	/// other queue via its `scheduler_hook`
	unsafe fn awakened(&mut self, ctx: Ptr<FiberContext>);

	/// Remove and return the next fiber to run, or `None` if the policy
	/// has nothing ready.
	fn pick_next(&mut self) -> Option<Ptr<FiberContext>>;

	fn is_empty(&self) -> bool;

	/// Called whenever a scheduled fiber's properties change (e.g. a
	/// priority bump) so a policy that orders by them can re-sort.
	fn property_change(&mut self, _ctx: Ptr<FiberContext>, _properties: &dyn FiberProperties) {}

	/// Pull a fiber from another scheduler's overflow, if this policy
	/// supports it. Called by the dispatch loop only once its own queue
	/// and the sleep/remote-ready queues are all empty.
	fn steal(&mut self) -> Option<Ptr<FiberContext>> {
		None
	}
}

/// Plain arrival-order scheduling: the default, matching Boost.Fiber's
/// `round_robin`.
#[derive(Default)]
pub struct FifoPolicy {
	ready: LinkedList
}

impl FifoPolicy {
	#[must_use]
	pub fn new() -> Self {
		let mut ready = LinkedList::new();

		/* Safety: freshly created, not yet linked into anything */
		unsafe { ready.pin() };

		Self { ready }
	}
}

impl SchedulingPolicy for FifoPolicy {
	unsafe fn awakened(&mut self, ctx: Ptr<FiberContext>) {
		/* Safety: guaranteed by caller */
		unsafe { self.ready.append(ctx.as_ref().scheduler_hook()) };
	}

	fn pick_next(&mut self) -> Option<Ptr<FiberContext>> {
		/* Safety: the ready list is pinned for the scheduler's lifetime */
		let node = unsafe { self.ready.pop_front() }?;

		/* Safety: every node in `ready` comes from a live context's
		 * `scheduler_hook`, at a fixed offset from the context itself */
		Some(unsafe { crate::container_of!(node, FiberContext=>scheduler_hook) }.cast_const())
	}

	fn is_empty(&self) -> bool {
		self.ready.is_empty()
	}
}

/// Orders ready fibers by [`Priority`], lower value first, FIFO among
/// equal priorities.
///
/// Grounded in `sched_algorithm_with_properties<PROPS>`: properties are
/// read through [`downcast`] rather than the scheduler knowing their shape.
#[derive(Default)]
pub struct PriorityPolicy {
	queues: Vec<(Priority, LinkedList)>
}

impl PriorityPolicy {
	#[must_use]
	pub fn new() -> Self {
		Self { queues: Vec::new() }
	}

	fn priority_of(ctx: Ptr<FiberContext>) -> Priority {
		/* Safety: `ctx` is live for the duration of this call */
		unsafe { ctx.as_ref() }
			.properties()
			.and_then(downcast::<Priority>)
			.copied()
			.unwrap_or_default()
	}

	fn queue_for(&mut self, priority: Priority) -> &LinkedList {
		if let Some(index) = self.queues.iter().position(|(p, _)| *p == priority) {
			return &self.queues[index].1;
		}

		let index = self
			.queues
			.iter()
			.position(|(p, _)| *p > priority)
			.unwrap_or(self.queues.len());

		let mut list = LinkedList::new();

		/* Safety: freshly created */
		unsafe { list.pin() };

		self.queues.insert(index, (priority, list));
		&self.queues[index].1
	}
}

impl SchedulingPolicy for PriorityPolicy {
	unsafe fn awakened(&mut self, ctx: Ptr<FiberContext>) {
		let priority = Self::priority_of(ctx);
		let queue = self.queue_for(priority);

		/* Safety: guaranteed by caller */
		unsafe { queue.append(ctx.as_ref().scheduler_hook()) };
	}

	fn pick_next(&mut self) -> Option<Ptr<FiberContext>> {
		let (index, _) = self.queues.iter().enumerate().find(|(_, (_, q))| !q.is_empty())?;

		/* Safety: we just found a non-empty queue, pinned for the
		 * scheduler's lifetime */
		let node = unsafe { self.queues[index].1.pop_front() }?;

		/* Safety: every node comes from a live context's `scheduler_hook` */
		Some(unsafe { crate::container_of!(node, FiberContext=>scheduler_hook) }.cast_const())
	}

	fn is_empty(&self) -> bool {
		self.queues.iter().all(|(_, q)| q.is_empty())
	}

	fn property_change(&mut self, ctx: Ptr<FiberContext>, properties: &dyn FiberProperties) {
		let Some(&priority) = downcast::<Priority>(properties) else {
			return;
		};

		/* Safety: `ctx` is pinned and live, per this method's caller
		 * (`Scheduler::notify_property_change`) */
		let hook = unsafe { ctx.as_ref().scheduler_hook() };

		/* Safety: `hook` is pinned as long as `ctx` is */
		if !unsafe { hook.as_ref() }.linked() {
			// not currently sitting in any bucket (running, waiting, or not
			// yet `awakened`) — the next `awakened` call reads the fiber's
			// (already-updated) properties and buckets it correctly then.
			return;
		}

		/* Safety: just checked it's linked, into exactly one of our own
		 * buckets (nothing else links through `scheduler_hook` while a
		 * fiber is ready) */
		unsafe { hook.as_ref().unlink() };

		let queue = self.queue_for(priority);

		/* Safety: `hook` was just unlinked above and `ctx` remains pinned */
		unsafe { queue.append(hook) };
	}
}

/// Wraps a [`FifoPolicy`] with a shared overflow queue other schedulers in
/// the same [`Group`] can push excess, unaffined fibers onto and
/// [`steal`](SchedulingPolicy::steal) from when this scheduler's own queue
/// runs dry.
///
/// Fibers flagged
/// [`THREAD_AFFINITY`](crate::context::FiberFlags::THREAD_AFFINITY) are
/// never pushed to the overflow queue, matching the spec's resolution to
/// keep migration strictly opt-in per fiber.
pub struct WorkStealingPolicy {
	local: FifoPolicy,
	overflow: Arc<Mutex<VecDeque<Ptr<FiberContext>>>>,
	overflow_threshold: usize
}

/// A set of schedulers willing to share overflow work with each other.
#[derive(Clone, Default)]
pub struct Group {
	overflow: Arc<Mutex<VecDeque<Ptr<FiberContext>>>>
}

impl Group {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn policy(&self) -> WorkStealingPolicy {
		WorkStealingPolicy {
			local: FifoPolicy::new(),
			overflow: Arc::clone(&self.overflow),
			overflow_threshold: 32
		}
	}
}

impl SchedulingPolicy for WorkStealingPolicy {
	unsafe fn awakened(&mut self, ctx: Ptr<FiberContext>) {
		let affine = unsafe { ctx.as_ref() }
			.flags()
			.contains(crate::context::FiberFlags::THREAD_AFFINITY);

		if !affine {
			#[allow(clippy::unwrap_used)]
			let mut overflow = self.overflow.lock().unwrap();

			if overflow.len() < self.overflow_threshold {
				overflow.push_back(ctx);

				return;
			}
		}

		/* Safety: guaranteed by caller */
		unsafe { self.local.awakened(ctx) };
	}

	fn pick_next(&mut self) -> Option<Ptr<FiberContext>> {
		self.local.pick_next()
	}

	fn is_empty(&self) -> bool {
		self.local.is_empty()
	}

	fn steal(&mut self) -> Option<Ptr<FiberContext>> {
		#[allow(clippy::unwrap_used)]
		self.overflow.lock().unwrap().pop_front()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn priority_policy_queue_for_creates_sorted_buckets() {
		let mut policy = PriorityPolicy::new();

		let _ = policy.queue_for(Priority(5));
		let _ = policy.queue_for(Priority(1));
		let _ = policy.queue_for(Priority(3));

		let order: Vec<_> = policy.queues.iter().map(|(p, _)| p.0).collect();

		assert_eq!(order, vec![1, 3, 5]);
	}
}
