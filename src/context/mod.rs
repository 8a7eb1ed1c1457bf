//! Component B: the fiber control block.
//!
//! A [`FiberContext`] is the heap-allocated, pinned, intrusively-linked
//! record a [`crate::scheduler::Scheduler`] uses to track one fiber: its
//! [`crate::fiber::Fiber`] (stack + saved registers), its state, the flags
//! that drive interruption and termination, its joiners, its
//! fiber-specific-storage map, and (optionally) its scheduling properties.

mod flags;
mod state;

pub use flags::FiberFlags;
pub use state::FiberState;

use std::cell::{Cell, RefCell};
use std::mem::ManuallyDrop;

use crate::container::intrusive::{LinkedList, Node};
use crate::fiber::{Fiber, Start};
use crate::fss::FssMap;
use crate::pointer::{Pin, Ptr};
use crate::scheduler::properties::FiberProperties;
use crate::scheduler::RemoteHandle;

/// Panic payload used to unwind a fiber's own stack without treating it as
/// a genuine program error. Thrown by [`crate::this_fiber::unwind`] and the
/// [`FiberFlags::FORCED_UNWIND`] check in
/// [`crate::this_fiber::interruption_point`], and caught nowhere but the
/// trampoline in [`crate::spawn`] — user code never observes this type.
pub(crate) struct ForcedUnwind;

/// Globally unique fiber identifier, assigned in spawn order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct FiberId(u64);

impl FiberId {
	fn next() -> Self {
		use std::sync::atomic::{AtomicU64, Ordering};

		static NEXT: AtomicU64 = AtomicU64::new(1);

		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	#[must_use]
	pub const fn as_u64(self) -> u64 {
		self.0
	}
}

/// The control block backing one fiber.
///
/// Always accessed through a [`Ptr`]/[`MutPtr`]: once pinned and handed to a
/// scheduler, a `FiberContext` never moves again, so it can be linked into
/// intrusive queues by address.
pub struct FiberContext {
	/// Wrapped so [`take_fiber`](Self::take_fiber) can move the stack out of
	/// a terminated context without running `Fiber`'s destructor on it twice
	/// — once there, once when the control block itself is eventually
	/// freed. Mirrors the same `ManuallyDrop` dance [`crate::fiber`]'s own
	/// `exit`/`exit_to_pool` already do to move a `Fiber` off of the stack
	/// it's switching away from.
	fiber: ManuallyDrop<Fiber>,
	id: FiberId,
	state: Cell<FiberState>,
	flags: Cell<FiberFlags>,

	/// Holds outstanding on this control block past the point it's spawned:
	/// one for the scheduler (released by [`take_fiber`](Self::take_fiber)'s
	/// caller once the stack is handed off), one for the owning
	/// [`JoinHandle`](crate::spawn::JoinHandle) (released by `join`/
	/// `detach`). [`release`](Self::release) frees the allocation once both
	/// are gone — whichever of the two runs last. A context that never
	/// terminates (the dispatcher's own) never has either released, which
	/// is fine: it's dropped the ordinary way, through `Scheduler`'s own
	/// `Box<FiberContext>` field, not through `release`.
	refs: Cell<u8>,

	/// Hook used by exactly one of: the scheduler's ready queue, its sleep
	/// queue, or its terminated queue. Never linked into more than one at a
	/// time.
	///
	/// `pub(crate)` (rather than accessed only through a method) so
	/// `container_of!` call sites elsewhere in the crate can recover a
	/// `FiberContext` from a `Ptr<Node>` popped off one of those queues.
	pub(crate) scheduler_hook: Node,

	/// Hook used by exactly one of: a synchronization primitive's wait
	/// list, or another fiber's `joiners` list. Independent of
	/// `scheduler_hook`: a fiber blocked with a timeout sits in both a
	/// primitive's wait list (via this hook) and the scheduler's sleep
	/// queue (via `scheduler_hook`) at once.
	pub(crate) wait_hook: Node,

	/// Fibers parked in [`join`](crate::this_fiber::join), woken when this
	/// fiber terminates.
	joiners: LinkedList,

	fss: FssMap,

	properties: Option<Box<dyn FiberProperties>>,

	/// A handle back to the scheduler this fiber runs on, set once by that
	/// scheduler right after construction. Lets a synchronization primitive
	/// wake this fiber from *any* thread, not just its own: the waking
	/// thread never touches the scheduler's own queues directly (those
	/// aren't thread-safe), it only hands the context back through this.
	remote: RefCell<Option<RemoteHandle>>
}

impl FiberContext {
	/// Construct the context representing the thread's own stack: the one
	/// [`crate::scheduler::Scheduler::new`] starts out running on.
	#[must_use]
	pub fn main() -> Box<Self> {
		pin_boxed(Self {
			fiber: ManuallyDrop::new(Fiber::main()),
			id: FiberId::next(),
			state: Cell::new(FiberState::Running),
			flags: Cell::new(FiberFlags::MAIN_CONTEXT),
			refs: Cell::new(2),
			scheduler_hook: Node::new(),
			wait_hook: Node::new(),
			joiners: LinkedList::new(),
			fss: FssMap::new(),
			properties: None,
			remote: RefCell::new(None)
		})
	}

	/// Construct a new, not-yet-scheduled fiber around an already-allocated
	/// [`Fiber`] stack (fresh or reused from a [`crate::fiber::Pool`]).
	#[must_use]
	pub fn with_fiber(fiber: Fiber, properties: Option<Box<dyn FiberProperties>>) -> Box<Self> {
		pin_boxed(Self {
			fiber: ManuallyDrop::new(fiber),
			id: FiberId::next(),
			state: Cell::new(FiberState::Ready),
			flags: Cell::new(FiberFlags::empty()),
			refs: Cell::new(2),
			scheduler_hook: Node::new(),
			wait_hook: Node::new(),
			joiners: LinkedList::new(),
			fss: FssMap::new(),
			properties,
			remote: RefCell::new(None)
		})
	}

	/// Construct a new, not-yet-scheduled fiber with entry point `start`,
	/// mapping a fresh stack for it.
	///
	/// Prefer [`Scheduler::spawn`](crate::scheduler::Scheduler::spawn) in
	/// normal use, which routes through that scheduler's [`Pool`](crate::fiber::Pool)
	/// to reuse a spare stack instead of always mapping one.
	#[must_use]
	pub fn spawn(start: Start, properties: Option<Box<dyn FiberProperties>>) -> Box<Self> {
		Self::with_fiber(Fiber::new_with_start(start), properties)
	}

	/// The handle a synchronization primitive uses to wake this fiber from
	/// another thread. `None` until the owning scheduler sets it, which it
	/// always does before this context becomes reachable outside itself.
	#[must_use]
	pub fn remote_handle(&self) -> Option<RemoteHandle> {
		self.remote.borrow().clone()
	}

	/// # Safety
	/// must only be called by the scheduler that owns this context, once,
	/// before the context is linked into anything
	pub unsafe fn set_remote_handle(&self, remote: RemoteHandle) {
		*self.remote.borrow_mut() = Some(remote);
	}

	#[must_use]
	pub const fn id(&self) -> FiberId {
		self.id
	}

	#[must_use]
	pub fn state(&self) -> FiberState {
		self.state.get()
	}

	pub fn set_state(&self, state: FiberState) {
		self.state.set(state);
	}

	#[must_use]
	pub fn flags(&self) -> FiberFlags {
		self.flags.get()
	}

	pub fn set_flags(&self, flags: FiberFlags) {
		self.flags.set(flags);
	}

	pub fn insert_flags(&self, flags: FiberFlags) {
		self.flags.set(self.flags.get() | flags);
	}

	pub fn remove_flags(&self, flags: FiberFlags) {
		self.flags.set(self.flags.get() & !flags);
	}

	#[must_use]
	pub fn fiber(&self) -> &Fiber {
		&self.fiber
	}

	#[must_use]
	pub fn fiber_mut(&mut self) -> &mut Fiber {
		&mut self.fiber
	}

	/// Move the stack out of a just-terminated context so the scheduler can
	/// hand it to [`Fiber::exit_to_pool`](crate::fiber::Fiber::exit_to_pool),
	/// while the rest of the control block (`id`/`state`/`flags`/`joiners`)
	/// stays alive for whichever of the scheduler's and the `JoinHandle`'s
	/// hold (see `refs`) is released last.
	///
	/// # Safety
	/// must be called at most once, and only on a context already marked
	/// [`FiberState::Terminated`] — `Drop` checks that same state to skip
	/// dropping `fiber` a second time once this context is finally freed
	pub unsafe fn take_fiber(&self) -> Fiber {
		let fiber = std::ptr::addr_of!(self.fiber).cast_mut();

		/* Safety: guaranteed by caller; nothing reads `self.fiber` again
		 * after a context is `Terminated` except `Drop`, which skips it */
		unsafe { ManuallyDrop::take(&mut *fiber) }
	}

	/// Release one of the two holds described on `refs`, freeing this
	/// context once both are gone.
	///
	/// # Safety
	/// `ctx` must have at least one hold outstanding, and the caller's hold
	/// (the scheduler's, or the owning `JoinHandle`'s) must not already have
	/// been released
	pub unsafe fn release(ctx: Ptr<Self>) {
		/* Safety: guaranteed by caller */
		let context = unsafe { ctx.as_ref() };
		let remaining = context.refs.get() - 1;

		context.refs.set(remaining);

		if remaining == 0 {
			/* Safety: both holders released their share, so nothing can
			 * reach this context again */
			drop(unsafe { Box::from_raw(ctx.cast_mut().as_ptr()) });
		}
	}

	/// # Safety
	/// this context must be pinned
	pub unsafe fn scheduler_hook(&self) -> Ptr<Node> {
		Ptr::from(&self.scheduler_hook)
	}

	/// # Safety
	/// this context must be pinned
	pub unsafe fn wait_hook(&self) -> Ptr<Node> {
		Ptr::from(&self.wait_hook)
	}

	#[must_use]
	pub const fn joiners(&self) -> &LinkedList {
		&self.joiners
	}

	#[must_use]
	pub fn fss(&self) -> &FssMap {
		&self.fss
	}

	#[must_use]
	pub fn properties(&self) -> Option<&dyn FiberProperties> {
		self.properties.as_deref()
	}

	#[must_use]
	pub fn properties_mut(&mut self) -> Option<&mut dyn FiberProperties> {
		self.properties.as_deref_mut()
	}

	/// Wake every fiber parked in [`join`](crate::this_fiber::join) on this
	/// context. Called by the scheduler once the fiber has fully
	/// terminated and its `joiners` list is safe to drain.
	///
	/// # Safety
	/// this context must be pinned and terminated
	pub unsafe fn wake_joiners(&self) -> LinkedList {
		let woken = LinkedList::new();

		/* Safety: `woken` was just pinned and is empty */
		unsafe {
			let mut woken = woken;

			woken.pin();
			self.joiners.move_elements(&woken);

			woken
		}
	}
}

impl Drop for FiberContext {
	fn drop(&mut self) {
		// A terminated context already had its stack taken by `take_fiber`;
		// dropping `fiber` here too would discard/unmap it a second time.
		// Anything that never terminates (the dispatcher's own context) still
		// owns its `fiber` outright and is dropped normally.
		if self.state.get() != FiberState::Terminated {
			/* Safety: not yet taken, since `state` never reached
			 * `Terminated` */
			unsafe { ManuallyDrop::drop(&mut self.fiber) };
		}
	}
}

/* Safety: a `FiberContext` owns its stack exclusively; the intrusive hooks
 * only ever get dereferenced by the single scheduler thread that owns it,
 * or (for `wait_hook`) by a primitive guarded by a spinlock */
unsafe impl Send for FiberContext {}

/* Safety: the joiners list is pinned before anything can observe
 * `FiberContext` at its final, boxed address, and is never moved out of the
 * box afterwards */
unsafe impl Pin for FiberContext {
	unsafe fn pin(&mut self) {
		/* Safety: freshly constructed, not yet linked into anything */
		unsafe { self.joiners.pin() };
	}
}

fn pin_boxed(value: FiberContext) -> Box<FiberContext> {
	let mut boxed = Box::new(value);

	/* Safety: `boxed` is at its final address and nothing has linked
	 * against it yet */
	unsafe { boxed.pin() };

	boxed
}
