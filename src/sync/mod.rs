//! Synchronization primitives.
//!
//! `spin_lock`/`spin_mutex`/`poison`/`backoff`/`cache_padded` are the
//! cross-thread-safe low-level building blocks (component E of the fiber
//! runtime: short critical sections that may be entered from the
//! scheduler's dispatch loop itself, so they must never suspend a fiber).
//!
//! `mutex`/`condvar`/`barrier`/`channel` are the fiber-aware primitives
//! (components F, G, H): they block by suspending the calling fiber into
//! the scheduler rather than spinning or blocking the OS thread.

pub mod backoff;
pub mod barrier;
pub mod cache_padded;
pub mod channel;
pub mod condvar;
pub mod mutex;
pub mod poison;
pub mod spin_lock;
pub mod spin_mutex;

#[doc(inline)]
pub use backoff::*;
#[doc(inline)]
pub use barrier::Barrier;
#[doc(inline)]
pub use cache_padded::*;
#[doc(inline)]
pub use condvar::Condvar;
#[doc(inline)]
pub use mutex::{Mutex, RecursiveMutex, RecursiveTimedMutex, TimedMutex};
#[doc(inline)]
pub use poison::*;
#[doc(inline)]
pub use spin_lock::*;
#[doc(inline)]
pub use spin_mutex::{SpinMutex, SpinMutexGuard};

use crate::context::FiberContext;
use crate::pointer::Ptr;

/// Wake a fiber that has just been unlinked from a synchronization
/// primitive's own wait list (a mutex's waiters, a condvar's waiters, a
/// channel's blocked producers/consumers, ...), handing it back to
/// whichever scheduler it was originally spawned on.
///
/// Routing through [`FiberContext::remote_handle`] rather than the local
/// [`crate::scheduler::Scheduler::set_ready`] means this is correct
/// whether the waking fiber lives on this thread or another one, and it
/// never actually migrates anything: the handle always points at the
/// exact scheduler that owns `ctx`, so waking a
/// [`crate::context::FiberFlags::THREAD_AFFINITY`]-pinned fiber this way
/// is always safe.
///
/// # Safety
/// `ctx` must already be unlinked from the primitive's wait list (not
/// left linked anywhere the caller still expects to find it)
pub(crate) unsafe fn wake(ctx: Ptr<FiberContext>) {
	/* Safety: every fiber reachable through a wait list was attached to a
	 * scheduler before it could ever be linked into one */
	let remote = unsafe { ctx.as_ref() }
		.remote_handle()
		.expect("woken fiber has no scheduler attached");

	/* Safety: guaranteed by caller */
	unsafe { remote.set_remote_ready(ctx) };
}
