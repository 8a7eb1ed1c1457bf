//! Fiber scheduling properties, grounded in Boost.Fiber's
//! `fiber_properties`/`sched_algorithm_with_properties<PROPS>` design: a
//! scheduling policy that cares about more than arrival order (priority,
//! affinity, deadline, ...) downcasts each fiber's [`FiberProperties`] to
//! its own concrete type instead of the scheduler baking in a specific
//! property shape.

use std::any::Any;

/// Implemented by a policy-specific properties type attached to a spawned
/// fiber. A [`super::SchedulingPolicy`] that cares about properties
/// downcasts via [`as_any`](Self::as_any)/[`as_any_mut`](Self::as_any_mut)
/// to recover its own concrete type.
pub trait FiberProperties: Any + Send {
	fn as_any(&self) -> &dyn Any;
	fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send> FiberProperties for T {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

/// A simple numeric priority, lower runs first. The bundled
/// [`super::policy::PriorityPolicy`] reads this.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Priority(pub i32);

/// Downcast a fiber's properties to a concrete type, mirroring
/// `fiber_properties::downcaster` from the original design: a narrow,
/// reusable helper rather than every policy hand-rolling the `Any` dance.
pub fn downcast<P: 'static>(properties: &dyn FiberProperties) -> Option<&P> {
	properties.as_any().downcast_ref()
}

pub fn downcast_mut<P: 'static>(properties: &mut dyn FiberProperties) -> Option<&mut P> {
	properties.as_any_mut().downcast_mut()
}
