//! spec §4.3 / SPEC_FULL §3: a property-aware scheduling policy re-sorts a
//! fiber's position in the ready queue when its properties change, not just
//! when it's first spawned.

use std::cell::RefCell;
use std::rc::Rc;

use fiber_rt::scheduler::policy::PriorityPolicy;
use fiber_rt::scheduler::properties::{downcast_mut, Priority};
use fiber_rt::scheduler::Scheduler;
use fiber_rt::spawn::Builder;

#[test]
fn bumping_a_ready_fibers_priority_moves_it_ahead_in_the_queue() {
	let scheduler = Scheduler::with_policy(Box::new(PriorityPolicy::new()));
	let order = Rc::new(RefCell::new(Vec::new()));

	let low_order = Rc::clone(&order);
	let low = Builder::new().properties(Priority(10)).spawn(move || {
		low_order.borrow_mut().push("low");
	});

	let high_order = Rc::clone(&order);
	let high = Builder::new().properties(Priority(1)).spawn(move || {
		high_order.borrow_mut().push("high");
	});

	// Both fibers are already `Ready`, bucketed by their spawn-time
	// priority (`high` ahead of `low`). Bump `low` above `high` before the
	// scheduler ever runs either.
	low.with_properties_mut(|props| {
		*downcast_mut::<Priority>(props).expect("Priority properties") = Priority(0);
	})
	.expect("low was spawned with properties");

	low.detach();
	high.detach();

	scheduler.run();

	assert_eq!(*order.borrow(), vec!["low", "high"]);
}

#[test]
fn property_change_on_a_fiber_with_no_properties_is_a_no_op() {
	let scheduler = Scheduler::with_policy(Box::new(PriorityPolicy::new()));
	let handle = Builder::new().spawn(|| ());

	assert!(handle.with_properties_mut(|_| ()).is_none());

	handle.detach();
	scheduler.run();
}
