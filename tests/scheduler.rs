//! End-to-end exercise of the context-switch primitive (component A) via the
//! scheduler: every switch a fiber performs goes through
//! `Fiber::switch`/`FiberContext`, so a join round-trip here is the
//! integration counterpart to `fiber::tests::set_start_points_context_at_the_fiber_entry`.

use fiber_rt::scheduler::Scheduler;
use fiber_rt::spawn::spawn;

#[test]
fn join_returns_the_spawned_fibers_value() {
	let scheduler = Scheduler::new();

	spawn(|| {
		let handle = spawn(|| 42);

		assert_eq!(handle.join().unwrap(), 42);
	})
	.detach();

	scheduler.run();
}

#[test]
fn nested_fibers_switch_through_the_same_dispatcher() {
	let scheduler = Scheduler::new();

	spawn(|| {
		let outer = spawn(|| {
			let inner = spawn(|| "leaf");

			inner.join().unwrap()
		});

		assert_eq!(outer.join().unwrap(), "leaf");
	})
	.detach();

	scheduler.run();
}

#[test]
fn many_fibers_interleave_without_corrupting_each_others_state() {
	let scheduler = Scheduler::new();
	let handles: Vec<_> = (0..64)
		.map(|i| {
			spawn(move || {
				for _ in 0..8 {
					fiber_rt::this_fiber::yield_now();
				}

				i * i
			})
		})
		.collect();

	spawn(move || {
		for (i, handle) in handles.into_iter().enumerate() {
			assert_eq!(handle.join().unwrap(), i * i);
		}
	})
	.detach();

	scheduler.run();
}
