//! spec §8's interruption scenario and the wider cancellation semantics it
//! implies: `interrupt()` reaches a fiber blocked in `sleep_until` or a
//! channel `pop`, waking it early instead of waiting out what it was
//! blocked on, and `disable_interruption` holds a pending request until its
//! guard drops.

use std::rc::Rc;
use std::time::{Duration, Instant};

use fiber_rt::error::ErrorKind;
use fiber_rt::scheduler::Scheduler;
use fiber_rt::spawn::spawn;
use fiber_rt::sync::channel::{RecvError, UnboundedChannel};
use fiber_rt::this_fiber;

#[test]
fn interrupting_a_long_sleep_wakes_it_early_with_fiber_interrupted() {
	let scheduler = Scheduler::new();
	let outcome = Rc::new(std::cell::Cell::new(None::<(Duration, ErrorKind)>));

	let handle = {
		let outcome = Rc::clone(&outcome);

		spawn(move || {
			let start = Instant::now();
			let result = this_fiber::sleep_for(Duration::from_secs(10));

			outcome.set(Some((start.elapsed(), result.unwrap_err().kind())));
		})
	};

	spawn(move || {
		this_fiber::sleep_for(Duration::from_millis(50)).unwrap();
		handle.interrupt();
		handle.join().unwrap();
	})
	.detach();

	scheduler.run();

	let (elapsed, kind) = outcome.get().expect("sleeping fiber never resumed");

	assert_eq!(kind, ErrorKind::FiberInterrupted);
	assert!(elapsed < Duration::from_millis(100), "took {elapsed:?} to observe the interruption");
}

#[test]
fn interrupting_a_blocked_pop_returns_fiber_interrupted() {
	let scheduler = Scheduler::new();
	let channel = Rc::new(UnboundedChannel::<i32>::new());

	let handle = {
		let channel = Rc::clone(&channel);

		spawn(move || channel.pop())
	};

	spawn(move || {
		this_fiber::yield_now();
		handle.interrupt();

		assert_eq!(handle.join().unwrap(), Err(RecvError::Interrupted));
	})
	.detach();

	scheduler.run();
}

#[test]
fn disabling_interruption_holds_the_request_until_the_guard_drops() {
	let scheduler = Scheduler::new();
	let observed_while_blocked = Rc::new(std::cell::Cell::new(false));

	let handle = {
		let observed_while_blocked = Rc::clone(&observed_while_blocked);

		spawn(move || {
			let guard = this_fiber::disable_interruption();

			this_fiber::sleep_for(Duration::from_millis(20)).unwrap();
			observed_while_blocked.set(this_fiber::interruption_point().is_ok());

			drop(guard);

			this_fiber::interruption_point()
		})
	};

	spawn(move || {
		this_fiber::yield_now();
		handle.interrupt();

		assert_eq!(handle.join().unwrap_err().kind(), ErrorKind::FiberInterrupted);
	})
	.detach();

	scheduler.run();

	assert!(observed_while_blocked.get(), "interruption was observed while still blocked");
}
