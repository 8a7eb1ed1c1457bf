//! spec §8: a packaged task whose closure panics resolves its future to an
//! error instead of propagating the panic; retrieving a future's result (or
//! retrieving the future itself) more than once is rejected.
//!
//! Rust's ownership already forbids calling `Future::get` twice on the same
//! value (it consumes `self`), so the "second `get()`" half of this
//! scenario is instead exercised as: a future with no state at all, and a
//! promise whose future was already handed out once — see `DESIGN.md`'s
//! Open Questions for why those are the faithful equivalents here.

use fiber_rt::error::ErrorKind;
use fiber_rt::future::{Future, PackagedTask, Promise};
use fiber_rt::scheduler::Scheduler;
use fiber_rt::spawn::spawn;

#[test]
fn a_panicking_task_resolves_its_future_to_an_error() {
	let scheduler = Scheduler::new();
	let mut task = PackagedTask::new(|| -> i32 { panic!("task exploded") });
	let future = task.get_future().unwrap();

	spawn(move || {
		task.invoke().unwrap();
	})
	.detach();

	spawn(move || {
		let error = future.get().unwrap_err();

		assert_eq!(error.kind(), ErrorKind::Other);
	})
	.detach();

	scheduler.run();
}

#[test]
fn invoking_a_task_twice_is_rejected_without_re_running_the_closure() {
	let scheduler = Scheduler::new();
	let mut task = PackagedTask::new(|| 1);

	spawn(move || {
		task.invoke().unwrap();

		assert_eq!(task.invoke().unwrap_err().kind(), ErrorKind::TaskAlreadyStarted);
	})
	.detach();

	scheduler.run();
}

#[test]
fn reset_lets_a_task_run_again_under_a_fresh_shared_state() {
	let scheduler = Scheduler::new();
	let mut task = PackagedTask::new(|| 1);

	spawn(move || {
		let first = task.get_future().unwrap();

		task.invoke().unwrap();
		assert_eq!(first.get().unwrap(), 1);

		task.reset();

		let second = task.get_future().unwrap();

		task.invoke().unwrap();
		assert_eq!(second.get().unwrap(), 1);
	})
	.detach();

	scheduler.run();
}

#[test]
fn a_future_with_no_state_is_uninitialized() {
	let future: Future<i32> = Future::default();

	assert_eq!(future.wait().unwrap_err().kind(), ErrorKind::FutureUninitialized);
	assert_eq!(future.is_ready().unwrap_err().kind(), ErrorKind::FutureUninitialized);
	assert_eq!(future.get().unwrap_err().kind(), ErrorKind::FutureUninitialized);
}

#[test]
fn retrieving_a_futures_future_twice_is_rejected() {
	let promise = Promise::<i32>::new();

	promise.get_future().unwrap();

	assert_eq!(promise.get_future().unwrap_err().kind(), ErrorKind::FutureAlreadyRetrieved);
}
