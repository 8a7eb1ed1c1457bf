//! Component I (promise/future) exercised end-to-end through a scheduler,
//! rather than from inside the crate's own unit tests.

use fiber_rt::error::ErrorKind;
use fiber_rt::future::Promise;
use fiber_rt::scheduler::Scheduler;
use fiber_rt::spawn::spawn;

#[test]
fn dropping_an_unfulfilled_promise_breaks_its_future() {
	let scheduler = Scheduler::new();
	let promise = Promise::<i32>::new();
	let future = promise.get_future().unwrap();

	spawn(move || {
		let error = future.get().unwrap_err();

		assert_eq!(error.kind(), ErrorKind::BrokenPromise);
	})
	.detach();

	// the promise is never fulfilled before being dropped here
	drop(promise);

	scheduler.run();
}

#[test]
fn a_value_set_before_the_waiter_blocks_is_still_observed() {
	let scheduler = Scheduler::new();
	let mut promise = Promise::<&'static str>::new();
	let future = promise.get_future().unwrap();

	promise.set_value("done").unwrap();

	spawn(move || {
		assert_eq!(future.get().unwrap(), "done");
	})
	.detach();

	scheduler.run();
}

#[test]
fn a_value_set_after_the_waiter_blocks_wakes_it() {
	let scheduler = Scheduler::new();
	let mut promise = Promise::<i32>::new();
	let future = promise.get_future().unwrap();

	spawn(move || {
		assert_eq!(future.get().unwrap(), 5);
	})
	.detach();

	spawn(move || {
		fiber_rt::this_fiber::yield_now();
		fiber_rt::this_fiber::yield_now();
		promise.set_value(5).unwrap();
	})
	.detach();

	scheduler.run();
}
