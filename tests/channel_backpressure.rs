//! Component H: a bounded channel's backpressure actually suspends the
//! producer fiber until a consumer makes room, rather than merely returning
//! an error or busy-spinning — verified by wall-clock timing, the same
//! property the crate's own `channel::tests::backpressure_blocks_producer_until_consumer_pops`
//! checks via fiber interleaving order instead.

use std::rc::Rc;
use std::time::{Duration, Instant};

use fiber_rt::scheduler::Scheduler;
use fiber_rt::spawn::spawn;
use fiber_rt::sync::channel::BoundedChannel;
use fiber_rt::this_fiber;

#[test]
fn a_full_channel_blocks_the_producer_until_the_consumer_pops() {
	let scheduler = Scheduler::new();
	let channel = Rc::new(BoundedChannel::<i32>::new(2, 1).unwrap());
	let started = Rc::new(std::cell::Cell::new(None::<Instant>));
	let unblocked_after = Rc::new(std::cell::Cell::new(None::<Duration>));

	{
		let channel = Rc::clone(&channel);
		let started = Rc::clone(&started);
		let unblocked_after = Rc::clone(&unblocked_after);

		spawn(move || {
			channel.push(1).unwrap();
			channel.push(2).unwrap();

			started.set(Some(Instant::now()));
			channel.push(3).unwrap();
			unblocked_after.set(Some(started.get().unwrap().elapsed()));
		})
		.detach();
	}

	{
		let channel = Rc::clone(&channel);

		spawn(move || {
			this_fiber::sleep_for(Duration::from_millis(100)).unwrap();

			assert_eq!(channel.pop().unwrap(), 1);
		})
		.detach();
	}

	scheduler.run();

	let elapsed = unblocked_after.get().expect("producer's third push never completed");

	assert!(
		elapsed >= Duration::from_millis(50),
		"producer unblocked after only {elapsed:?}, before the consumer could have popped"
	);
}
