//! spec §8: three fibers wait on a condition variable for a predicate
//! (`x == 1`); `notify_all` must wake every one of them exactly once.

use std::cell::RefCell;
use std::rc::Rc;

use fiber_rt::scheduler::Scheduler;
use fiber_rt::spawn::spawn;
use fiber_rt::sync::{Condvar, Mutex};
use fiber_rt::this_fiber;

#[test]
fn three_waiters_on_a_predicate_each_wake_exactly_once() {
	let scheduler = Scheduler::new();
	let mutex = Rc::new(Mutex::new());
	let cv = Rc::new(Condvar::new());
	let x = Rc::new(RefCell::new(0));
	let wakes = Rc::new(RefCell::new(Vec::new()));

	for id in 0..3 {
		let mutex = Rc::clone(&mutex);
		let cv = Rc::clone(&cv);
		let x = Rc::clone(&x);
		let wakes = Rc::clone(&wakes);

		spawn(move || {
			mutex.lock().unwrap();
			cv.wait_while(&mutex, || *x.borrow() != 1).unwrap();
			wakes.borrow_mut().push(id);
			mutex.unlock().unwrap();
		})
		.detach();
	}

	spawn({
		let mutex = Rc::clone(&mutex);
		let cv = Rc::clone(&cv);
		let x = Rc::clone(&x);

		move || {
			// let all three waiters block on the predicate first
			for _ in 0..3 {
				this_fiber::yield_now();
			}

			mutex.lock().unwrap();
			*x.borrow_mut() = 1;
			cv.notify_all();
			mutex.unlock().unwrap();
		}
	})
	.detach();

	scheduler.run();

	let wakes = wakes.borrow();

	assert_eq!(wakes.len(), 3, "every waiter should wake exactly once");
	assert_eq!(wakes.iter().copied().collect::<std::collections::HashSet<_>>().len(), 3, "no duplicate wake-ups");
}

#[test]
fn notify_one_under_a_shared_predicate_wakes_only_one_at_a_time() {
	let scheduler = Scheduler::new();
	let mutex = Rc::new(Mutex::new());
	let cv = Rc::new(Condvar::new());
	let ready = Rc::new(RefCell::new(false));
	let done = Rc::new(RefCell::new(0));

	for _ in 0..3 {
		let mutex = Rc::clone(&mutex);
		let cv = Rc::clone(&cv);
		let ready = Rc::clone(&ready);
		let done = Rc::clone(&done);

		spawn(move || {
			mutex.lock().unwrap();
			cv.wait_while(&mutex, || !*ready.borrow()).unwrap();
			*done.borrow_mut() += 1;
			mutex.unlock().unwrap();
		})
		.detach();
	}

	spawn({
		let mutex = Rc::clone(&mutex);
		let cv = Rc::clone(&cv);
		let ready = Rc::clone(&ready);
		let done = Rc::clone(&done);

		move || {
			for _ in 0..3 {
				this_fiber::yield_now();
			}

			mutex.lock().unwrap();
			*ready.borrow_mut() = true;
			mutex.unlock().unwrap();

			// wake one waiter at a time; each notify_one should release
			// exactly one more of the three predicate-waiters
			for expected in 1..=3 {
				cv.notify_one();
				this_fiber::yield_now();
				this_fiber::yield_now();

				assert_eq!(*done.borrow(), expected);
			}
		}
	})
	.detach();

	scheduler.run();
}
