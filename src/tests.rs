// The MIT License (MIT)

// Copyright (c) 2026 The resumable developers

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

//! End-to-end scenarios across the coroutine, future and await layers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::{
    await_on, await_or_block, can_await, custom_async, ready_tasks, resumable, BrokenPromise,
    ThenFuture, ThenPromise,
};

// The ready queue is process-wide, so scenarios that drain it take turns;
// otherwise one test's blocking drain could swallow another test's task.
fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A future whose value is ready before anyone can look at it.
fn immediate<T: Send + 'static>(value: T) -> ThenFuture<T> {
    let mut promise = ThenPromise::new();
    let future = promise.get_future();
    promise.set_value(value);
    future
}

#[test]
fn resumable_without_await_completes_inline() {
    let _guard = serial();
    assert_eq!(resumable(|| 5).get(), 5);
}

#[test]
fn single_await_on_background_work() {
    let _guard = serial();
    let background = custom_async(|| 5);
    let future = resumable(move || await_on(background));
    ready_tasks().run_one_blocking();
    assert_eq!(future.get(), 5);
}

#[test]
fn two_awaits_add_up() {
    let _guard = serial();
    let a = custom_async(|| 5);
    let b = custom_async(|| 5);
    let finished = Arc::new(AtomicBool::new(false));
    let done = finished.clone();
    let future = resumable(move || {
        let result = await_on(a) + await_on(b);
        done.store(true, Ordering::SeqCst);
        result
    });
    while !finished.load(Ordering::SeqCst) {
        ready_tasks().run_one_blocking();
    }
    assert_eq!(future.get(), 10);
}

#[test]
fn await_on_a_ready_future() {
    let _guard = serial();
    let future = resumable(|| await_on(immediate(5)));
    ready_tasks().run_one_blocking();
    assert_eq!(future.get(), 5);
}

// `await_on(x) * await_on(y)` has to mean `(await_on x) * (await_on y)`;
// with ready futures each await still suspends and re-enqueues exactly once.
#[test]
fn awaits_compose_in_expressions() {
    let _guard = serial();
    let finished = Arc::new(AtomicBool::new(false));
    let done = finished.clone();
    let future = resumable(move || {
        let result = await_on(immediate(5)) * await_on(immediate(5));
        done.store(true, Ordering::SeqCst);
        result
    });
    while !finished.load(Ordering::SeqCst) {
        ready_tasks().run_one_blocking();
    }
    assert_eq!(future.get(), 25);
}

// The continuation may fire on the producer thread anywhere between the
// install and the end of the yield; whoever loses the race must leave the
// re-enqueue to the winner, so the coroutine resumes exactly once.
#[test]
fn value_racing_the_suspension_resumes_exactly_once() {
    let _guard = serial();
    for round in 0..100 {
        let mut promise = ThenPromise::new();
        let shared = promise.get_future();
        let producer = thread::spawn(move || promise.set_value(round));
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let future = resumable(move || {
            let value = await_on(shared);
            done.store(true, Ordering::SeqCst);
            value
        });
        while !finished.load(Ordering::SeqCst) {
            ready_tasks().run_one_blocking();
        }
        assert_eq!(future.get(), round);
        producer.join().unwrap();
    }
}

// An awaited computation that itself drains the ready queue must not break
// the coroutine that is suspended on it.
#[test]
fn awaited_computation_draining_the_queue() {
    let _guard = serial();
    let adversarial = custom_async(|| {
        ready_tasks().drain();
        5
    });
    let future = resumable(move || await_on(adversarial));
    ready_tasks().run_one_blocking();
    assert_eq!(future.get(), 5);
}

#[test]
fn panic_from_the_body_reaches_get() {
    let _guard = serial();
    let future = resumable(|| -> i32 { panic::panic_any(5i32) });
    let err = panic::catch_unwind(AssertUnwindSafe(|| future.get())).unwrap_err();
    assert_eq!(err.downcast_ref::<i32>(), Some(&5));

    // The same across an await boundary.
    let finished = Arc::new(AtomicBool::new(false));
    let done = finished.clone();
    let future = resumable(move || -> i32 {
        await_on(custom_async(|| {}));
        done.store(true, Ordering::SeqCst);
        panic::panic_any(5i32)
    });
    while !finished.load(Ordering::SeqCst) {
        ready_tasks().run_one_blocking();
    }
    let err = panic::catch_unwind(AssertUnwindSafe(|| future.get())).unwrap_err();
    assert_eq!(err.downcast_ref::<i32>(), Some(&5));
}

#[test]
fn panic_from_an_awaited_future_surfaces_at_the_await_site() {
    let _guard = serial();
    let finished = Arc::new(AtomicBool::new(false));
    let done = finished.clone();
    let mut future = resumable(|| {
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            await_on(custom_async(|| -> i32 { panic::panic_any(5i32) }))
        }));
        assert_eq!(caught.unwrap_err().downcast_ref::<i32>(), Some(&5));
        // A second panicking await, this time left uncaught.
        await_on(custom_async(|| -> i32 { panic::panic_any(6i32) }))
    });
    let chained = future.then(move |f| {
        done.store(true, Ordering::SeqCst);
        f.get()
    });
    while !finished.load(Ordering::SeqCst) {
        ready_tasks().run_one_blocking();
    }
    let err = panic::catch_unwind(AssertUnwindSafe(|| chained.get())).unwrap_err();
    assert_eq!(err.downcast_ref::<i32>(), Some(&6));
}

// Move-only state threaded through a recursive self-await; each level parks
// on the resumable below it and increments on the way back up.
fn countdown(finished: Arc<AtomicUsize>, remaining: Box<usize>) {
    if *remaining > 0 {
        let mut remaining = remaining;
        *remaining -= 1;
        let below = finished.clone();
        await_on(resumable(move || countdown(below, remaining)));
        finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn move_only_recursive_self_await() {
    let _guard = serial();
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();
    let future = resumable(move || countdown(counter, Box::new(5)));
    while finished.load(Ordering::SeqCst) != 5 {
        ready_tasks().run_one_blocking();
    }
    future.get();
}

#[test]
fn broken_promise_wakes_a_suspended_awaiter() {
    let _guard = serial();
    let mut promise = ThenPromise::<i32>::new();
    let shared = promise.get_future();
    let future = resumable(move || {
        let caught = panic::catch_unwind(AssertUnwindSafe(|| await_on(shared)));
        assert!(caught
            .unwrap_err()
            .downcast_ref::<BrokenPromise>()
            .is_some());
        7
    });
    drop(promise);
    ready_tasks().run_one_blocking();
    assert_eq!(future.get(), 7);
}

#[test]
fn await_or_block_works_in_both_contexts() {
    let _guard = serial();
    assert_eq!(await_or_block(custom_async(|| 5)), 5);

    let future = resumable(|| await_or_block(custom_async(|| 5)));
    ready_tasks().run_one_blocking();
    assert_eq!(future.get(), 5);
}

#[test]
fn await_outside_a_resumable_is_an_error() {
    assert!(!can_await());
    let caught = panic::catch_unwind(|| await_on(immediate(1)));
    assert!(caught.is_err());
}

#[test]
fn can_await_inside_a_resumable() {
    let _guard = serial();
    let future = resumable(can_await);
    assert!(future.get());
}

// Awaiting works from arbitrarily nested plain function calls, which is the
// point of keeping the whole stack around.
fn double_of(value: i32) -> i32 {
    await_on(custom_async(move || value)) * 2
}

fn sum_of_doubles() -> i32 {
    double_of(1) + double_of(2)
}

#[test]
fn await_deep_in_the_call_stack() {
    let _guard = serial();
    let finished = Arc::new(AtomicBool::new(false));
    let done = finished.clone();
    let future = resumable(move || {
        let result = sum_of_doubles();
        done.store(true, Ordering::SeqCst);
        result
    });
    while !finished.load(Ordering::SeqCst) {
        ready_tasks().run_one_blocking();
    }
    assert_eq!(future.get(), 6);
}

// Coroutines migrate: whichever worker pops the queue entry resumes the
// coroutine, so a body may start on this thread and finish on another.
#[test]
fn worker_threads_drain_the_queue() {
    let _guard = serial();
    const COUNT: usize = 64;
    let finished = Arc::new(AtomicUsize::new(0));

    let futures: Vec<ThenFuture<usize>> = (0..COUNT)
        .map(|i| {
            let finished = finished.clone();
            resumable(move || {
                let value = await_on(custom_async(move || i));
                finished.fetch_add(1, Ordering::SeqCst);
                value
            })
        })
        .collect();

    let workers: Vec<_> = (0..num_cpus::get().max(2))
        .map(|_| {
            let finished = finished.clone();
            thread::spawn(move || {
                while finished.load(Ordering::SeqCst) != COUNT {
                    if !ready_tasks().run_one() {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for (i, future) in futures.into_iter().enumerate() {
        assert_eq!(future.get(), i);
    }
}
