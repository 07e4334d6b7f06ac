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

//! The await gate and the resumable entry point.
//!
//! `resumable` wraps a plain closure in a coroutine and steps it once. If
//! the body never awaits, it finishes right there and the returned future
//! is already fulfilled. If it calls [`await_on`], a continuation is hung
//! on the awaited future, the coroutine switches back out, and the
//! continuation later enqueues it on [`ready_tasks`] to be resumed by
//! whichever thread drains the queue.

use std::cell::RefCell;
use std::sync::Arc;

use crate::coroutine::Coroutine;
use crate::future::{set_promise_value, ThenFuture, ThenPromise};
use crate::gate::RendezvousGate;
use crate::task_queue::ready_tasks;

thread_local!(static ACTIVE: RefCell<Vec<ActiveCoroutine>> = RefCell::new(Vec::new()));

/// Shared handle on a coroutine participating in await scheduling.
///
/// At any instant exactly one party may drive the coroutine: the driver
/// currently stepping it, the queue entry waiting to, or the continuation
/// that will create that entry. The `run_again` rendezvous hands the role
/// over, which is what makes the `Send + Sync` below sound even though
/// `Coroutine` is interior-mutable.
#[derive(Clone)]
pub(crate) struct ActiveCoroutine {
    cell: Arc<CoroCell>,
}

struct CoroCell {
    coroutine: Coroutine,
    run_again: RendezvousGate,
}

unsafe impl Send for CoroCell {}
unsafe impl Sync for CoroCell {}

impl ActiveCoroutine {
    fn new<T, F>(promise: ThenPromise<T>, f: F) -> ActiveCoroutine
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let coroutine = Coroutine::spawn(move |_| set_promise_value(promise, f));
        ActiveCoroutine {
            cell: Arc::new(CoroCell {
                coroutine,
                run_again: RendezvousGate::new(),
            }),
        }
    }

    /// Innermost coroutine currently executing on this thread, if any.
    fn current() -> Option<ActiveCoroutine> {
        ACTIVE.with(|active| active.borrow().last().cloned())
    }

    /// Step the coroutine until its next suspension or completion, then
    /// meet the await continuation at the `run_again` gate: whichever side
    /// arrives second re-enqueues the coroutine.
    fn invoke(self) {
        ACTIVE.with(|active| active.borrow_mut().push(self.clone()));
        self.cell.run_again.reset();
        self.cell.coroutine.resume();
        ACTIVE.with(|active| {
            active.borrow_mut().pop();
        });
        if self.cell.run_again.signal() {
            enqueue(self);
        }
    }

    fn yield_now(&self) {
        self.cell.coroutine.suspend();
    }
}

fn enqueue(coro: ActiveCoroutine) {
    ready_tasks().enqueue(Box::new(move || coro.invoke()));
}

/// Start `f` as a coroutine whose result is delivered through the returned
/// future.
///
/// The body may suspend with [`await_on`]; once the awaited value arrives
/// the coroutine lands on [`ready_tasks`] and resumes on whichever thread
/// runs it from there. Anything on the coroutine stack that was derived
/// from thread-locals before the await is stale after such a migration.
pub fn resumable<T, F>(f: F) -> ThenFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let mut promise = ThenPromise::new();
    let future = promise.get_future();
    // Step once and let go of the handle: a body that never awaits is
    // already finished here, and one that awaited is kept alive by its
    // continuation or the ready queue.
    ActiveCoroutine::new(promise, f).invoke();
    future
}

/// Suspend the enclosing resumable until `future` is ready, then produce
/// its value (re-raising a captured panic at this call site).
///
/// Outside of a resumable body there is nothing to suspend, so this
/// panics; use [`await_or_block`] to fall back to blocking instead. The
/// continuation may fire on another thread before the suspension completes;
/// the rendezvous gate ensures the coroutine is re-enqueued exactly once
/// either way.
pub fn await_on<T>(future: ThenFuture<T>) -> T
where
    T: Send + 'static,
{
    let coro = match ActiveCoroutine::current() {
        Some(coro) => coro,
        None => panic!(
            "await_on is only usable inside a resumable() body: there is no context to \
             switch out of here (await_or_block blocks instead)"
        ),
    };
    let mut future = future;
    let finish = {
        let coro = coro.clone();
        future.then(move |previous| {
            if coro.cell.run_again.signal() {
                enqueue(coro);
            }
            previous.get()
        })
    };
    // When the continuation above re-enqueues us, execution continues here.
    coro.yield_now();
    finish.get()
}

/// True when [`await_on`] is currently usable.
pub fn can_await() -> bool {
    ActiveCoroutine::current().is_some()
}

/// Await inside a resumable body, block anywhere else.
pub fn await_or_block<T>(future: ThenFuture<T>) -> T
where
    T: Send + 'static,
{
    if can_await() {
        await_on(future)
    } else {
        future.get()
    }
}
