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

//! Futures that carry a single continuation.
//!
//! A [`ThenPromise`]/[`ThenFuture`] pair is a one-shot value channel with two
//! extras on top of blocking retrieval: [`ThenFuture::then`] chains exactly
//! one continuation onto the value, and a join slot travels along the chain
//! so that background work spawned by [`custom_async`] is joined when the
//! final future is discarded.
//!
//! Registration of the continuation and arrival of the value may happen on
//! either thread in either order; a [`RendezvousGate`](crate::gate) decides
//! which of the two runs the continuation.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::gate::RendezvousGate;

type Payload = Box<dyn Any + Send + 'static>;

/// Panic payload raised by [`ThenFuture::get`] when the promise was dropped
/// without producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenPromise;

impl fmt::Display for BrokenPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the promise was dropped before a value was set")
    }
}

impl std::error::Error for BrokenPromise {}

/// Outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    Ready,
    Timeout,
}

enum ResultCell<T> {
    Empty,
    Value(T),
    Panicked(Payload),
    Broken,
    Taken,
}

/// The one-shot value slot: set at most once, read at most once, waitable.
struct ValueSlot<T> {
    cell: Mutex<ResultCell<T>>,
    ready: Condvar,
}

impl<T> ValueSlot<T> {
    fn new() -> ValueSlot<T> {
        ValueSlot {
            cell: Mutex::new(ResultCell::Empty),
            ready: Condvar::new(),
        }
    }

    fn fulfill(&self, result: Result<T, Payload>) {
        let mut cell = self.cell.lock().unwrap();
        match *cell {
            ResultCell::Empty => {}
            _ => panic!("promise already satisfied"),
        }
        *cell = match result {
            Ok(value) => ResultCell::Value(value),
            Err(payload) => ResultCell::Panicked(payload),
        };
        self.ready.notify_all();
    }

    fn break_promise(&self) {
        let mut cell = self.cell.lock().unwrap();
        if let ResultCell::Empty = *cell {
            *cell = ResultCell::Broken;
            self.ready.notify_all();
        }
    }

    fn take(&self) -> T {
        let mut cell = self.cell.lock().unwrap();
        while let ResultCell::Empty = *cell {
            cell = self.ready.wait(cell).unwrap();
        }
        match mem::replace(&mut *cell, ResultCell::Taken) {
            ResultCell::Value(value) => value,
            ResultCell::Panicked(payload) => {
                drop(cell);
                panic::resume_unwind(payload)
            }
            ResultCell::Broken => {
                drop(cell);
                panic::panic_any(BrokenPromise)
            }
            ResultCell::Taken => panic!("future value already retrieved"),
            ResultCell::Empty => unreachable!(),
        }
    }

    fn wait(&self) {
        let mut cell = self.cell.lock().unwrap();
        while let ResultCell::Empty = *cell {
            cell = self.ready.wait(cell).unwrap();
        }
    }

    fn wait_until(&self, deadline: Instant) -> FutureStatus {
        let mut cell = self.cell.lock().unwrap();
        loop {
            if !matches!(*cell, ResultCell::Empty) {
                return FutureStatus::Ready;
            }
            let now = Instant::now();
            if now >= deadline {
                return FutureStatus::Timeout;
            }
            let (guard, _) = self.ready.wait_timeout(cell, deadline - now).unwrap();
            cell = guard;
        }
    }
}

type ContinuationFn<T> = Box<dyn FnOnce(ThenFuture<T>) + Send + 'static>;

/// The single continuation slot and the gate deciding who runs it: the
/// producer fulfilling the value and the consumer installing the callable
/// each signal once, and the second of them makes the call.
struct Continuation<T> {
    next: Mutex<Option<ContinuationFn<T>>>,
    gate: RendezvousGate,
}

impl<T> Continuation<T> {
    fn new() -> Continuation<T> {
        Continuation {
            next: Mutex::new(None),
            gate: RendezvousGate::new(),
        }
    }

    fn fire(&self, state: &Arc<SharedState<T>>) {
        if self.gate.signal() {
            let next = self
                .next
                .lock()
                .unwrap()
                .take()
                .expect("continuation fired twice");
            next(ThenFuture::with_state(state.clone()));
        }
    }

    fn install(&self, state: &Arc<SharedState<T>>, next: ContinuationFn<T>) {
        *self.next.lock().unwrap() = Some(next);
        self.fire(state);
    }
}

pub(crate) struct SharedState<T> {
    slot: ValueSlot<T>,
    cont: Continuation<T>,
}

impl<T> SharedState<T> {
    fn new() -> SharedState<T> {
        SharedState {
            slot: ValueSlot::new(),
            cont: Continuation::new(),
        }
    }
}

/// Joins the background thread of a [`custom_async`] chain on drop.
struct JoinOnDrop(Option<thread::JoinHandle<()>>);

impl Drop for JoinOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            let _ = handle.join();
        }
    }
}

/// The read end of a one-shot result, with a single chainable continuation.
pub struct ThenFuture<T> {
    state: Option<Arc<SharedState<T>>>,
    // Join responsibility for background work travels with the future
    // through `then`, so discarding the end of a chain never leaks the
    // worker thread.
    on_drop: Option<JoinOnDrop>,
}

impl<T> ThenFuture<T> {
    pub(crate) fn with_state(state: Arc<SharedState<T>>) -> ThenFuture<T> {
        ThenFuture {
            state: Some(state),
            on_drop: None,
        }
    }

    fn state(&self) -> &Arc<SharedState<T>> {
        self.state
            .as_ref()
            .expect("operation on an invalid future (its result was already consumed by `then`)")
    }

    /// True while this handle still refers to a result. `then` consumes the
    /// state, leaving the original handle invalid.
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Block until the result is available and return it. Re-raises a panic
    /// captured from the producer; raises [`BrokenPromise`] if the promise
    /// was dropped without a value.
    pub fn get(self) -> T {
        self.state().slot.take()
    }

    /// Block until the result is available.
    pub fn wait(&self) {
        self.state().slot.wait()
    }

    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.state().slot.wait_until(Instant::now() + timeout)
    }

    pub fn wait_until(&self, deadline: Instant) -> FutureStatus {
        self.state().slot.wait_until(deadline)
    }

    /// Attach the continuation. `f` runs once the result is in, on
    /// whichever thread produced it (or immediately, right here, when it
    /// already is in), receiving this future to `get` from. Returns the
    /// future for `f`'s own result; this handle becomes invalid.
    pub fn then<U, F>(&mut self, f: F) -> ThenFuture<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnOnce(ThenFuture<T>) -> U + Send + 'static,
    {
        let state = self.state.take().expect("then() on an invalid future");
        let next_state = Arc::new(SharedState::new());
        let promise = ThenPromise::with_state(next_state.clone());
        state.cont.install(
            &state,
            Box::new(move |previous| set_promise_value(promise, move || f(previous))),
        );
        ThenFuture {
            state: Some(next_state),
            on_drop: self.on_drop.take(),
        }
    }
}

impl<T> fmt::Debug for ThenFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThenFuture")
            .field("valid", &self.valid())
            .finish()
    }
}

/// The write end paired with a [`ThenFuture`].
pub struct ThenPromise<T> {
    state: Arc<SharedState<T>>,
    vended: bool,
    // Whether Drop still needs to break the promise.
    fulfilled: Cell<bool>,
}

impl<T> ThenPromise<T> {
    pub fn new() -> ThenPromise<T> {
        ThenPromise {
            state: Arc::new(SharedState::new()),
            vended: false,
            fulfilled: Cell::new(false),
        }
    }

    /// A promise writing into an existing state whose future side is
    /// already out there (continuation and async helpers).
    pub(crate) fn with_state(state: Arc<SharedState<T>>) -> ThenPromise<T> {
        ThenPromise {
            state,
            vended: true,
            fulfilled: Cell::new(false),
        }
    }

    /// Hand out the future for this promise. At most once.
    pub fn get_future(&mut self) -> ThenFuture<T> {
        assert!(!self.vended, "future already retrieved from this promise");
        self.vended = true;
        ThenFuture::with_state(self.state.clone())
    }

    /// Fulfill the result and run the continuation if one is installed.
    /// Panics if the promise was already satisfied.
    pub fn set_value(&self, value: T) {
        self.finish(Ok(value));
    }

    /// Deliver a captured panic instead of a value; the payload re-raises
    /// from the future's `get`.
    pub fn set_panic(&self, payload: Payload) {
        self.finish(Err(payload));
    }

    fn finish(&self, result: Result<T, Payload>) {
        self.state.slot.fulfill(result);
        self.fulfilled.set(true);
        self.state.cont.fire(&self.state);
    }
}

impl<T> Default for ThenPromise<T> {
    fn default() -> ThenPromise<T> {
        ThenPromise::new()
    }
}

impl<T> Drop for ThenPromise<T> {
    fn drop(&mut self) {
        if !self.fulfilled.get() {
            // Mark the result broken and still fire the continuation, so a
            // chained future (or a suspended awaiter) observes BrokenPromise
            // instead of waiting forever.
            self.state.slot.break_promise();
            self.state.cont.fire(&self.state);
        }
    }
}

/// Run `f` and feed its outcome to `promise`, converting a panic into
/// `set_panic`.
pub(crate) fn set_promise_value<T, F>(promise: ThenPromise<T>, f: F)
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => promise.set_value(value),
        Err(payload) => promise.set_panic(payload),
    }
}

/// Compute `f` on a dedicated background thread and return the future for
/// its result.
///
/// The thread is joined when the last future of the chain hanging off this
/// one is dropped, so discarding the result never leaks the worker.
pub fn custom_async<T, F>(f: F) -> ThenFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let state = Arc::new(SharedState::new());
    let promise = ThenPromise::with_state(state.clone());
    let handle = thread::Builder::new()
        .name("resumable-async".to_string())
        .spawn(move || set_promise_value(promise, f))
        .expect("failed to spawn custom_async worker thread");
    ThenFuture {
        state: Some(state),
        on_drop: Some(JoinOnDrop(Some(handle))),
    }
}
